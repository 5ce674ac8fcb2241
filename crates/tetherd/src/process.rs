//! Process-level collaborators: termination and shutdown signalling.
//!
//! The `quitserver` command tears down the whole process once its own socket
//! has closed. That exit is reached through an injected seam so tests can
//! observe the request instead of dying, and the daemon's main loop parks on
//! a signal listener until the surrounding environment asks it to stop.

use std::io;
use std::process;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use thiserror::Error;
use tracing::info;

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Process-termination primitive invoked by `quitserver`.
pub trait ProcessTerminator: Send + Sync {
    /// Terminates the process; the drastic path, invoked after the
    /// requesting socket has closed.
    fn terminate(&self);
}

/// Terminator that exits the current process.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTerminator;

impl ProcessTerminator for SystemTerminator {
    fn terminate(&self) {
        info!(target: PROCESS_TARGET, "terminating on quitserver request");
        process::exit(0);
    }
}

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError`] when the listener cannot be installed.
    fn wait(&self) -> Result<(), ShutdownError>;
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener that waits for termination signals.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemShutdownSignal;

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<(), ShutdownError> {
        let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        if let Some(signal) = signals.forever().next() {
            info!(
                target: PROCESS_TARGET,
                signal,
                "shutdown signal received"
            );
        }
        Ok(())
    }
}
