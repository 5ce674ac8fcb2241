//! Daemon bootstrap orchestration.
//!
//! The bootstrap sequence is staged: load configuration, initialise
//! telemetry, prepare the socket filesystem, build the broker core, and
//! start the listener. Each stage surfaces its own error so operators can
//! tell a bad flag from a bind failure. Collaborators — configuration
//! loading, expression evaluation, process termination — enter through
//! seams so tests can wire their own.

use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use tether_config::{Config, ConfigError, SocketPreparationError};

use crate::broker::{Broker, ExpressionEvaluator, UnsupportedEvaluator};
use crate::dispatch::BrokerConnectionHandler;
use crate::process::{ProcessTerminator, ShutdownError, ShutdownSignal, SystemTerminator};
use crate::telemetry::{self, TelemetryError, TelemetryHandle};
use crate::transport::{ListenerError, ListenerHandle, SocketListener};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when flags or environment values are
    /// unusable.
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load()
    }
}

/// Loader returning a fixed configuration; support wiring for tests and
/// embedders.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Creates a loader that always yields `config`.
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// Socket filesystem preparation failed.
    #[error("failed to prepare daemon socket: {source}")]
    Socket {
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: SocketPreparationError,
    },
    /// Binding or starting the listener failed.
    #[error("failed to start listener: {source}")]
    Listener {
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
}

/// A bootstrapped broker daemon with its listener running.
pub struct Daemon {
    config: Config,
    broker: Arc<Broker>,
    telemetry: TelemetryHandle,
    local_addr: Option<SocketAddr>,
    listener: ListenerHandle,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accessor for the shared broker core.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Accessor for the telemetry handle, primarily useful for testing.
    pub fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Bound TCP address; `None` for Unix endpoints.
    ///
    /// The kernel-assigned port of an ephemeral binding is only knowable
    /// here.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Requests the listener to stop accepting connections.
    pub fn shutdown(&self) {
        self.listener.shutdown();
    }

    /// Waits for the listener thread to finish.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the accept loop
    /// panicked.
    pub fn join(self) -> Result<(), ListenerError> {
        self.listener.join()
    }
}

/// Bootstraps the daemon using the supplied collaborators.
///
/// # Errors
///
/// Returns [`BootstrapError`] naming the stage that failed.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    evaluator: Arc<dyn ExpressionEvaluator>,
    terminator: Arc<dyn ProcessTerminator>,
) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;
    config
        .socket
        .prepare_filesystem()
        .map_err(|source| BootstrapError::Socket { source })?;

    let broker = Arc::new(Broker::new(evaluator));
    let handler = Arc::new(BrokerConnectionHandler::new(
        Arc::clone(&broker),
        terminator,
    ));
    let listener =
        SocketListener::bind(&config.socket).map_err(|source| BootstrapError::Listener { source })?;
    let local_addr = listener.local_addr();
    let listener = listener
        .start(handler)
        .map_err(|source| BootstrapError::Listener { source })?;

    info!(
        target: BOOTSTRAP_TARGET,
        endpoint = %config.socket,
        "broker bootstrapped"
    );

    Ok(Daemon {
        config,
        broker,
        telemetry,
        local_addr,
        listener,
    })
}

/// Errors surfaced by the daemon run loop.
#[derive(Debug, Error)]
pub enum RunError {
    /// Bootstrap failed.
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),
    /// The shutdown listener could not be installed.
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),
    /// The listener thread failed.
    #[error(transparent)]
    Listener(#[from] ListenerError),
}

/// Runs the daemon with system collaborators until a shutdown signal.
///
/// Deployments without a host expression engine get the refusing default
/// evaluator; `quitserver` reaches `std::process::exit` through the system
/// terminator.
///
/// # Errors
///
/// Returns [`RunError`] when bootstrap, signal handling, or listener
/// teardown fails.
pub fn run_daemon(shutdown: &dyn ShutdownSignal) -> Result<(), RunError> {
    let daemon = bootstrap_with(
        &SystemConfigLoader,
        Arc::new(UnsupportedEvaluator),
        Arc::new(SystemTerminator),
    )?;
    shutdown.wait()?;
    daemon.shutdown();
    daemon.join()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use tether_config::SocketEndpoint;

    use crate::broker::LiteralEvaluator;

    use super::*;

    #[test]
    fn bootstrap_binds_ephemeral_tcp_ports() {
        let loader = StaticConfigLoader::new(Config {
            socket: SocketEndpoint::tcp("127.0.0.1", 0),
            ..Config::default()
        });
        let daemon = bootstrap_with(
            &loader,
            Arc::new(LiteralEvaluator),
            Arc::new(SystemTerminator),
        )
        .expect("bootstrap daemon");

        let addr = daemon.local_addr().expect("tcp address");
        assert_ne!(addr.port(), 0);
        assert!(daemon.broker().registry().is_empty());

        daemon.shutdown();
        daemon.join().expect("join listener");
    }
}
