//! Shared configuration for the Tether broker daemon.
//!
//! The daemon's externally configurable surface is deliberately small: the
//! socket endpoint it listens on plus logging behaviour. Values are resolved
//! by layering command-line flags over `TETHERD_*` environment variables over
//! built-in defaults, so operators can pin the endpoint per invocation while
//! deployment environments set a baseline.

mod defaults;
mod logging;
mod socket;

use std::env;
use std::ffi::OsString;
use std::fmt;
use std::str::FromStr;

use clap::Parser;
use thiserror::Error;

pub use defaults::{
    DEFAULT_LOG_FILTER, DEFAULT_TCP_PORT, default_log_filter, default_log_format,
    default_socket_endpoint,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{SocketEndpoint, SocketParseError, SocketPreparationError};

/// Environment variable naming the socket endpoint.
pub const ENV_SOCKET: &str = "TETHERD_SOCKET";
/// Environment variable naming the log filter expression.
pub const ENV_LOG_FILTER: &str = "TETHERD_LOG_FILTER";
/// Environment variable naming the log output format.
pub const ENV_LOG_FORMAT: &str = "TETHERD_LOG_FORMAT";

/// Resolved daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Endpoint the broker listens on.
    pub socket: SocketEndpoint,
    /// Tracing filter expression (an `EnvFilter` directive string).
    pub log_filter: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            socket: default_socket_endpoint(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from the process arguments and environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a flag or environment value fails to
    /// parse.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_iter(env::args_os())
    }

    /// Loads configuration from an explicit argument list and the environment.
    ///
    /// The first element is treated as the binary name, matching process
    /// argument conventions. Precedence is CLI flag, then environment
    /// variable, then default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a flag or environment value fails to
    /// parse.
    pub fn load_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let cli = CliArgs::try_parse_from(args).map_err(Box::new)?;

        let socket = match cli.socket {
            Some(endpoint) => endpoint,
            None => environment_value(ENV_SOCKET)?.unwrap_or_else(default_socket_endpoint),
        };
        let log_filter = match cli.log_filter {
            Some(filter) => filter,
            None => environment_value(ENV_LOG_FILTER)?
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_owned()),
        };
        let log_format = match cli.log_format {
            Some(format) => format,
            None => environment_value(ENV_LOG_FORMAT)?.unwrap_or_else(default_log_format),
        };

        Ok(Self {
            socket,
            log_filter,
            log_format,
        })
    }
}

/// Command-line flags understood by the daemon.
#[derive(Debug, Parser)]
#[command(name = "tetherd", about = "Tether object broker daemon")]
struct CliArgs {
    /// Socket endpoint to serve on (tcp://host:port or unix:///path).
    #[arg(long, value_name = "ENDPOINT")]
    socket: Option<SocketEndpoint>,
    /// Tracing filter expression, e.g. `info` or `tetherd::dispatch=debug`.
    #[arg(long, value_name = "FILTER")]
    log_filter: Option<String>,
    /// Log output format: `json` or `compact`.
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

/// Errors surfaced while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Command-line flags failed to parse.
    #[error(transparent)]
    Cli(#[from] Box<clap::Error>),
    /// An environment variable held an unusable value.
    #[error("invalid {variable}: {message}")]
    Environment {
        /// Name of the offending variable.
        variable: &'static str,
        /// Why the value was rejected.
        message: String,
    },
}

fn environment_value<T>(variable: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(variable) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|error: T::Err| ConfigError::Environment {
                variable,
                message: error.to_string(),
            }),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::Environment {
            variable,
            message: "value is not valid unicode".to_owned(),
        }),
    }
}
