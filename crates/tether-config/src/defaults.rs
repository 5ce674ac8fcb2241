use crate::logging::LogFormat;
use crate::socket::SocketEndpoint;

/// Default TCP port the broker listens on.
pub const DEFAULT_TCP_PORT: u16 = 7929;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the daemon.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the daemon.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the default socket endpoint for the broker.
///
/// The broker speaks a TCP wire protocol, so the default binds the loopback
/// interface rather than a Unix path; remote deployments override the host.
#[must_use]
pub fn default_socket_endpoint() -> SocketEndpoint {
    SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)
}
