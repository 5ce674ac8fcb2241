use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Declarative configuration for the broker's listening socket.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum SocketEndpoint {
    /// TCP socket endpoint; the broker's native transport.
    Tcp {
        /// Host name or address to bind.
        host: String,
        /// Port to bind; `0` selects an ephemeral port.
        port: u16,
    },
    /// Unix domain socket endpoint for same-host clients.
    Unix {
        /// Filesystem path of the socket.
        path: Utf8PathBuf,
    },
}

impl SocketEndpoint {
    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Builds a Unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Returns the Unix socket path when the endpoint uses the Unix transport.
    #[must_use]
    pub fn unix_path(&self) -> Option<&Utf8Path> {
        match self {
            Self::Unix { path } => Some(path.as_ref()),
            Self::Tcp { .. } => None,
        }
    }

    /// Ensures the socket's parent directory exists with restrictive permissions.
    ///
    /// TCP endpoints need no filesystem preparation and return `Ok` directly.
    ///
    /// # Errors
    ///
    /// Returns [`SocketPreparationError`] when the Unix socket path has no
    /// parent directory or the directory cannot be created.
    pub fn prepare_filesystem(&self) -> Result<(), SocketPreparationError> {
        let Some(path) = self.unix_path() else {
            return Ok(());
        };
        let Some(parent) = path.parent() else {
            return Err(SocketPreparationError::MissingParent {
                path: path.to_path_buf(),
            });
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        if let Err(source) = builder.create(parent.as_std_path())
            && source.kind() != std::io::ErrorKind::AlreadyExists
        {
            return Err(SocketPreparationError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            });
        }

        Ok(())
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
            Self::Unix { path } => write!(formatter, "unix://{path}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = SocketParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input)?;
        match url.scheme() {
            "tcp" => {
                let host = url
                    .host_str()
                    .ok_or_else(|| SocketParseError::MissingHost(input.to_string()))?;
                let port = url
                    .port()
                    .ok_or_else(|| SocketParseError::MissingPort(input.to_string()))?;
                Ok(Self::tcp(host, port))
            }
            "unix" => {
                let path = url.path();
                if path.is_empty() {
                    return Err(SocketParseError::MissingUnixPath(input.to_string()));
                }
                Ok(Self::unix(path))
            }
            other => Err(SocketParseError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Errors encountered while parsing a [`SocketEndpoint`] from text.
#[derive(Debug, Error)]
pub enum SocketParseError {
    /// Scheme was not recognised.
    #[error("unsupported socket scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// TCP port was missing from the address.
    #[error("missing TCP port in '{0}'")]
    MissingPort(String),
    /// Unix socket path was absent.
    #[error("missing Unix socket path in '{0}'")]
    MissingUnixPath(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}

/// Errors raised when preparing socket directories.
#[derive(Debug, Error)]
pub enum SocketPreparationError {
    /// Parent directory is missing when creating a Unix socket path.
    #[error("socket path '{path}' has no parent directory")]
    MissingParent {
        /// Offending socket path.
        path: Utf8PathBuf,
    },
    /// Failed to create or adjust socket directories.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_tcp_socket() {
        let endpoint = SocketEndpoint::tcp("127.0.0.1", 4441);
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:4441");
    }

    #[test]
    fn display_unix_socket() {
        let endpoint = SocketEndpoint::unix(Utf8PathBuf::from("/tmp/tetherd.sock"));
        assert_eq!(endpoint.to_string(), "unix:///tmp/tetherd.sock");
    }

    #[test]
    fn parse_tcp_socket() {
        let endpoint: SocketEndpoint = "tcp://127.0.0.1:9000".parse().unwrap();
        assert!(matches!(endpoint, SocketEndpoint::Tcp { port: 9000, .. }));
    }

    #[test]
    fn parse_unix_socket() {
        let endpoint: SocketEndpoint = "unix:///run/tether/broker.sock".parse().unwrap();
        assert_eq!(
            endpoint.unix_path(),
            Some(Utf8Path::new("/run/tether/broker.sock"))
        );
    }

    #[test]
    fn parse_rejects_portless_tcp() {
        let error = "tcp://127.0.0.1".parse::<SocketEndpoint>().unwrap_err();
        assert!(matches!(error, SocketParseError::MissingPort(_)));
    }

    #[test]
    fn parse_rejects_unknown_scheme() {
        let error = "udp://127.0.0.1:1".parse::<SocketEndpoint>().unwrap_err();
        assert!(matches!(error, SocketParseError::UnsupportedScheme(_)));
    }

    #[test]
    fn prepare_filesystem_is_noop_for_tcp() {
        let endpoint = SocketEndpoint::tcp("127.0.0.1", 0);
        assert!(endpoint.prepare_filesystem().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn prepare_filesystem_creates_unix_parent() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("nested/tetherd.sock");
        let utf8 = Utf8PathBuf::from_path_buf(path).expect("utf8 path");
        let endpoint = SocketEndpoint::unix(utf8);
        endpoint.prepare_filesystem().expect("prepare socket dir");
        assert!(
            endpoint
                .unix_path()
                .and_then(Utf8Path::parent)
                .is_some_and(|parent| parent.as_std_path().is_dir())
        );
    }
}
