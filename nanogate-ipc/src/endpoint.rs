//! Node address parsing.

use crate::error::IpcError;
use std::fmt;
use std::path::PathBuf;
use url::Url;

/// A parsed node address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// `tcp://host:port`
    Tcp { host: String, port: u16 },
    /// `local:///path/to/socket`, a Unix-domain socket.
    Local { path: PathBuf },
}

impl Endpoint {
    /// Parses a connection string.
    ///
    /// Failures are `Connection` errors.
    pub fn parse(address: &str) -> Result<Self, IpcError> {
        let url =
            Url::parse(address).map_err(|_| IpcError::connection("Invalid connection string"))?;

        match url.scheme() {
            "tcp" => {
                let host = url
                    .host_str()
                    .filter(|h| !h.is_empty())
                    .ok_or_else(|| IpcError::connection("Invalid connection string: missing host"))?;
                let port = url
                    .port()
                    .ok_or_else(|| IpcError::connection("Invalid connection string: missing port"))?;
                Ok(Endpoint::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            "local" => {
                let path = urlencoding::decode(url.path()).map_err(|_| {
                    IpcError::connection("Invalid connection string: socket path is not UTF-8")
                })?;
                if path.is_empty() || path == "/" {
                    return Err(IpcError::connection(
                        "Invalid connection string: missing socket path",
                    ));
                }
                Ok(Endpoint::Local {
                    path: PathBuf::from(path.as_ref()),
                })
            }
            other => Err(IpcError::connection(format!(
                "Invalid schema '{}': Use tcp or local.",
                other
            ))),
        }
    }

    /// Returns the `host:port` string used to dial a TCP endpoint.
    pub fn tcp_addr(&self) -> Option<String> {
        match self {
            Endpoint::Tcp { host, port } => Some(format!("{}:{}", host, port)),
            Endpoint::Local { .. } => None,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Tcp { host, port } => write!(f, "tcp://{}:{}", host, port),
            Endpoint::Local { path } => write!(f, "local://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Category;

    #[test]
    fn test_parse_tcp() {
        let endpoint = Endpoint::parse("tcp://127.0.0.1:7077").unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Tcp {
                host: "127.0.0.1".to_string(),
                port: 7077
            }
        );
        assert_eq!(endpoint.tcp_addr().unwrap(), "127.0.0.1:7077");
        assert_eq!(endpoint.to_string(), "tcp://127.0.0.1:7077");
    }

    #[test]
    fn test_parse_tcp_ipv6() {
        let endpoint = Endpoint::parse("tcp://[::1]:7077").unwrap();
        assert_eq!(endpoint.tcp_addr().unwrap(), "[::1]:7077");
    }

    #[test]
    fn test_parse_local() {
        let endpoint = Endpoint::parse("local:///tmp/nano").unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Local {
                path: PathBuf::from("/tmp/nano")
            }
        );
        assert!(endpoint.tcp_addr().is_none());
        assert_eq!(endpoint.to_string(), "local:///tmp/nano");
    }

    #[test]
    fn test_parse_local_decodes_escapes() {
        let endpoint = Endpoint::parse("local:///tmp/my%20sock").unwrap();
        assert_eq!(
            endpoint,
            Endpoint::Local {
                path: PathBuf::from("/tmp/my sock")
            }
        );

        // A raw space is escaped by the parser and decoded back
        assert_eq!(Endpoint::parse("local:///tmp/my sock").unwrap(), endpoint);
    }

    #[test]
    fn test_unsupported_scheme() {
        let err = Endpoint::parse("ftp://bad").unwrap_err();
        assert_eq!(err.category(), Category::Connection);
        assert!(err.message().contains("ftp"));
        assert!(err.message().contains("Use tcp or local"));
    }

    #[test]
    fn test_malformed_addresses() {
        for address in ["", "not a url", "tcp://127.0.0.1", "local://", "tcp://:7077"] {
            let err = Endpoint::parse(address).unwrap_err();
            assert_eq!(err.category(), Category::Connection, "{}", address);
        }
    }
}
