use crate::error::Error;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
#[cfg(all(unix, feature = "ipc"))]
use std::path::PathBuf;

/// A resolved peer address.
///
/// Parsed once from an endpoint string and then shared read-only between the
/// owner and its connecter. A connecter never modifies it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// `tcp://host:port`, resolved to the first address the resolver returns.
    Tcp(SocketAddr),
    /// `ipc:///path/to/socket`, a Unix domain stream socket.
    #[cfg(all(unix, feature = "ipc"))]
    Ipc(PathBuf),
}

impl Address {
    /// Parses and resolves an endpoint such as `tcp://127.0.0.1:5555` or
    /// `ipc:///tmp/feed.sock`.
    ///
    /// Host names are resolved here, so this may block on DNS. Call it off
    /// the reactor thread.
    pub fn parse(endpoint: &str) -> Result<Self, Error> {
        let (protocol, rest) = endpoint
            .split_once("://")
            .ok_or_else(|| Error::InvalidEndpoint(endpoint.to_string()))?;

        match protocol {
            "tcp" => {
                let addr = rest
                    .to_socket_addrs()
                    .map_err(|_| Error::InvalidEndpoint(endpoint.to_string()))?
                    .next()
                    .ok_or_else(|| Error::InvalidEndpoint(endpoint.to_string()))?;
                Ok(Address::Tcp(addr))
            }
            #[cfg(all(unix, feature = "ipc"))]
            "ipc" => {
                // Paths that do not fit `sun_path` would fail every attempt
                if rest.is_empty() || socket2::SockAddr::unix(rest).is_err() {
                    return Err(Error::InvalidEndpoint(endpoint.to_string()));
                }
                Ok(Address::Ipc(PathBuf::from(rest)))
            }
            _ => Err(Error::UnsupportedProtocol {
                got: protocol.to_string(),
                valid: supported_protocols(),
            }),
        }
    }

    pub fn protocol(&self) -> &'static str {
        match self {
            Address::Tcp(_) => "tcp",
            #[cfg(all(unix, feature = "ipc"))]
            Address::Ipc(_) => "ipc",
        }
    }
}

fn supported_protocols() -> Vec<String> {
    let mut valid = vec!["tcp".to_string()];
    #[cfg(all(unix, feature = "ipc"))]
    {
        valid.push("ipc".to_string());
    }
    valid
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        Address::Tcp(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(all(unix, feature = "ipc"))]
            Address::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tcp_ip() {
        let addr = Address::parse("tcp://127.0.0.1:5555").unwrap();
        assert_eq!(addr, Address::Tcp("127.0.0.1:5555".parse().unwrap()));
        assert_eq!(addr.protocol(), "tcp");
        assert_eq!(addr.to_string(), "tcp://127.0.0.1:5555");
    }

    #[test]
    fn parses_tcp_ipv6() {
        let addr = Address::parse("tcp://[::1]:7000").unwrap();
        assert_eq!(addr, Address::Tcp("[::1]:7000".parse().unwrap()));
    }

    #[test]
    fn resolves_localhost() {
        let addr = Address::parse("tcp://localhost:9000").unwrap();
        match addr {
            Address::Tcp(sock) => {
                assert!(sock.ip().is_loopback());
                assert_eq!(sock.port(), 9000);
            }
            #[cfg(all(unix, feature = "ipc"))]
            other => panic!("unexpected address {other:?}"),
        }
    }

    #[cfg(all(unix, feature = "ipc"))]
    #[test]
    fn parses_ipc_path() {
        let addr = Address::parse("ipc:///tmp/feed.sock").unwrap();
        assert_eq!(addr, Address::Ipc(PathBuf::from("/tmp/feed.sock")));
        assert_eq!(addr.to_string(), "ipc:///tmp/feed.sock");
    }

    #[cfg(all(unix, feature = "ipc"))]
    #[test]
    fn rejects_empty_ipc_path() {
        assert!(matches!(
            Address::parse("ipc://"),
            Err(Error::InvalidEndpoint(_))
        ));
    }

    #[cfg(all(unix, feature = "ipc"))]
    #[test]
    fn rejects_ipc_path_longer_than_sun_path() {
        let endpoint = format!("ipc:///tmp/{}", "x".repeat(200));
        assert!(matches!(
            Address::parse(&endpoint),
            Err(Error::InvalidEndpoint(got)) if got == endpoint
        ));
    }

    #[test]
    fn rejects_missing_scheme() {
        assert!(matches!(
            Address::parse("127.0.0.1:5555"),
            Err(Error::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn rejects_bad_port() {
        assert!(matches!(
            Address::parse("tcp://127.0.0.1:notaport"),
            Err(Error::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn rejects_unknown_protocol() {
        match Address::parse("pgm://eth0;239.192.1.1:5555") {
            Err(Error::UnsupportedProtocol { got, valid }) => {
                assert_eq!(got, "pgm");
                assert!(valid.contains(&"tcp".to_string()));
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
