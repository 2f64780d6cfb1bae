use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Where an endpoint listens or dials. The scheme alone selects the transport.
///
/// ```text
/// tcp://localhost:56565
/// tcp://*:56565          (listen on every interface)
/// ipc:///tmp/fanout.sock
/// inproc://weather
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    Tcp { host: String, port: u16 },
    Ipc(PathBuf),
    Inproc(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("address {0:?} has no scheme (expected tcp://, ipc:// or inproc://)")]
    MissingScheme(String),

    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),

    #[error("invalid tcp address {0:?}: expected host:port")]
    InvalidTcp(String),

    #[error("address {0:?} has an empty target")]
    EmptyTarget(String),
}

impl Address {
    pub fn scheme(&self) -> &'static str {
        match self {
            Address::Tcp { .. } => "tcp",
            Address::Ipc(_) => "ipc",
            Address::Inproc(_) => "inproc",
        }
    }

    /// `host:port` form accepted by the tokio resolvers. `*` binds every interface.
    pub(crate) fn tcp_target(host: &str, port: u16) -> String {
        let host = if host == "*" { "0.0.0.0" } else { host };
        format!("{host}:{port}")
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, target) = s
            .split_once("://")
            .ok_or_else(|| AddressError::MissingScheme(s.to_string()))?;
        if target.is_empty() {
            return Err(AddressError::EmptyTarget(s.to_string()));
        }

        match scheme {
            "tcp" => {
                let (host, port) = target
                    .rsplit_once(':')
                    .ok_or_else(|| AddressError::InvalidTcp(s.to_string()))?;
                let port = port
                    .parse::<u16>()
                    .map_err(|_| AddressError::InvalidTcp(s.to_string()))?;
                if host.is_empty() {
                    return Err(AddressError::InvalidTcp(s.to_string()));
                }
                Ok(Address::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            "ipc" => Ok(Address::Ipc(PathBuf::from(target))),
            "inproc" => Ok(Address::Inproc(target.to_string())),
            other => Err(AddressError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::Tcp { host, port } => write!(f, "tcp://{host}:{port}"),
            Address::Ipc(path) => write!(f, "ipc://{}", path.display()),
            Address::Inproc(name) => write!(f, "inproc://{name}"),
        }
    }
}
