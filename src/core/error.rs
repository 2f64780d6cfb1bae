use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::transport::frame::FrameError;

/// Every failure the messaging core can report.
///
/// Nothing in the core retries: each variant is returned to the caller, which
/// decides whether to give up (the binary exits non-zero) or try again.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot listen on {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot dial into {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot send to {address}: {reason}")]
    Send { address: String, reason: String },

    #[error("no message received within {0:?}")]
    Timeout(Duration),

    #[error("connection to {address} closed")]
    ConnectionClosed { address: String },

    #[error("invalid topic {topic:?}: {reason}")]
    InvalidTopic { topic: String, reason: &'static str },

    #[error("malformed message: {0}")]
    MalformedMessage(&'static str),

    #[error("cannot subscribe to topic {topic:?}: {reason}")]
    Subscription { topic: String, reason: String },

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
}

impl Error {
    /// A timeout only means nothing arrived yet; every other variant points at
    /// a broken configuration or a dead peer.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_recoverable() {
        assert!(Error::Timeout(Duration::from_secs(1)).is_recoverable());
        assert!(!Error::ConnectionClosed {
            address: "inproc://x".into()
        }
        .is_recoverable());
        assert!(!Error::MalformedMessage("no separator").is_recoverable());
    }

    #[test]
    fn bind_error_names_the_address() {
        let err = Error::Bind {
            address: "tcp://localhost:1".into(),
            source: io::Error::from(io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("cannot listen on tcp://localhost:1"));
    }
}
