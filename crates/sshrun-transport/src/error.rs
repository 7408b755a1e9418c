//! Transport-specific error types

use std::io;
use thiserror::Error;

/// Errors raised while building endpoints, opening sessions or running
/// a remote command.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The endpoint host could not be resolved to a network address
    #[error("host resolution failed: {0}")]
    HostResolution(String),

    /// The endpoint is malformed (for example a blank login)
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// TCP connect or SSH handshake failure
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server rejected the supplied credential
    #[error("authentication failed: {0}")]
    Auth(String),

    /// I/O failure during command execution
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether the session-open retry loop should try again after this
    /// error.
    ///
    /// Connection-level failures are worth another attempt; a rejected
    /// credential or a malformed endpoint will not get better by waiting.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Connection(_) | TransportError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_errors_are_transient() {
        assert!(TransportError::Connection("reset by peer".into()).is_transient());
        assert!(TransportError::Io(io::Error::new(io::ErrorKind::TimedOut, "slow")).is_transient());
    }

    #[test]
    fn auth_and_resolution_errors_are_permanent() {
        assert!(!TransportError::Auth("bad key".into()).is_transient());
        assert!(!TransportError::HostResolution("no.such.host".into()).is_transient());
        assert!(!TransportError::InvalidEndpoint("blank login".into()).is_transient());
    }
}
