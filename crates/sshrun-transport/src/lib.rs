//! # sshrun transport
//!
//! Session establishment and single-command execution over SSH for sshrun.
//!
//! A [`Session`] is opened and authenticated once, used for exactly one
//! command via [`run_command`], and disconnected. There is no pooling and
//! no reuse: `run_command` consumes the session.

#![warn(missing_docs)]

/// Remote endpoint model
pub mod endpoint;

/// Authentication material
pub mod credential;

/// Session establishment and liveness configuration
pub mod session;

/// Single-command execution
pub mod exec;

/// Transport-specific error types
pub mod error;

pub use credential::Credential;
pub use endpoint::{Endpoint, DEFAULT_PORT};
pub use error::TransportError;
pub use exec::{run_command, Cancellation};
pub use session::{open_session, HostKeyPolicy, RetryPolicy, Session, SessionConfig};
