//! Error types for shell execution

use std::io;
use thiserror::Error;
use sshrun_transport::TransportError;

/// Errors surfaced by [`crate::Shell::exec`] and the decorators.
#[derive(Debug, Error)]
pub enum ShellError {
    /// Session establishment or remote execution failed
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    /// A caller-supplied stream failed
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The command finished with a non-zero exit code; raised only by
    /// [`crate::Safe`]
    #[error("non-zero exit code #{code}: {command}")]
    NonZeroExit {
        /// Exit code of the command
        code: i32,
        /// The command that produced it
        command: String,
    },
}
