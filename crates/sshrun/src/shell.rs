//! The shell capability

use std::io::{Read, Write};
use std::sync::Arc;

use crate::error::ShellError;

/// Something that can execute one shell command with wired streams and
/// report its exit code.
///
/// The command's stdin is fed from `stdin`, its output lands in `stdout`
/// and `stderr`, and the exit code comes back verbatim: zero
/// conventionally means success, anything else is the remote command's
/// business, not an error. Implementations fail with
/// [`ShellError::Transport`] or [`ShellError::Io`] when execution itself
/// breaks down.
pub trait Shell {
    /// Execute `command` and return its exit code.
    fn exec(
        &self,
        command: &str,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<i32, ShellError>;
}

impl<S: Shell + ?Sized> Shell for &S {
    fn exec(
        &self,
        command: &str,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<i32, ShellError> {
        (**self).exec(command, stdin, stdout, stderr)
    }
}

impl<S: Shell + ?Sized> Shell for Box<S> {
    fn exec(
        &self,
        command: &str,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<i32, ShellError> {
        (**self).exec(command, stdin, stdout, stderr)
    }
}

impl<S: Shell + ?Sized> Shell for Arc<S> {
    fn exec(
        &self,
        command: &str,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<i32, ShellError> {
        (**self).exec(command, stdin, stdout, stderr)
    }
}
