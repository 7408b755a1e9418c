//! Decorators over any shell
//!
//! Each wrapper holds one inner [`Shell`] value and layers one behavior
//! over it (failing on non-zero exits, discarding or capturing output,
//! tee-ing output into the log) without changing which bytes the
//! underlying execution produces. [`Fake`] is the deterministic test
//! double for all of them.

use std::io::{self, Read, Write};

use crate::error::ShellError;
use crate::shell::Shell;
use crate::sink::{LogWriter, SharedBuffer, TeeWriter};

/// Fails when the exit code is not zero.
///
/// A non-zero code becomes [`ShellError::NonZeroExit`] carrying the code
/// and the command; zero passes through unchanged.
#[derive(Debug, Clone)]
pub struct Safe<S> {
    inner: S,
}

impl<S: Shell> Safe<S> {
    /// Wrap a shell.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: Shell> Shell for Safe<S> {
    fn exec(
        &self,
        command: &str,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<i32, ShellError> {
        let code = self.inner.exec(command, stdin, stdout, stderr)?;
        if code != 0 {
            return Err(ShellError::NonZeroExit {
                code,
                command: command.to_string(),
            });
        }
        Ok(code)
    }
}

/// Runs a command with no input and no caller-visible output.
///
/// Stdin is empty, stdout goes to an info-level log sink, stderr to a
/// warn-level one; only the exit code comes back.
#[derive(Debug, Clone)]
pub struct Empty<S> {
    inner: S,
}

impl<S: Shell> Empty<S> {
    /// Wrap a shell.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Execute `command` and return its exit code.
    pub fn exec(&self, command: &str) -> Result<i32, ShellError> {
        self.inner.exec(
            command,
            &mut io::empty(),
            &mut LogWriter::info(),
            &mut LogWriter::warn(),
        )
    }
}

/// Runs a command with no input and returns its output as text.
///
/// Stdout and stderr land in one shared buffer in arrival order. The
/// exit code is discarded; callers that need it use the base shell or
/// [`Safe`] directly.
#[derive(Debug, Clone)]
pub struct Plain<S> {
    inner: S,
}

impl<S: Shell> Plain<S> {
    /// Wrap a shell.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Execute `command` and return everything it printed.
    pub fn exec(&self, command: &str) -> Result<String, ShellError> {
        let buffer = SharedBuffer::new();
        self.inner.exec(
            command,
            &mut io::empty(),
            &mut buffer.clone(),
            &mut buffer.clone(),
        )?;
        Ok(buffer.into_string())
    }
}

/// Duplicates output into the log while still delivering it.
///
/// Every stdout byte also reaches an info-level log sink and every
/// stderr byte a warn-level one; the caller's streams and the exit code
/// are untouched.
#[derive(Debug, Clone)]
pub struct Verbose<S> {
    inner: S,
}

impl<S: Shell> Verbose<S> {
    /// Wrap a shell.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: Shell> Shell for Verbose<S> {
    fn exec(
        &self,
        command: &str,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<i32, ShellError> {
        self.inner.exec(
            command,
            stdin,
            &mut TeeWriter::new(stdout, LogWriter::info()),
            &mut TeeWriter::new(stderr, LogWriter::warn()),
        )
    }
}

/// Deterministic shell for unit testing.
///
/// Ignores the command, drains the supplied stdin to exhaustion (so
/// callers that depend on their input being consumed behave the same as
/// against a real shell), writes the preconfigured bytes to stdout and
/// stderr, and returns the preconfigured exit code.
#[derive(Debug, Clone, Default)]
pub struct Fake {
    code: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl Fake {
    /// Fake with the given exit code and output; `Fake::default()` is
    /// exit 0 with empty output.
    pub fn new(code: i32, stdout: impl Into<Vec<u8>>, stderr: impl Into<Vec<u8>>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }
}

impl Shell for Fake {
    fn exec(
        &self,
        _command: &str,
        stdin: &mut dyn Read,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Result<i32, ShellError> {
        io::copy(stdin, &mut io::sink())?;
        stdout.write_all(&self.stdout)?;
        stdout.flush()?;
        stderr.write_all(&self.stderr)?;
        stderr.flush()?;
        Ok(self.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn fake_returns_configured_outcome() {
        let fake = Fake::new(5, "o", "e");
        let mut stdin = Cursor::new(b"unread input".to_vec());
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = fake
            .exec("whatever you like", &mut stdin, &mut out, &mut err)
            .unwrap();
        assert_eq!(code, 5);
        assert_eq!(out, b"o");
        assert_eq!(err, b"e");
        assert_eq!(
            stdin.position(),
            12,
            "stdin must be drained to exhaustion"
        );
    }

    #[test]
    fn fake_defaults_to_silent_success() {
        let fake = Fake::default();
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = fake
            .exec("anything", &mut io::empty(), &mut out, &mut err)
            .unwrap();
        assert_eq!(code, 0);
        assert!(out.is_empty());
        assert!(err.is_empty());
    }

    #[test]
    fn safe_passes_zero_through() {
        let shell = Safe::new(Fake::new(0, "fine", ""));
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = shell
            .exec("true", &mut io::empty(), &mut out, &mut err)
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, b"fine");
    }

    #[test]
    fn safe_rejects_nonzero() {
        let shell = Safe::new(Fake::new(1, "", "nope"));
        let failure = shell
            .exec("false", &mut io::empty(), &mut Vec::new(), &mut Vec::new())
            .unwrap_err();
        match failure {
            ShellError::NonZeroExit { code, command } => {
                assert_eq!(code, 1);
                assert_eq!(command, "false");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn plain_captures_stdout_then_stderr() {
        let shell = Plain::new(Fake::new(0, "out", "err"));
        assert_eq!(shell.exec("any command at all").unwrap(), "outerr");
    }

    #[test]
    fn plain_discards_the_exit_code() {
        let shell = Plain::new(Fake::new(2, "still here", ""));
        assert_eq!(shell.exec("ls").unwrap(), "still here");
    }

    #[test]
    fn empty_returns_only_the_exit_code() {
        assert_eq!(Empty::new(Fake::new(0, "chatter", "noise")).exec("w").unwrap(), 0);
        assert_eq!(Empty::new(Fake::new(3, "", "")).exec("w").unwrap(), 3);
    }

    #[test]
    fn verbose_delivers_bytes_and_code_unchanged() {
        let shell = Verbose::new(Fake::new(7, "to the caller\n", "and the log\n"));
        let mut out = Vec::new();
        let mut err = Vec::new();
        let code = shell
            .exec("date", &mut io::empty(), &mut out, &mut err)
            .unwrap();
        assert_eq!(code, 7);
        assert_eq!(out, b"to the caller\n");
        assert_eq!(err, b"and the log\n");
    }

    #[test]
    fn decorators_compose() {
        let shell = Safe::new(Verbose::new(Fake::new(0, "deep", "")));
        let mut out = Vec::new();
        let code = shell
            .exec("pwd", &mut io::empty(), &mut out, &mut Vec::new())
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(out, b"deep");

        let failure = Plain::new(Safe::new(Fake::new(9, "", "")))
            .exec("pwd")
            .unwrap_err();
        assert!(matches!(failure, ShellError::NonZeroExit { code: 9, .. }));
    }

    #[test]
    fn boxed_and_borrowed_shells_still_work() {
        let boxed: Box<dyn Shell> = Box::new(Fake::new(0, "via box", ""));
        let shell = Plain::new(boxed);
        assert_eq!(shell.exec("x").unwrap(), "via box");

        let fake = Fake::new(4, "", "");
        let by_ref = Empty::new(&fake);
        assert_eq!(by_ref.exec("x").unwrap(), 4);
    }
}
