//! Shell argument escaping

/// Quote `arg` so a POSIX shell reads it back as exactly one word.
///
/// The argument is wrapped in single quotes; each embedded single quote
/// closes the quoting, inserts an escaped literal quote and reopens it
/// (`'\''`). Total over all inputs, including the empty string and
/// strings made of nothing but quotes.
///
/// ```
/// assert_eq!(sshrun::escape("one two"), "'one two'");
/// assert_eq!(sshrun::escape("it's"), r"'it'\''s'");
/// ```
pub fn escape(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', "'\\''"))
}
