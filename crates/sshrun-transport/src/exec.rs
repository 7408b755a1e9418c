//! Single-command execution
//!
//! Runs exactly one command over an open [`Session`] and reports its exit
//! status. Stream transfer and liveness detection both happen in a
//! cooperative polling loop: libssh2 does not pump channel data in the
//! background, so each tick moves whatever bytes are ready, and a tick
//! with nothing to move probes the connection and sleeps.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::TransportError;
use crate::session::Session;

/// libssh2 EAGAIN, reported when a non-blocking call has nothing to do yet.
const ERR_EAGAIN: i32 = -37;

const CHUNK: usize = 8192;

/// Cloneable handle that interrupts the liveness wait of a running
/// command.
///
/// Obtained from [`Session::cancellation`] before the session is handed
/// to [`run_command`]; calling [`cancel`](Cancellation::cancel) from any
/// thread makes the polling loop fail with an
/// [`io::ErrorKind::Interrupted`] error on its next idle tick.
#[derive(Debug, Clone, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Fresh, un-cancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Channel operations the drive loop needs. Implemented by the live
/// ssh2 channel and by stubs in tests.
trait ExecChannel {
    /// Push bytes towards the remote stdin; `Ok(0)` means "would block".
    fn write_stdin(&mut self, data: &[u8]) -> io::Result<usize>;
    /// Signal end of input; `Ok(false)` means "would block, try again".
    fn finish_stdin(&mut self) -> io::Result<bool>;
    /// Pull remote stdout bytes; `Ok(0)` means nothing available now.
    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Pull remote stderr bytes; `Ok(0)` means nothing available now.
    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// Whether the remote side has finished with the channel.
    fn is_closed(&self) -> bool;
    /// Exit status of the finished command.
    fn exit_status(&mut self) -> io::Result<i32>;
}

/// Connection probe sent while the channel stays idle.
trait KeepAlive {
    fn probe(&self) -> io::Result<()>;
}

impl KeepAlive for Session {
    fn probe(&self) -> io::Result<()> {
        match self.raw().keepalive_send() {
            Ok(_) => Ok(()),
            // a full send buffer is not evidence of a dead connection
            Err(err) if would_block(&err) => Ok(()),
            Err(err) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("failed to send keep-alive probe: {err}"),
            )),
        }
    }
}

/// Run `command` on the session, wiring the three caller streams to the
/// remote process, and return its exit status verbatim.
///
/// The session is consumed: whatever the outcome, the execution channel
/// is closed and the session disconnected before this returns. A second
/// command needs a fresh [`crate::open_session`] call.
///
/// # Errors
/// [`TransportError::Io`] on channel failure, keep-alive probe failure
/// or cancellation. A non-zero exit status is not an error.
pub fn run_command(
    session: Session,
    command: &str,
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<i32, TransportError> {
    let result = execute(&session, command, stdin, stdout, stderr);
    session.disconnect();
    result
}

fn execute(
    session: &Session,
    command: &str,
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<i32, TransportError> {
    let mut channel = SshExecChannel::open(session, command)?;
    info!("+ {}", command);
    let outcome = drive(
        &mut channel,
        session,
        stdin,
        stdout,
        stderr,
        session.config().poll_interval,
        &session.cancellation(),
    );
    // channel teardown comes before session disconnect; once an exit
    // status exists a teardown failure must not mask it
    channel.shutdown();
    outcome.map_err(TransportError::Io)
}

/// The polling loop: pump streams while data flows, probe and sleep
/// while nothing does, leave when the channel closes.
fn drive(
    channel: &mut dyn ExecChannel,
    liveness: &dyn KeepAlive,
    stdin: &mut dyn Read,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
    poll_interval: Duration,
    cancel: &Cancellation,
) -> io::Result<i32> {
    let started = Instant::now();
    let mut buf = [0u8; CHUNK];
    let mut pending: Vec<u8> = Vec::new();
    let mut input_open = true;
    let mut eof_sent = false;
    while !channel.is_closed() {
        let mut progressed = false;
        if input_open {
            if pending.is_empty() {
                let n = stdin.read(&mut buf)?;
                if n == 0 {
                    input_open = false;
                } else {
                    pending.extend_from_slice(&buf[..n]);
                }
            }
            if !pending.is_empty() {
                let n = channel.write_stdin(&pending)?;
                if n > 0 {
                    pending.drain(..n);
                    progressed = true;
                }
            }
        }
        if !input_open && pending.is_empty() && !eof_sent {
            eof_sent = channel.finish_stdin()?;
        }
        progressed |= pump(&mut buf, |b| channel.read_stdout(b), stdout)?;
        progressed |= pump(&mut buf, |b| channel.read_stderr(b), stderr)?;
        if !progressed {
            liveness.probe()?;
            thread::sleep(poll_interval);
            if cancel.is_cancelled() {
                return Err(io::Error::new(
                    io::ErrorKind::Interrupted,
                    format!("interrupted after {:?} of waiting", started.elapsed()),
                ));
            }
            debug!(elapsed = ?started.elapsed(), "waiting for remote command to finish");
        }
    }
    // output can arrive together with the close
    pump(&mut buf, |b| channel.read_stdout(b), stdout)?;
    pump(&mut buf, |b| channel.read_stderr(b), stderr)?;
    stdout.flush()?;
    stderr.flush()?;
    channel.exit_status()
}

/// Drain one remote stream into a caller sink; true when bytes moved.
fn pump(
    buf: &mut [u8],
    mut read: impl FnMut(&mut [u8]) -> io::Result<usize>,
    sink: &mut dyn Write,
) -> io::Result<bool> {
    let mut moved = false;
    loop {
        let n = read(buf)?;
        if n == 0 {
            return Ok(moved);
        }
        sink.write_all(&buf[..n])?;
        moved = true;
    }
}

/// Live channel over an ssh2 session, opened non-blocking with no
/// pseudo-terminal (this is command execution, not an interactive
/// shell).
struct SshExecChannel<'s> {
    session: &'s Session,
    channel: ssh2::Channel,
}

impl<'s> SshExecChannel<'s> {
    fn open(session: &'s Session, command: &str) -> Result<Self, TransportError> {
        let mut channel = session
            .raw()
            .channel_session()
            .map_err(|e| TransportError::Io(io_err(e)))?;
        channel
            .exec(command)
            .map_err(|e| TransportError::Io(io_err(e)))?;
        session.raw().set_blocking(false);
        Ok(Self { session, channel })
    }

    /// Best-effort close; failures are logged because by the time this
    /// runs the interesting outcome has already been decided.
    fn shutdown(&mut self) {
        self.session.raw().set_blocking(true);
        if let Err(err) = self.channel.close() {
            debug!(error = %err, "channel close failed");
        }
        if let Err(err) = self.channel.wait_close() {
            warn!(error = %err, "channel did not close cleanly");
        }
    }
}

impl ExecChannel for SshExecChannel<'_> {
    fn write_stdin(&mut self, data: &[u8]) -> io::Result<usize> {
        match self.channel.write(data) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn finish_stdin(&mut self) -> io::Result<bool> {
        match self.channel.send_eof() {
            Ok(()) => Ok(true),
            Err(err) if would_block(&err) => Ok(false),
            Err(err) => Err(io_err(err)),
        }
    }

    fn read_stdout(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.channel.read(buf) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn read_stderr(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.channel.stderr().read(buf) {
            Ok(n) => Ok(n),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(err) => Err(err),
        }
    }

    fn is_closed(&self) -> bool {
        self.channel.eof()
    }

    fn exit_status(&mut self) -> io::Result<i32> {
        self.session.raw().set_blocking(true);
        self.channel.wait_close().map_err(io_err)?;
        self.channel.exit_status().map_err(io_err)
    }
}

fn io_err(err: ssh2::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, err)
}

fn would_block(err: &ssh2::Error) -> bool {
    err.code() == ssh2::ErrorCode::Session(ERR_EAGAIN)
}
