//! Session establishment and liveness configuration

use std::fmt;
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

use rand::Rng;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::credential::Credential;
use crate::endpoint::Endpoint;
use crate::error::TransportError;
use crate::exec::Cancellation;

/// What to do with the host key presented by the server.
///
/// There is exactly one policy: accept whatever the server presents.
/// This library trades MITM protection for zero-config usability in
/// automation contexts; the trade-off lives here as a named policy
/// rather than a hidden default. Do not point it at hosts whose
/// identity you cannot vouch for by other means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostKeyPolicy {
    /// Accept any host key without verification
    #[default]
    InsecureAcceptAll,
}

/// Bounded retry with randomized backoff for session opening.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    /// Base delay between attempts; the actual delay is jittered
    /// between 50% and 150% of this
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 7,
            base_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Jittered delay before the next attempt.
    pub(crate) fn backoff(&self) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        self.base_delay.mul_f64(rand::thread_rng().gen_range(0.5..1.5))
    }
}

/// Session tuning knobs: timeouts, liveness intervals and retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for TCP connect and for the SSH handshake
    pub connect_timeout: Duration,
    /// Interval between transport-level keep-alive probes
    pub keepalive_interval: Duration,
    /// Sleep between liveness checks while waiting for the remote
    /// command to finish
    pub poll_interval: Duration,
    /// Host-key handling
    pub host_key_policy: HostKeyPolicy,
    /// Retry policy for session opening
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            keepalive_interval: Duration::from_secs(1),
            poll_interval: Duration::from_secs(1),
            host_key_policy: HostKeyPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// An open, authenticated transport session bound to one endpoint.
///
/// Single use: [`crate::run_command`] consumes the session and
/// disconnects it when the command finishes, so a second command needs
/// a fresh `open_session` call.
pub struct Session {
    raw: ssh2::Session,
    endpoint: Endpoint,
    config: SessionConfig,
    cancellation: Cancellation,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Endpoint this session is bound to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Configuration the session was opened with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Cloneable handle that interrupts the liveness wait of a running
    /// command from another thread.
    pub fn cancellation(&self) -> Cancellation {
        self.cancellation.clone()
    }

    pub(crate) fn raw(&self) -> &ssh2::Session {
        &self.raw
    }

    /// Graceful disconnect; failures are logged, never propagated.
    pub(crate) fn disconnect(&self) {
        self.raw.set_blocking(true);
        if let Err(err) = self.raw.disconnect(None, "closing", None) {
            warn!(endpoint = %self.endpoint, error = %err, "session disconnect failed");
        } else {
            debug!(endpoint = %self.endpoint, "session closed");
        }
    }
}

/// Open and authenticate a session to `endpoint`, retrying transient
/// failures per `config.retry`.
///
/// Authentication rejections are not retried: a credential the server
/// refused once will be refused again, and a minute-scale backoff loop
/// only delays the diagnosis.
///
/// # Errors
/// [`TransportError::Connection`] when TCP connect or the handshake
/// fails on the last attempt; [`TransportError::Auth`] when the server
/// rejects the credential.
pub fn open_session(
    endpoint: &Endpoint,
    credential: &Credential,
    config: &SessionConfig,
) -> Result<Session, TransportError> {
    let attempts = config.retry.attempts.max(1);
    let mut attempt = 1;
    loop {
        match open_once(endpoint, credential, config) {
            Ok(session) => return Ok(session),
            Err(err) if err.is_transient() && attempt < attempts => {
                let delay = config.retry.backoff();
                warn!(
                    %endpoint,
                    attempt,
                    error = %err,
                    ?delay,
                    "session open failed, will retry"
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn open_once(
    endpoint: &Endpoint,
    credential: &Credential,
    config: &SessionConfig,
) -> Result<Session, TransportError> {
    debug!(%endpoint, "opening SSH session");
    let tcp = TcpStream::connect_timeout(&endpoint.socket_addr(), config.connect_timeout)
        .map_err(|e| TransportError::Connection(format!("{endpoint}: {e}")))?;
    let mut raw = ssh2::Session::new()
        .map_err(|e| TransportError::Connection(format!("{endpoint}: {e}")))?;
    raw.set_tcp_stream(tcp);
    raw.set_timeout(config.connect_timeout.as_millis() as u32);
    raw.handshake()
        .map_err(|e| TransportError::Connection(format!("{endpoint}: handshake: {e}")))?;
    match config.host_key_policy {
        HostKeyPolicy::InsecureAcceptAll => {
            debug!(%endpoint, "host key accepted without verification");
        }
    }
    authenticate(&raw, endpoint, credential)?;
    if !raw.authenticated() {
        return Err(TransportError::Auth(format!(
            "{endpoint}: server did not accept the credential"
        )));
    }
    // Probe scheduling only; libssh2 never drops a session for missed
    // probes, liveness enforcement happens in the polling loop.
    raw.set_keepalive(false, config.keepalive_interval.as_secs().max(1) as u32);
    debug!(%endpoint, "SSH session opened");
    Ok(Session {
        raw,
        endpoint: endpoint.clone(),
        config: config.clone(),
        cancellation: Cancellation::new(),
    })
}

fn authenticate(
    raw: &ssh2::Session,
    endpoint: &Endpoint,
    credential: &Credential,
) -> Result<(), TransportError> {
    match credential {
        Credential::PrivateKey { passphrase, .. } => {
            let key = credential
                .normalized_key()
                .unwrap_or_default();
            debug!(%endpoint, bytes = key.len(), "authenticating with private key");
            raw.userauth_pubkey_memory(
                endpoint.login(),
                None,
                &key,
                passphrase.as_ref().map(|p| p.expose_secret().as_str()),
            )
            .map_err(|e| TransportError::Auth(format!("{endpoint}: {e}")))
        }
        Credential::Password(password) => {
            debug!(%endpoint, "authenticating with password");
            raw.userauth_password(endpoint.login(), password.expose_secret())
                .map_err(|e| TransportError::Auth(format!("{endpoint}: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::mpsc;

    #[test]
    fn config_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.keepalive_interval, Duration::from_secs(1));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.host_key_policy, HostKeyPolicy::InsecureAcceptAll);
        assert_eq!(config.retry.attempts, 7);
        assert_eq!(config.retry.base_delay, Duration::from_secs(60));
    }

    #[test]
    fn backoff_is_jittered_around_base_delay() {
        let policy = RetryPolicy {
            attempts: 7,
            base_delay: Duration::from_secs(60),
        };
        for _ in 0..32 {
            let delay = policy.backoff();
            assert!(delay >= Duration::from_secs(30), "too short: {delay:?}");
            assert!(delay <= Duration::from_secs(90), "too long: {delay:?}");
        }
    }

    #[test]
    fn zero_base_delay_means_no_backoff() {
        let policy = RetryPolicy {
            attempts: 2,
            base_delay: Duration::ZERO,
        };
        assert_eq!(policy.backoff(), Duration::ZERO);
    }

    #[test]
    fn partial_config_deserializes_with_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"poll_interval":{"secs":0,"nanos":50000000}}"#).unwrap();
        assert_eq!(config.poll_interval, Duration::from_millis(50));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.host_key_policy, HostKeyPolicy::InsecureAcceptAll);
    }

    #[test]
    fn transient_open_failures_use_every_attempt() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        let acceptor = thread::spawn(move || {
            // two attempts expected, each dropped before any handshake
            for _ in 0..2 {
                let (stream, _) = listener.accept().unwrap();
                drop(stream);
                tx.send(()).unwrap();
            }
        });

        let endpoint = Endpoint::new(&addr.ip().to_string(), addr.port(), "ops").unwrap();
        let config = SessionConfig {
            connect_timeout: Duration::from_secs(2),
            retry: RetryPolicy {
                attempts: 2,
                base_delay: Duration::ZERO,
            },
            ..SessionConfig::default()
        };
        let err = open_session(&endpoint, &Credential::password("x"), &config).unwrap_err();
        assert!(matches!(err, TransportError::Connection(_)), "{err}");
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        acceptor.join().unwrap();
    }
}
