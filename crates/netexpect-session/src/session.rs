//! The `Session`: ties a transport, a publisher and a device profile
//! together into connect/write/expect/disconnect.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use netexpect_core::{
    AttachHandle, ConnectOptions, ConnectionMethod, EventType, LineEvent, Publisher, SessionError,
    SessionResult,
};
use netexpect_ssh::{SshAuth, SshDialOptions, SshTransport, SshWriteHandle};
use netexpect_telnet::{TelnetTransport, TelnetWriteHandle};
use regex::Regex;
use tokio::sync::Mutex as AsyncMutex;

use crate::profile::DeviceProfile;

/// Coarse session lifecycle, tracked alongside the finer-grained `ready`
/// gate used for Expect mutual exclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum State {
    Initialized = 0,
    Connecting = 1,
    Ready = 2,
    Busy = 3,
    Disconnected = 4,
}

impl From<u8> for State {
    fn from(v: u8) -> Self {
        match v {
            0 => State::Initialized,
            1 => State::Connecting,
            2 => State::Ready,
            3 => State::Busy,
            _ => State::Disconnected,
        }
    }
}

enum TransportWriter {
    Ssh(SshWriteHandle),
    Telnet(AsyncMutex<TelnetWriteHandle>),
}

impl TransportWriter {
    async fn write(&self, data: &[u8]) -> Result<usize, SessionError> {
        match self {
            TransportWriter::Ssh(handle) => handle.write(data).await,
            TransportWriter::Telnet(handle) => handle.lock().await.write(data).await,
        }
    }

    async fn close(&self) {
        match self {
            TransportWriter::Ssh(handle) => handle.close().await,
            TransportWriter::Telnet(handle) => handle.lock().await.close().await,
        }
    }
}

/// The lines accumulated by a failed expect, paired with the error that
/// ended it. Successful expects just return `Vec<String>`.
#[derive(Debug)]
pub struct ExpectFailure {
    pub lines: Vec<String>,
    pub error: SessionError,
}

pub type ExpectResult = Result<Vec<String>, ExpectFailure>;

/// One live interactive connection to one device.
pub struct Session {
    id: String,
    profile: DeviceProfile,
    writer: TransportWriter,
    publisher: Arc<Publisher>,
    attach_handle: AsyncMutex<Option<AttachHandle>>,
    state: AtomicU8,
}

impl Session {
    /// Opens the transport for `options`, attaches the publisher, runs the
    /// Telnet login script when applicable, and issues the profile's
    /// post-login init commands. Returns a session in the `Ready` state.
    pub async fn connect(
        id: impl Into<String>,
        profile: DeviceProfile,
        options: &ConnectOptions,
    ) -> SessionResult<Arc<Session>> {
        let id = id.into();
        log::info!(
            "[session:{id}] connecting to {}:{} via {:?} as {:?}",
            options.host, options.port, options.method, profile.vendor
        );

        if !profile.supported_methods.contains(&options.method) {
            log::warn!(
                "[session:{id}] {:?} does not support {:?}",
                profile.vendor, options.method
            );
            return Err(SessionError::unsupported_method(format!(
                "{:?} does not support {:?}",
                profile.vendor, options.method
            )));
        }

        let (publisher, input_rx) = Publisher::new(id.clone());

        let (writer, attach_handle) = match options.method {
            ConnectionMethod::Ssh => {
                let auth = match &options.private_key_path {
                    Some(path) => SshAuth::PrivateKeyFile {
                        path: path.clone(),
                        passphrase: None,
                    },
                    None => SshAuth::Password(options.password.clone()),
                };
                let dial = SshDialOptions {
                    pty: profile.pty.clone(),
                    cipher_override: profile.cipher_override.clone(),
                    strict_host_key_checking: false,
                };
                let transport =
                    SshTransport::connect(&options.host, options.port, &options.username, auth, dial)
                        .await?;
                let (write_handle, stdout, stderr) = transport.split();
                let attach = publisher.attach(input_rx, stdout, Some(stderr));
                (TransportWriter::Ssh(write_handle), attach)
            }
            ConnectionMethod::Telnet => {
                let transport = TelnetTransport::connect(&options.host, options.port).await?;
                let (write_handle, reader) = transport.split();
                let attach = publisher.attach::<_, tokio::io::Empty>(input_rx, reader, None);
                (TransportWriter::Telnet(AsyncMutex::new(write_handle)), attach)
            }
        };

        let session = Arc::new(Session {
            id,
            profile,
            writer,
            publisher,
            attach_handle: AsyncMutex::new(Some(attach_handle)),
            state: AtomicU8::new(State::Connecting as u8),
        });

        if options.method == ConnectionMethod::Telnet {
            session.login_telnet(&options.username, &options.password).await?;
            log::debug!("[session:{}] telnet login sequence completed", session.id);
        }

        // Post-login init commands (e.g. "terminal length 0\r") are fired
        // and forgotten, matching the source's raw `stdin.Write(...)` — the
        // profile's strings already carry their own trailing terminator, and
        // `connect` does not block waiting for the device to echo a prompt
        // back before considering the session ready.
        for cmd in &session.profile.post_login_init {
            session.writer.write(cmd.as_bytes()).await?;
        }

        session.state.store(State::Ready as u8, Ordering::Release);
        log::info!("[session:{}] ready", session.id);
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn vendor(&self) -> crate::profile::Vendor {
        self.profile.vendor
    }

    /// Subscribes to this session's published line events.
    pub async fn subscribe(&self) -> (u64, tokio::sync::mpsc::Receiver<LineEvent>) {
        self.publisher.subscribe().await
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.publisher.unsubscribe(id).await;
    }

    /// Raw write, not gated by readiness: optionally appends `\r`.
    pub async fn write(&self, data: &str, newline: bool) -> Result<usize, SessionError> {
        let mut bytes = data.as_bytes().to_vec();
        if newline {
            bytes.push(b'\r');
        }
        self.writer.write(&bytes).await
    }

    /// `WriteExpect(cmd, pattern)` with the profile's default timeout.
    pub async fn write_expect(&self, cmd: &str, pattern: &Regex) -> ExpectResult {
        let timeout = self.profile.default_timeout;
        self.write_expect_timeout(cmd, pattern, timeout).await
    }

    /// Shortcut for `WriteExpect(cmd, session.prompt)`.
    pub async fn write_capture(&self, cmd: &str) -> ExpectResult {
        let pattern = self.profile.prompt.clone();
        self.write_expect(cmd, &pattern).await
    }

    /// Full form: acquires the readiness gate, runs `cmd` through the
    /// expect loop against `pattern` with `timeout`, releases the gate.
    pub async fn write_expect_timeout(
        &self,
        cmd: &str,
        pattern: &Regex,
        timeout: Duration,
    ) -> ExpectResult {
        self.acquire_ready().map_err(|error| ExpectFailure {
            lines: Vec::new(),
            error,
        })?;
        let result = self.run_expect(cmd, pattern, timeout).await;
        self.release_ready();
        result
    }

    /// `Expect(pattern, timeout)`: same as the full form with an empty
    /// command (pure wait, no write).
    pub async fn expect(&self, pattern: &Regex, timeout: Duration) -> ExpectResult {
        self.write_expect_timeout("", pattern, timeout).await
    }

    fn acquire_ready(&self) -> Result<(), SessionError> {
        match self.state.compare_exchange(
            State::Ready as u8,
            State::Busy as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(_) => {
                log::warn!("[session:{}] expect rejected, session not ready", self.id);
                Err(SessionError::not_ready(format!(
                    "session {} is not ready for a new expect",
                    self.id
                )))
            }
        }
    }

    fn release_ready(&self) {
        let _ = self.state.compare_exchange(
            State::Busy as u8,
            State::Ready as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Telnet login: scripted expect sequence against the profile's
    /// login/password prompts, each step bounded by a 20 second timeout.
    async fn login_telnet(&self, username: &str, password: &str) -> SessionResult<()> {
        const LOGIN_TIMEOUT: Duration = Duration::from_secs(20);

        let login_pattern = self.profile.login_prompt.clone().ok_or_else(|| {
            SessionError::auth(format!("{:?} has no telnet login prompt configured", self.profile.vendor))
        })?;

        self.run_expect("", &login_pattern, LOGIN_TIMEOUT)
            .await
            .map_err(|f| SessionError::auth(format!("waiting for login prompt: {}", f.error)))?;

        self.writer
            .write(format!("{username}\r").as_bytes())
            .await
            .map_err(|e| SessionError::auth(format!("writing username: {e}")))?;

        let password_pattern = self.profile.password_prompt.clone();
        self.run_expect("", &password_pattern, LOGIN_TIMEOUT)
            .await
            .map_err(|f| SessionError::auth(format!("waiting for password prompt: {}", f.error)))?;

        self.writer
            .write(format!("{password}\r").as_bytes())
            .await
            .map_err(|e| SessionError::auth(format!("writing password: {e}")))?;

        let prompt = self.profile.prompt.clone();
        self.run_expect("", &prompt, LOGIN_TIMEOUT)
            .await
            .map_err(|f| SessionError::auth(format!("waiting for prompt after login: {}", f.error)))?;

        Ok(())
    }

    /// Core expect loop, independent of the readiness gate so `connect`
    /// can drive the login script and post-login init commands before the
    /// session is marked `Ready`.
    async fn run_expect(&self, cmd: &str, pattern: &Regex, timeout: Duration) -> ExpectResult {
        let (sub_id, mut rx) = self.publisher.subscribe().await;

        if !cmd.is_empty() {
            if let Err(error) = self.writer.write(format!("{cmd}\r").as_bytes()).await {
                self.publisher.unsubscribe(sub_id).await;
                return Err(ExpectFailure {
                    lines: Vec::new(),
                    error,
                });
            }
        }

        let mut accumulator = Vec::new();
        let outcome = loop {
            match tokio::time::timeout(timeout, rx.recv()).await {
                Ok(Some(event)) => match event.dir {
                    EventType::Stdout => {
                        accumulator.push(event.message.clone());
                        if pattern.is_match(&event.message) {
                            break Ok(accumulator.clone());
                        }
                        if let Some(continuation) = self
                            .profile
                            .continuations
                            .iter()
                            .find(|c| c.pattern.is_match(&event.message))
                        {
                            let _ = self.writer.write(continuation.reply.as_bytes()).await;
                        }
                    }
                    EventType::Stderr => {
                        accumulator.push(event.message.clone());
                    }
                    EventType::Stdin => {}
                },
                Ok(None) => {
                    break Err(SessionError::shutdown("publisher channel closed"));
                }
                Err(_elapsed) => {
                    log::debug!(
                        "[session:{}] expect timed out after {timeout:?} with {} lines captured",
                        self.id,
                        accumulator.len()
                    );
                    break Err(SessionError::timeout(format!(
                        "no matching line within {timeout:?}"
                    )));
                }
            }
        };

        self.publisher.unsubscribe(sub_id).await;

        outcome.map_err(|error| ExpectFailure {
            lines: accumulator,
            error,
        })
    }

    /// Closes the writer, then the transport; raises the publisher's
    /// shutdown signal and joins its workers. Idempotent after the first
    /// call returns.
    pub async fn disconnect(&self) {
        log::info!("[session:{}] disconnecting", self.id);
        self.writer.close().await;
        if let Some(handle) = self.attach_handle.lock().await.take() {
            handle.shutdown().await;
        }
        self.state.store(State::Disconnected as u8, Ordering::Release);
        log::debug!("[session:{}] disconnected", self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netexpect_core::SessionErrorKind;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn bind_loopback() -> (TcpListener, String, u16) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr.ip().to_string(), addr.port())
    }

    async fn base_handshake(socket: &mut TcpStream) {
        let mut buf = [0u8; 64];
        socket.write_all(b"Login:\n").await.unwrap();
        let _ = socket.read(&mut buf).await.unwrap();
        socket.write_all(b"Password:\n").await.unwrap();
        let _ = socket.read(&mut buf).await.unwrap();
        socket.write_all(b"device > ").await.unwrap();
    }

    #[tokio::test]
    async fn a_second_expect_is_rejected_while_the_first_is_in_flight() {
        let (listener, host, port) = bind_loopback().await;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            base_handshake(&mut socket).await;
            // Never sends a line matching the pattern the first expect
            // waits on, so it stays in flight until its own timeout fires.
            tokio::time::sleep(Duration::from_millis(400)).await;
        });

        let profile = DeviceProfile::for_vendor(crate::profile::Vendor::Base);
        let options = ConnectOptions {
            host,
            port,
            username: "test".to_string(),
            password: "password".to_string(),
            enable_password: String::new(),
            private_key_path: None,
            method: ConnectionMethod::Telnet,
        };
        let session = Session::connect("d", profile, &options).await.unwrap();

        let never_matches = Regex::new(r"this pattern never appears").unwrap();
        let first = {
            let session = session.clone();
            let pattern = never_matches.clone();
            tokio::spawn(
                async move { session.expect(&pattern, Duration::from_millis(300)).await },
            )
        };

        // Give the spawned call time to win the readiness gate before this
        // one tries to acquire it too.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let second = session.expect(&never_matches, Duration::from_millis(50)).await;
        let failure = second.expect_err("a concurrent expect must be rejected, not block");
        assert_eq!(failure.error.kind, SessionErrorKind::NotReady);

        let first_result = first.await.unwrap();
        assert!(first_result.unwrap_err().error.is_timeout());

        server.await.unwrap();
        session.disconnect().await;
    }
}
