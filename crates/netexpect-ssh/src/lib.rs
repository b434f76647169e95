//! SSH transport: a PTY-backed remote shell bridged onto async `tokio` I/O.
//!
//! `ssh2` is a blocking library. A dedicated OS thread owns the `Channel`
//! for its entire lifetime and pumps bytes both ways; async callers see a
//! `tokio::io::AsyncRead` for each of stdout/stderr (via `StreamReader` over
//! a channel-backed `ReceiverStream`) and an async `write()` that hands data
//! to the thread through an unbounded command channel.

use std::io::{self, ErrorKind, Read, Write as _};
use std::time::Duration;

use bytes::Bytes;
use netexpect_core::SessionError;
use ssh2::{PtyModes, Session};
use tokio::net::TcpStream as AsyncTcpStream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;

/// RFC 4254 terminal-mode opcodes used for the PTY request.
const ECHO: u8 = 53;
const TTY_OP_ISPEED: u8 = 128;
const TTY_OP_OSPEED: u8 = 129;

const MIN_SLEEP_MS: u64 = 1;
const MAX_SLEEP_MS: u64 = 10;
const IDLE_THRESHOLD: u32 = 10;
const READ_CHUNK: usize = 16384;

/// PTY dimensions and terminal type a vendor profile wants requested.
#[derive(Debug, Clone)]
pub struct PtyOptions {
    pub term: String,
    pub cols: u32,
    pub rows: u32,
}

impl Default for PtyOptions {
    fn default() -> Self {
        Self {
            term: "xterm".to_string(),
            cols: 80,
            rows: 40,
        }
    }
}

/// Authentication material for an SSH dial.
pub enum SshAuth {
    Password(String),
    PrivateKeyFile { path: String, passphrase: Option<String> },
}

/// Everything a vendor profile may want to customize about a dial.
#[derive(Debug, Clone, Default)]
pub struct SshDialOptions {
    pub pty: PtyOptions,
    /// Overrides the negotiated cipher list for both directions, matching
    /// the vendor-profile cipher overrides documented for older platforms.
    pub cipher_override: Option<Vec<String>>,
    /// When false, the host key is accepted unconditionally (matches the
    /// behavior of vendor profiles whose login sequence never checked it).
    pub strict_host_key_checking: bool,
}

type ByteStream = StreamReader<ReceiverStream<io::Result<Bytes>>, Bytes>;

enum Command {
    Write(Vec<u8>),
    Close,
}

/// A live SSH+PTY transport. `stdout`/`stderr` are handed to the publisher;
/// `write`/`close` drive the remote shell.
pub struct SshTransport {
    cmd_tx: mpsc::UnboundedSender<Command>,
    pub stdout: ByteStream,
    pub stderr: ByteStream,
}

/// The write half of an [`SshTransport`], split off so the reader halves can
/// be handed to a publisher while the session keeps this for `Write`/close.
#[derive(Clone)]
pub struct SshWriteHandle {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl SshWriteHandle {
    pub async fn write(&self, data: &[u8]) -> Result<usize, SessionError> {
        self.cmd_tx
            .send(Command::Write(data.to_vec()))
            .map_err(|_| SessionError::write("ssh transport pump has already shut down"))?;
        Ok(data.len())
    }

    pub async fn close(&self) {
        let _ = self.cmd_tx.send(Command::Close);
    }
}

impl SshTransport {
    /// Dials `host:port`, authenticates, requests a PTY and starts a shell.
    pub async fn connect(
        host: &str,
        port: u16,
        username: &str,
        auth: SshAuth,
        opts: SshDialOptions,
    ) -> Result<Self, SessionError> {
        let port = if port == 0 { 22 } else { port };
        let addr = format!("{host}:{port}");
        log::info!("[ssh] connecting to {addr}");

        let async_stream = AsyncTcpStream::connect(&addr).await.map_err(|e| {
            log::warn!("[ssh] dial to {addr} failed: {e}");
            SessionError::connect(format!("ssh dial to {addr} failed: {e}"))
        })?;
        let std_stream = async_stream
            .into_std()
            .map_err(|e| SessionError::connect(format!("failed to detach socket: {e}")))?;
        std_stream
            .set_nonblocking(false)
            .map_err(|e| SessionError::connect(format!("failed to set blocking mode: {e}")))?;

        let username = username.to_string();
        let pty = opts.pty.clone();
        let cipher_override = opts.cipher_override.clone();
        let strict_host_key_checking = opts.strict_host_key_checking;

        // ssh2's Session/Channel are blocking types; handshake, auth and the
        // PTY/shell setup all happen on a blocking thread so the async
        // caller never stalls the runtime.
        let (channel, session) = tokio::task::spawn_blocking(move || {
            let mut session = Session::new()
                .map_err(|e| SessionError::connect(format!("failed to create ssh session: {e}")))?;
            session.set_tcp_stream(std_stream);

            if let Some(ciphers) = &cipher_override {
                let list = ciphers.join(",");
                session
                    .method_pref(ssh2::MethodType::CryptCs, &list)
                    .map_err(|e| SessionError::connect(format!("cipher override failed: {e}")))?;
                session
                    .method_pref(ssh2::MethodType::CryptSc, &list)
                    .map_err(|e| SessionError::connect(format!("cipher override failed: {e}")))?;
            }

            session
                .handshake()
                .map_err(|e| SessionError::connect(format!("ssh handshake failed: {e}")))?;

            if strict_host_key_checking {
                session
                    .known_hosts()
                    .map_err(|e| SessionError::connect(format!("host key check failed: {e}")))?;
            }

            match auth {
                SshAuth::Password(password) => {
                    session
                        .userauth_password(&username, &password)
                        .map_err(|e| SessionError::auth(format!("password auth failed: {e}")))?;
                }
                SshAuth::PrivateKeyFile { path, passphrase } => {
                    session
                        .userauth_pubkey_file(
                            &username,
                            None,
                            std::path::Path::new(&path),
                            passphrase.as_deref(),
                        )
                        .map_err(|e| SessionError::auth(format!("key auth failed: {e}")))?;
                }
            }

            let mut channel = session
                .channel_session()
                .map_err(|e| SessionError::connect(format!("channel open failed: {e}")))?;

            let mut modes = PtyModes::new();
            modes.set_u32(ECHO, 0);
            modes.set_u32(TTY_OP_ISPEED, 14400);
            modes.set_u32(TTY_OP_OSPEED, 14400);
            channel
                .request_pty(&pty.term, Some(modes), Some((pty.cols, pty.rows, 0, 0)))
                .map_err(|e| SessionError::connect(format!("pty request failed: {e}")))?;

            channel
                .shell()
                .map_err(|e| SessionError::connect(format!("shell start failed: {e}")))?;

            session.set_blocking(false);

            Ok::<_, SessionError>((channel, session))
        })
        .await
        .map_err(|e| SessionError::connect(format!("ssh setup task panicked: {e}")))??;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (stdout_tx, stdout_rx) = mpsc::channel(64);
        let (stderr_tx, stderr_rx) = mpsc::channel(64);

        log::info!("[ssh] shell started on {addr}");
        std::thread::spawn(move || pump(channel, session, cmd_rx, stdout_tx, stderr_tx));

        let stdout = StreamReader::new(ReceiverStream::new(stdout_rx));
        let stderr = StreamReader::new(ReceiverStream::new(stderr_rx));

        Ok(Self {
            cmd_tx,
            stdout,
            stderr,
        })
    }

    /// Writes bytes to the remote shell's stdin.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, SessionError> {
        self.cmd_tx
            .send(Command::Write(data.to_vec()))
            .map_err(|_| SessionError::write("ssh transport pump has already shut down"))?;
        Ok(data.len())
    }

    /// Shuts the channel down. Idempotent: a closed pump thread simply drops
    /// the second `Close` command on an already-disconnected receiver.
    pub async fn close(&mut self) {
        let _ = self.cmd_tx.send(Command::Close);
    }

    /// Splits the transport into an owned write handle and the two reader
    /// halves, so the readers can be attached to a publisher while the
    /// session retains the write handle for `Write`/`Expect` calls.
    pub fn split(self) -> (SshWriteHandle, ByteStream, ByteStream) {
        (SshWriteHandle { cmd_tx: self.cmd_tx }, self.stdout, self.stderr)
    }
}

/// Owns the blocking `Channel` for its lifetime: drains queued writes, reads
/// whatever is available on stdout/stderr, and backs off when idle. Mirrors
/// the increasing-backoff poll loop used for interactive SSH shells, scaled
/// down from that use case's UI-refresh cadence to this one's line-oriented
/// expect loop.
fn pump(
    mut channel: ssh2::Channel,
    _session: Session,
    mut cmd_rx: mpsc::UnboundedReceiver<Command>,
    stdout_tx: mpsc::Sender<io::Result<Bytes>>,
    stderr_tx: mpsc::Sender<io::Result<Bytes>>,
) {
    let mut buf = [0u8; READ_CHUNK];
    let mut idle_count: u32 = 0;
    let mut running = true;

    while running {
        while let Ok(cmd) = cmd_rx.try_recv() {
            match cmd {
                Command::Write(data) => {
                    if let Err(e) = channel.write_all(&data) {
                        let _ = stdout_tx.blocking_send(Err(io::Error::new(ErrorKind::BrokenPipe, e)));
                        running = false;
                        break;
                    }
                    let _ = channel.flush();
                    idle_count = 0;
                }
                Command::Close => {
                    let _ = channel.close();
                    running = false;
                }
            }
        }
        if !running {
            break;
        }

        let mut made_progress = false;

        match channel.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                made_progress = true;
                if stdout_tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                    running = false;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                log::warn!("[ssh] stdout read error: {e}");
                let _ = stdout_tx.blocking_send(Err(e));
                running = false;
            }
        }

        match channel.stderr().read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                made_progress = true;
                if stderr_tx.blocking_send(Ok(Bytes::copy_from_slice(&buf[..n]))).is_err() {
                    running = false;
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => {
                let _ = stderr_tx.blocking_send(Err(e));
                running = false;
            }
        }

        if channel.eof() {
            running = false;
        }

        if made_progress {
            idle_count = 0;
        } else {
            idle_count = idle_count.saturating_add(1);
        }

        let sleep_ms = if idle_count > IDLE_THRESHOLD {
            MAX_SLEEP_MS
        } else {
            MIN_SLEEP_MS
        };
        std::thread::sleep(Duration::from_millis(sleep_ms));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pty_options_default_matches_base_profile() {
        let pty = PtyOptions::default();
        assert_eq!(pty.term, "xterm");
        assert_eq!(pty.cols, 80);
        assert_eq!(pty.rows, 40);
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails_with_connect_error() {
        let result = SshTransport::connect(
            "127.0.0.1",
            1,
            "user",
            SshAuth::Password("pw".to_string()),
            SshDialOptions::default(),
        )
        .await;
        assert!(result.is_err());
    }
}
