//! Line-event publish/subscribe fan-out.
//!
//! Each [`Publisher`] belongs to one session. Readers attached to it are
//! scanned into [`LineEvent`]s and dispatched to two subscriber sets: the
//! publisher's own local subscribers, and the process-wide
//! [`GlobalSubscribers`] registry used by cross-cutting observers (logging,
//! tracing). A subscriber whose channel is full has its event dropped rather
//! than stalling the dispatch loop — the bounded channel's capacity *is* the
//! drop threshold, so a full channel and a `try_send` failure are the same
//! event.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;

use crate::event::{EventType, LineEvent};

/// Subscriber channel capacity. A subscriber more than this many events
/// behind the dispatch loop starts losing events instead of blocking it.
pub const SUBSCRIBER_CAPACITY: usize = 20;

/// Idle sleep between scanner reads/dispatch polls, to avoid a hot spin
/// when neither side has anything ready. Doubles as the reader loop's
/// "nothing else arrived" window: a buffered-but-unterminated tail (a
/// vendor prompt with no trailing `\r`/`\n`, the common case) is flushed
/// as its own line once a read waits this long without new bytes, rather
/// than held indefinitely for a terminator that will never come.
const IDLE_SLEEP_MS: u64 = 20;

lazy_static::lazy_static! {
    /// Process-wide subscriber registry, shared by every [`Publisher`] in
    /// the process. Intended for cross-cutting observers (logging,
    /// tracing), not for session-specific consumption.
    pub static ref GLOBAL: GlobalSubscribers = GlobalSubscribers::new();
}

/// The process-wide subscriber registry. A single instance lives in
/// [`GLOBAL`]; tests that need isolation should construct their own
/// `GlobalSubscribers` rather than mutate the shared one.
pub struct GlobalSubscribers {
    subs: RwLock<HashMap<u64, mpsc::Sender<LineEvent>>>,
    next_id: AtomicU64,
}

impl GlobalSubscribers {
    pub fn new() -> Self {
        Self {
            subs: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    /// Subscribes to every session's line events. Returns the new id and a
    /// receiver of capacity [`SUBSCRIBER_CAPACITY`].
    pub async fn subscribe(&self) -> (u64, mpsc::Receiver<LineEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.subs.write().await.insert(id, tx);
        (id, rx)
    }

    /// Removing an id that is not present is a no-op.
    pub async fn unsubscribe(&self, id: u64) {
        self.subs.write().await.remove(&id);
    }

    async fn dispatch(&self, event: &LineEvent) {
        let subs = self.subs.read().await;
        for tx in subs.values() {
            let _ = tx.try_send(event.clone());
        }
    }
}

impl Default for GlobalSubscribers {
    fn default() -> Self {
        Self::new()
    }
}

/// Fans line events scanned from a session's transport readers out to
/// local subscribers and the process-wide [`GLOBAL`] registry.
pub struct Publisher {
    session_id: String,
    local: RwLock<HashMap<u64, mpsc::Sender<LineEvent>>>,
    next_local_id: AtomicU64,
    input_tx: mpsc::Sender<LineEvent>,
    shutdown: Arc<AtomicBool>,
}

/// Handle returned by [`Publisher::attach`]; join it from `Disconnect` to
/// wait for every reader pump and the dispatch loop to exit.
pub struct AttachHandle {
    shutdown: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl AttachHandle {
    /// Signals every worker to stop and waits for them to exit.
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.workers {
            let _ = handle.await;
        }
    }
}

impl Publisher {
    /// Creates a new publisher for `session_id`. Returns the publisher and
    /// the input channel sender that reader pumps publish scanned lines
    /// through; `attach` takes care of wiring readers to this sender for
    /// the common case.
    pub fn new(session_id: impl Into<String>) -> (Arc<Publisher>, mpsc::Receiver<LineEvent>) {
        let (input_tx, input_rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let publisher = Arc::new(Publisher {
            session_id: session_id.into(),
            local: RwLock::new(HashMap::new()),
            next_local_id: AtomicU64::new(0),
            input_tx,
            shutdown: Arc::new(AtomicBool::new(false)),
        });
        (publisher, input_rx)
    }

    /// Subscribes to this session's line events only.
    pub async fn subscribe(&self) -> (u64, mpsc::Receiver<LineEvent>) {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        let id = self.next_local_id.fetch_add(1, Ordering::SeqCst);
        self.local.write().await.insert(id, tx);
        log::debug!("publisher[{}]: subscribed id {}", self.session_id, id);
        (id, rx)
    }

    /// Removing an id that is not present is a no-op.
    pub async fn unsubscribe(&self, id: u64) {
        log::debug!("publisher[{}]: unsubscribed id {}", self.session_id, id);
        self.local.write().await.remove(&id);
    }

    /// Spawns a reader pump for `stdout` (and, if present, `stderr`) plus
    /// the dispatch loop, and returns a handle to join them on shutdown.
    /// `input_rx` must be the receiver returned alongside this publisher
    /// by [`Publisher::new`].
    pub fn attach<StdoutReader, StderrReader>(
        self: &Arc<Self>,
        input_rx: mpsc::Receiver<LineEvent>,
        stdout: StdoutReader,
        stderr: Option<StderrReader>,
    ) -> AttachHandle
    where
        StdoutReader: AsyncRead + Unpin + Send + 'static,
        StderrReader: AsyncRead + Unpin + Send + 'static,
    {
        let shutdown = self.shutdown.clone();
        let mut workers = Vec::with_capacity(3);

        let session_id = self.session_id.clone();
        let stop_stdout = shutdown.clone();
        let stdout_tx = self.input_tx.clone();
        workers.push(tokio::spawn(async move {
            read_lines(session_id, stdout, EventType::Stdout, stdout_tx, stop_stdout).await;
        }));

        if let Some(stderr) = stderr {
            let session_id = self.session_id.clone();
            let stop_stderr = shutdown.clone();
            let stderr_tx = self.input_tx.clone();
            workers.push(tokio::spawn(async move {
                read_lines(session_id, stderr, EventType::Stderr, stderr_tx, stop_stderr).await;
            }));
        }

        let dispatch_self = self.clone();
        let dispatch_shutdown = shutdown.clone();
        workers.push(tokio::spawn(async move {
            dispatch_self.dispatch_loop(input_rx, dispatch_shutdown).await;
        }));

        AttachHandle { shutdown, workers }
    }

    async fn dispatch_loop(&self, mut input_rx: mpsc::Receiver<LineEvent>, shutdown: Arc<AtomicBool>) {
        loop {
            if shutdown.load(Ordering::SeqCst) {
                return;
            }
            match tokio::time::timeout(
                std::time::Duration::from_millis(IDLE_SLEEP_MS),
                input_rx.recv(),
            )
            .await
            {
                Ok(Some(event)) => {
                    let locals = self.local.read().await;
                    for tx in locals.values() {
                        let _ = tx.try_send(event.clone());
                    }
                    drop(locals);
                    GLOBAL.dispatch(&event).await;
                }
                Ok(None) => return,
                Err(_elapsed) => continue,
            }
        }
    }
}

async fn read_lines<R: AsyncRead + Unpin>(
    session_id: String,
    mut reader: R,
    dir: EventType,
    output: mpsc::Sender<LineEvent>,
    shutdown: Arc<AtomicBool>,
) {
    let mut pending = Vec::new();
    let mut chunk = [0u8; 4096];
    let idle_window = std::time::Duration::from_millis(IDLE_SLEEP_MS);
    loop {
        if shutdown.load(Ordering::SeqCst) {
            return;
        }
        match tokio::time::timeout(idle_window, reader.read(&mut chunk)).await {
            Ok(Ok(0)) => {
                flush_tail(&session_id, &mut pending, dir, &output).await;
                return;
            }
            Ok(Ok(n)) => {
                pending.extend_from_slice(&chunk[..n]);
                scan_lines(&session_id, &mut pending, dir, &output).await;
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::WouldBlock => {}
            Ok(Err(_)) => {
                flush_tail(&session_id, &mut pending, dir, &output).await;
                return;
            }
            Err(_elapsed) => {
                // Nothing else arrived within the idle window: whatever is
                // buffered without a terminator is as final as it will get
                // (e.g. a device prompt), so surface it now.
                flush_tail(&session_id, &mut pending, dir, &output).await;
            }
        }
    }
}

/// Splits `pending` on `\n` or `\r`, emitting every complete line and
/// leaving an unterminated tail in `pending` for the next read.
async fn scan_lines(
    session_id: &str,
    pending: &mut Vec<u8>,
    dir: EventType,
    output: &mpsc::Sender<LineEvent>,
) {
    let mut start = 0;
    let mut i = 0;
    while i < pending.len() {
        if pending[i] == b'\n' || pending[i] == b'\r' {
            let line = String::from_utf8_lossy(&pending[start..i]).into_owned();
            let _ = output.send(LineEvent::new(session_id, line, dir)).await;
            start = i + 1;
        }
        i += 1;
    }
    pending.drain(0..start);
}

/// On EOF/error, the remaining unterminated bytes (if any) are emitted as
/// a final line, matching the scanner's "unterminated tail" behavior.
async fn flush_tail(
    session_id: &str,
    pending: &mut Vec<u8>,
    dir: EventType,
    output: &mpsc::Sender<LineEvent>,
) {
    if !pending.is_empty() {
        let line = String::from_utf8_lossy(pending).into_owned();
        let _ = output.send(LineEvent::new(session_id, line, dir)).await;
        pending.clear();
    }
}
