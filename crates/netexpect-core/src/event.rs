//! Line-event model and connection options shared by every transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Direction a line event was produced on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Stdin,
    Stderr,
    Stdout,
}

/// How a session dials its device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionMethod {
    Ssh,
    Telnet,
}

/// Parameters needed to open a connection to a device, independent of vendor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectOptions {
    pub host: String,
    /// 0 means "use the transport's default" (23 for Telnet, 22 for SSH).
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub enable_password: String,
    #[serde(default)]
    pub private_key_path: Option<String>,
    pub method: ConnectionMethod,
}

/// A single scanned line published by a session's [`crate::pubsub::Publisher`].
#[derive(Debug, Clone)]
pub struct LineEvent {
    /// Identifies which session produced this line; opaque to the core.
    pub source: String,
    pub message: String,
    pub dir: EventType,
    pub time: DateTime<Utc>,
}

impl LineEvent {
    pub fn new(source: impl Into<String>, message: impl Into<String>, dir: EventType) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            dir,
            time: Utc::now(),
        }
    }
}
