//! # netexpect-core
//!
//! Shared types for the session engine: the line-event model, the
//! `SessionError` taxonomy, and the publish/subscribe fan-out used by every
//! transport.

pub mod error;
pub mod event;
pub mod pubsub;

pub use error::{SessionError, SessionErrorKind, SessionResult};
pub use event::{ConnectOptions, ConnectionMethod, EventType, LineEvent};
pub use pubsub::{AttachHandle, GlobalSubscribers, Publisher, GLOBAL};
