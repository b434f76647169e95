//! `netexpect`: a multi-vendor network-device interaction engine.
//!
//! The core is [`netexpect_session::Manager`], built on a [`Session`] per
//! device, which in turn layers a [`netexpect_core`] publisher over an
//! SSH ([`netexpect_ssh`]) or Telnet ([`netexpect_telnet`]) transport. This
//! crate re-exports the pieces most callers need and adds the CSV-driven
//! device roster parsing used by the demonstration binary.

pub use netexpect_core::{
    ConnectOptions, ConnectionMethod, EventType, GlobalSubscribers, LineEvent, SessionError,
    SessionErrorKind, GLOBAL,
};
pub use netexpect_session::{ConfigError, DeviceProfile, ExpectFailure, ExpectResult, Manager, Session, Vendor};

pub mod roster;

pub use roster::{CsvRosterEntry, RosterError, RosterErrorKind};
