//! Device profiles, the expect engine and the session manager built on top
//! of `netexpect-core`'s publisher and `netexpect-ssh`/`netexpect-telnet`'s
//! transports.

pub mod config;
pub mod manager;
pub mod profile;
pub mod session;

pub use config::{ConfigError, DeviceRoster, RosterEntry};
pub use manager::Manager;
pub use profile::{Continuation, DeviceProfile, UnknownVendor, Vendor};
pub use session::{ExpectFailure, ExpectResult, Session};
