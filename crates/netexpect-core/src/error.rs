//! Session-level error type.

use std::fmt;

/// Categorised session error.
#[derive(Debug, Clone)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// Dial failed, session creation failed, PTY request failed, shell start
    /// failed, or a Telnet connect failed. Non-retryable within a session.
    Connect,
    /// Telnet login script failed (username/password/prompt step).
    Auth,
    /// The device profile does not advertise the requested connection method.
    UnsupportedMethod,
    /// Expect was called while another was in flight, or before connect.
    NotReady,
    /// A write to the underlying transport failed.
    Write,
    /// The inter-line idle timeout elapsed before the expectation matched.
    Timeout,
    /// Internal: a reader or dispatch loop is exiting due to shutdown.
    /// Never surfaced across the public API.
    Shutdown,
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    pub fn new(kind: SessionErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            session_id: None,
        }
    }

    pub fn with_session(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn connect(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Connect, msg)
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Auth, msg)
    }

    pub fn unsupported_method(method: impl fmt::Display) -> Self {
        Self::new(
            SessionErrorKind::UnsupportedMethod,
            format!("connection method '{}' is not supported by this device profile", method),
        )
    }

    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::NotReady, msg)
    }

    pub fn write(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Write, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Timeout, msg)
    }

    pub fn shutdown(msg: impl Into<String>) -> Self {
        Self::new(SessionErrorKind::Shutdown, msg)
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == SessionErrorKind::Timeout
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session_id {
            Some(id) => write!(f, "[{:?} session={}] {}", self.kind, id, self.message),
            None => write!(f, "[{:?}] {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::TimedOut {
            Self::timeout(format!("I/O timeout: {}", e))
        } else {
            Self::connect(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let err = SessionError::not_ready("expect already in flight");
        let rendered = err.to_string();
        assert!(rendered.contains("NotReady"));
        assert!(rendered.contains("expect already in flight"));
    }

    #[test]
    fn with_session_attaches_id() {
        let err = SessionError::connect("dial failed").with_session("d1");
        assert_eq!(err.session_id.as_deref(), Some("d1"));
    }

    #[test]
    fn io_timeout_maps_to_timeout_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::TimedOut, "deadline exceeded");
        let err: SessionError = io_err.into();
        assert_eq!(err.kind, SessionErrorKind::Timeout);
    }

    #[test]
    fn io_other_maps_to_connect_kind() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: SessionError = io_err.into();
        assert_eq!(err.kind, SessionErrorKind::Connect);
    }

    #[test]
    fn is_timeout_reflects_kind() {
        assert!(SessionError::timeout("idle").is_timeout());
        assert!(!SessionError::write("broken pipe").is_timeout());
    }
}
