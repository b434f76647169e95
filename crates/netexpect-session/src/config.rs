//! Ambient configuration layer: a serializable device roster, loadable from
//! JSON or YAML, that callers can use instead of hand-building
//! `ConnectOptions` in code. Purely a convenience over the core's types.

use std::path::Path;

use netexpect_core::{ConnectOptions, ConnectionMethod};
use serde::{Deserialize, Serialize};

fn default_port() -> u16 {
    0
}

fn default_enable_password() -> String {
    String::new()
}

/// One device roster row: a caller-chosen id, the vendor tag (as its
/// serialized name, e.g. `"cisco-ios"`), and the connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    pub device_type: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default = "default_enable_password")]
    pub enable_password: String,
    #[serde(default)]
    pub private_key_path: Option<String>,
    pub host: String,
    pub method: ConnectionMethod,
}

impl RosterEntry {
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
            enable_password: self.enable_password.clone(),
            private_key_path: self.private_key_path.clone(),
            method: self.method,
        }
    }
}

/// A full device roster: every row a caller wants `Manager::connect` run
/// over at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceRoster {
    pub devices: Vec<RosterEntry>,
}

impl DeviceRoster {
    pub fn from_json(data: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(data).map_err(|e| ConfigError::deserialize(e.to_string()))
    }

    pub fn from_yaml(data: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(data).map_err(|e| ConfigError::deserialize(e.to_string()))
    }

    /// Loads a roster from `path`, dispatching on its extension (`.json`
    /// or `.yaml`/`.yml`); any other extension is a `ConfigError`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::missing_field(format!("cannot read {}: {e}", path.display())))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&data),
            Some("yaml") | Some("yml") => Self::from_yaml(&data),
            other => Err(ConfigError::deserialize(format!(
                "unsupported roster file extension: {other:?}"
            ))),
        }
    }
}

/// A distinct error type from `SessionError`: config loading fails before a
/// `Session` ever exists. A small closed set of variants, which is exactly
/// what `thiserror` is for, unlike the transport-level kind+message structs
/// elsewhere in this workspace.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to deserialize device roster: {0}")]
    Deserialize(String),
    #[error("missing or unreadable field: {0}")]
    MissingField(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    Deserialize,
    MissingField,
}

impl ConfigError {
    pub fn deserialize(msg: impl Into<String>) -> Self {
        Self::Deserialize(msg.into())
    }

    pub fn missing_field(msg: impl Into<String>) -> Self {
        Self::MissingField(msg.into())
    }

    pub fn kind(&self) -> ConfigErrorKind {
        match self {
            Self::Deserialize(_) => ConfigErrorKind::Deserialize,
            Self::MissingField(_) => ConfigErrorKind::MissingField,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_parses_a_minimal_roster() {
        let json = r#"{"devices":[{"id":"d1","device_type":"cisco-ios","username":"u","password":"p","host":"10.0.0.1","method":"Telnet"}]}"#;
        let roster = DeviceRoster::from_json(json).unwrap();
        assert_eq!(roster.devices.len(), 1);
        assert_eq!(roster.devices[0].port, 0);
        assert_eq!(roster.devices[0].enable_password, "");
    }

    #[test]
    fn from_json_rejects_malformed_input() {
        let result = DeviceRoster::from_json("{not json");
        assert!(result.is_err());
        assert_eq!(result.unwrap_err().kind(), ConfigErrorKind::Deserialize);
    }

    #[test]
    fn load_dispatches_on_json_and_yaml_extensions() {
        let json = r#"{"devices":[{"id":"d1","device_type":"casa","username":"u","password":"p","host":"10.0.0.1","method":"Telnet"}]}"#;
        let mut json_file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        std::io::Write::write_all(&mut json_file, json.as_bytes()).unwrap();
        let roster = DeviceRoster::load(json_file.path()).unwrap();
        assert_eq!(roster.devices[0].id, "d1");

        let yaml = "devices:\n  - id: d2\n    device_type: juniper\n    username: u\n    password: p\n    host: 10.0.0.2\n    method: Ssh\n";
        let mut yaml_file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        std::io::Write::write_all(&mut yaml_file, yaml.as_bytes()).unwrap();
        let roster = DeviceRoster::load(yaml_file.path()).unwrap();
        assert_eq!(roster.devices[0].id, "d2");
    }

    #[test]
    fn load_rejects_unsupported_extension() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        std::io::Write::write_all(&mut file, b"devices = []").unwrap();
        let err = DeviceRoster::load(file.path()).unwrap_err();
        assert_eq!(err.kind(), ConfigErrorKind::Deserialize);
    }

    #[test]
    fn connect_options_carries_roster_fields_through() {
        let entry = RosterEntry {
            id: "d1".to_string(),
            device_type: "casa".to_string(),
            port: 23,
            username: "u".to_string(),
            password: "p".to_string(),
            enable_password: String::new(),
            private_key_path: None,
            host: "10.0.0.1".to_string(),
            method: ConnectionMethod::Telnet,
        };
        let options = entry.connect_options();
        assert_eq!(options.host, "10.0.0.1");
        assert_eq!(options.port, 23);
    }
}
