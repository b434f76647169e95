//! CSV-driven device roster parsing for the demonstration binary.
//!
//! This is the thin collaborator format described in the engine's design:
//! `id, deviceType, connectionMethod, host, port, username, password,
//! enablePassword` rows, one device per line. The core never parses CSV;
//! this module exists only so `netexpect-cli` has somewhere to load its
//! device list from, the same way the original driver read `devices.csv`.

use std::fmt;
use std::path::Path;

use netexpect_core::{ConnectOptions, ConnectionMethod};
use netexpect_session::Vendor;

/// One parsed row of a CSV device roster.
#[derive(Debug, Clone)]
pub struct CsvRosterEntry {
    pub id: String,
    pub vendor: Vendor,
    pub options: ConnectOptions,
}

/// A CSV roster row that failed to parse, or the file-level I/O error.
#[derive(Debug, Clone)]
pub struct RosterError {
    pub kind: RosterErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterErrorKind {
    Io,
    Csv,
    BadRow,
}

impl RosterError {
    fn io(msg: impl Into<String>) -> Self {
        Self { kind: RosterErrorKind::Io, message: msg.into() }
    }

    fn csv(msg: impl Into<String>) -> Self {
        Self { kind: RosterErrorKind::Csv, message: msg.into() }
    }

    fn bad_row(row: usize, msg: impl Into<String>) -> Self {
        Self {
            kind: RosterErrorKind::BadRow,
            message: format!("row {row}: {}", msg.into()),
        }
    }
}

impl fmt::Display for RosterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for RosterError {}

/// Reads `path` as a headerless CSV file of
/// `id,deviceType,connectionMethod,host,port,username,password,enablePassword`
/// rows and parses each into a [`CsvRosterEntry`].
pub fn load(path: impl AsRef<Path>) -> Result<Vec<CsvRosterEntry>, RosterError> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path)
        .map_err(|e| RosterError::io(format!("cannot read {}: {e}", path.display())))?;
    parse(&data)
}

/// Parses CSV text directly; split out from [`load`] so tests can feed it
/// fixture strings without touching the filesystem.
pub fn parse(data: &str) -> Result<Vec<CsvRosterEntry>, RosterError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(false)
        .from_reader(data.as_bytes());

    let mut entries = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| RosterError::csv(e.to_string()))?;
        entries.push(parse_row(idx, &record)?);
    }
    Ok(entries)
}

fn parse_row(idx: usize, record: &csv::StringRecord) -> Result<CsvRosterEntry, RosterError> {
    if record.len() != 8 {
        return Err(RosterError::bad_row(
            idx,
            format!("expected 8 columns, got {}", record.len()),
        ));
    }
    let field = |i: usize| record.get(i).unwrap().trim();

    let id = field(0).to_string();
    let vendor: Vendor = field(1)
        .parse()
        .map_err(|e| RosterError::bad_row(idx, format!("device type: {e}")))?;
    let method = parse_method(field(2)).map_err(|e| RosterError::bad_row(idx, e))?;
    let host = field(3).to_string();
    let port: u16 = field(4)
        .parse()
        .map_err(|_| RosterError::bad_row(idx, format!("invalid port: {:?}", field(4))))?;
    let username = field(5).to_string();
    let password = field(6).to_string();
    let enable_password = field(7).to_string();

    Ok(CsvRosterEntry {
        id,
        vendor,
        options: ConnectOptions {
            host,
            port,
            username,
            password,
            enable_password,
            private_key_path: None,
            method,
        },
    })
}

/// Accepts either the method's name (`"ssh"`/`"telnet"`, any case) or the
/// original driver's numeric code (`0` = SSH, `1` = Telnet).
fn parse_method(raw: &str) -> Result<ConnectionMethod, String> {
    match raw.to_ascii_lowercase().as_str() {
        "ssh" | "0" => Ok(ConnectionMethod::Ssh),
        "telnet" | "1" => Ok(ConnectionMethod::Telnet),
        other => Err(format!("unrecognized connection method: {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_roster() {
        let csv = "d1,cisco-ios,ssh,10.0.0.1,22,admin,pw,enable\nd2,casa,1,10.0.0.2,0,user,pw2,\n";
        let entries = parse(csv).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "d1");
        assert_eq!(entries[0].vendor, Vendor::CiscoIos);
        assert_eq!(entries[0].options.method, ConnectionMethod::Ssh);
        assert_eq!(entries[1].options.method, ConnectionMethod::Telnet);
        assert_eq!(entries[1].options.port, 0);
    }

    #[test]
    fn rejects_unknown_vendor_tag() {
        let csv = "d1,arista,ssh,10.0.0.1,22,admin,pw,\n";
        let err = parse(csv).unwrap_err();
        assert_eq!(err.kind, RosterErrorKind::BadRow);
    }

    #[test]
    fn rejects_malformed_method() {
        let csv = "d1,casa,carrier-pigeon,10.0.0.1,22,admin,pw,\n";
        let err = parse(csv).unwrap_err();
        assert!(err.message.contains("connection method"));
    }

    #[test]
    fn rejects_row_with_wrong_column_count() {
        let csv = "d1,casa,ssh,10.0.0.1\n";
        let err = parse(csv).unwrap_err();
        assert_eq!(err.kind, RosterErrorKind::BadRow);
    }

    #[test]
    fn load_surfaces_io_error_for_missing_file() {
        let err = load("/nonexistent/devices.csv").unwrap_err();
        assert_eq!(err.kind, RosterErrorKind::Io);
    }
}
