//! Demonstration CLI driver: reads a CSV device roster and drives each
//! device through the [`netexpect_session::Manager`].
//!
//! This binary is a thin collaborator around the session engine, not part
//! of its tested core (see the crate's `SPEC_FULL.md` §1/§6). It mirrors
//! the shape of the original `devices.csv`-driven driver: open the file,
//! connect every row in turn, issue one demonstration command, disconnect.

use std::env;
use std::process::ExitCode;

use netexpect::roster;
use netexpect_core::ConnectOptions;
use netexpect_session::{Manager, Vendor};

const DEFAULT_ROSTER_PATH: &str = "devices.csv";
const DEMO_COMMAND: &str = "show run";

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();

    let path = env::args().nth(1).unwrap_or_else(|| DEFAULT_ROSTER_PATH.to_string());
    log::info!("loading device roster from {path}");

    let entries = match roster::load(&path) {
        Ok(entries) => entries,
        Err(e) => {
            log::error!("unable to load device roster: {e}");
            return ExitCode::FAILURE;
        }
    };

    let manager = Manager::new();
    let mut failures = 0u32;

    for entry in entries {
        if let Err(e) = drive_device(&manager, entry.id.clone(), entry.vendor, &entry.options).await {
            log::error!("device {} failed: {e}", entry.id);
            failures += 1;
        }
    }

    manager.shutdown().await;

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn drive_device(
    manager: &Manager,
    id: String,
    vendor: Vendor,
    options: &ConnectOptions,
) -> Result<(), netexpect_core::SessionError> {
    log::info!("connecting to device {id} ({vendor}) at {}", options.host);
    let session = manager.connect(vendor, id.clone(), options).await?;
    log::info!("connected to {id}, issuing demonstration command");

    match session.write_capture(DEMO_COMMAND).await {
        Ok(lines) => {
            log::info!("device {id} returned {} lines", lines.len());
            for line in lines {
                log::debug!("{id}> {line}");
            }
        }
        Err(failure) => {
            log::warn!(
                "device {id}: {DEMO_COMMAND:?} did not complete cleanly: {} ({} lines captured)",
                failure.error,
                failure.lines.len()
            );
        }
    }

    session.disconnect().await;
    Ok(())
}
