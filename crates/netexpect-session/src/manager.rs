//! Process-level registry mapping a caller-chosen session id to a `Session`.

use std::collections::HashMap;
use std::sync::Arc;

use netexpect_core::{ConnectOptions, SessionResult};
use tokio::sync::RwLock;

use crate::profile::{DeviceProfile, Vendor};
use crate::session::Session;

/// Owns every live session in the process. `id` is caller-chosen and must
/// be unique; reusing an id for a second `connect` simply overwrites the
/// registry entry (the caller is responsible for disconnecting first).
#[derive(Default)]
pub struct Manager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Manager {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Builds a session from `vendor`'s profile, verifies the profile
    /// supports `options.method`, connects it, and registers it under `id`.
    pub async fn connect(
        &self,
        vendor: Vendor,
        id: impl Into<String>,
        options: &ConnectOptions,
    ) -> SessionResult<Arc<Session>> {
        let id = id.into();
        let profile = DeviceProfile::for_vendor(vendor);
        let session = Session::connect(id.clone(), profile, options).await?;
        self.sessions.write().await.insert(id, session.clone());
        Ok(session)
    }

    /// Looks up a previously connected session by id.
    pub async fn get_device(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Disconnects every registered session, best-effort: a session whose
    /// disconnect panics or hangs does not stop the others (each disconnect
    /// already swallows its own transport-close errors).
    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<Session>> = self.sessions.write().await.drain().map(|(_, s)| s).collect();
        for session in sessions {
            log::info!("manager: disconnecting session {}", session.id());
            session.disconnect().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_device_returns_none_for_unknown_id() {
        let manager = Manager::new();
        assert!(manager.get_device("missing").await.is_none());
    }

    #[tokio::test]
    async fn shutdown_on_empty_manager_is_a_noop() {
        let manager = Manager::new();
        manager.shutdown().await;
    }
}
