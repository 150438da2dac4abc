//! Registry of live debug sessions.
//!
//! Sessions are keyed by caller-chosen ids. The registry is an ordinary
//! value: share it by reference or wrap it in an `Arc`.
use std::collections::HashMap;

use parking_lot::Mutex;

use crate::client::DapClient;
use crate::error::DapError;

#[derive(Default)]
struct Entries {
    clients: HashMap<String, DapClient>,
    default_id: Option<String>,
}

/// Owns the clients of every active session.
#[derive(Default)]
pub struct SessionRegistry {
    entries: Mutex<Entries>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `client` under `id` and start its receiver.
    ///
    /// The first session registered becomes the default.
    pub fn create(&self, id: &str, client: DapClient) -> Result<DapClient, DapError> {
        {
            let mut entries = self.entries.lock();
            if entries.clients.contains_key(id) {
                return Err(DapError::DuplicateSession(id.to_string()));
            }
            entries.clients.insert(id.to_string(), client.clone());
            if entries.default_id.is_none() {
                entries.default_id = Some(id.to_string());
            }
        }
        client.start();
        tracing::info!(session = id, "session registered");
        Ok(client)
    }

    pub fn get(&self, id: &str) -> Result<DapClient, DapError> {
        self.entries
            .lock()
            .clients
            .get(id)
            .cloned()
            .ok_or_else(|| DapError::UnknownSession(id.to_string()))
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.lock().clients.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.entries.lock().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The default session, if one is set.
    pub fn default_session(&self) -> Option<(String, DapClient)> {
        let entries = self.entries.lock();
        let id = entries.default_id.clone()?;
        let client = entries.clients.get(&id)?.clone();
        Some((id, client))
    }

    pub fn set_default(&self, id: &str) -> Result<(), DapError> {
        let mut entries = self.entries.lock();
        if !entries.clients.contains_key(id) {
            return Err(DapError::UnknownSession(id.to_string()));
        }
        entries.default_id = Some(id.to_string());
        Ok(())
    }

    /// Remove the session and shut its client down.
    pub async fn shutdown(&self, id: &str) -> Result<(), DapError> {
        let client = {
            let mut entries = self.entries.lock();
            let client = entries
                .clients
                .remove(id)
                .ok_or_else(|| DapError::UnknownSession(id.to_string()))?;
            if entries.default_id.as_deref() == Some(id) {
                entries.default_id = None;
            }
            client
        };
        client.shutdown().await;
        tracing::info!(session = id, "session shut down");
        Ok(())
    }

    /// Shut down every session.
    pub async fn shutdown_all(&self) {
        let drained: Vec<(String, DapClient)> = {
            let mut entries = self.entries.lock();
            entries.default_id = None;
            entries.clients.drain().collect()
        };
        for (id, client) in drained {
            client.shutdown().await;
            tracing::info!(session = %id, "session shut down");
        }
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("SessionRegistry")
            .field("sessions", &entries.clients.len())
            .field("default", &entries.default_id)
            .finish()
    }
}
