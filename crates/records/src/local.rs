//! Durable browser-local storage stand-in: JSON key-value slots plus
//! per-session bounded event logs over one shared medium. The polling sync
//! backend, the cross-window fallback, and identity persistence all share
//! this store; writers only append and cap, readers keep their own cursors.

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::{EventId, SharedSessionId, SyncEvent};

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct LocalState {
    slots: HashMap<String, serde_json::Value>,
    logs: HashMap<SharedSessionId, Vec<SyncEvent>>,
}

pub struct LocalStore {
    path: Option<PathBuf>,
    state: RwLock<LocalState>,
}

impl LocalStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: RwLock::new(LocalState::default()),
        }
    }

    /// File-backed store, loading whatever a previous run left behind.
    pub fn at_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let state = fs::read_to_string(&path)
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok())
            .unwrap_or_default();
        Self {
            path: Some(path),
            state: RwLock::new(state),
        }
    }

    /// Best-effort flush. Local storage is a convenience medium; a failed
    /// write degrades to in-memory behavior rather than failing the caller.
    fn flush(&self, state: &LocalState) {
        let Some(path) = &self.path else { return };
        let json = match serde_json::to_string(state) {
            Ok(j) => j,
            Err(e) => {
                warn!("local store serialize failed: {e}");
                return;
            }
        };
        if let Err(e) = fs::write(path, json) {
            warn!("local store flush failed: {e}");
        }
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state
            .read()
            .slots
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let json = match serde_json::to_value(value) {
            Ok(j) => j,
            Err(e) => {
                warn!("local store slot {key} not serializable: {e}");
                return;
            }
        };
        let mut state = self.state.write();
        state.slots.insert(key.to_string(), json);
        self.flush(&state);
    }

    pub fn remove(&self, key: &str) {
        let mut state = self.state.write();
        state.slots.remove(key);
        self.flush(&state);
    }

    /// Append to a session's log, capping at `cap` by dropping the oldest.
    pub fn append_event(&self, event: SyncEvent, cap: usize) {
        let mut state = self.state.write();
        let log = state.logs.entry(event.session_id).or_default();
        log.push(event);
        if log.len() > cap {
            let overflow = log.len() - cap;
            log.drain(..overflow);
        }
        self.flush(&state);
    }

    /// Events strictly after `cursor`, in log order. Readers advance their
    /// own cursor; the log itself is never mutated by reads.
    pub fn events_after(
        &self,
        session_id: SharedSessionId,
        cursor: Option<EventId>,
    ) -> Vec<SyncEvent> {
        let state = self.state.read();
        let Some(log) = state.logs.get(&session_id) else {
            return Vec::new();
        };
        log.iter()
            .filter(|e| cursor.map_or(true, |c| e.id > c))
            .cloned()
            .collect()
    }

    pub fn clear_log(&self, session_id: SharedSessionId) {
        let mut state = self.state.write();
        state.logs.remove(&session_id);
        self.flush(&state);
    }
}
