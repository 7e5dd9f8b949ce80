//! Typed record store: in-memory maps guarded by `parking_lot`, optionally
//! flushed to JSON files per collection.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::{
    DailyMetric, EditSession, EditSessionId, EventId, ParticipantId, Result, SharedSession,
    SharedSessionId, StoreError, SuggestionEvent, SyncEvent,
};

pub struct RecordStore {
    storage_path: Option<PathBuf>,
    edit_sessions: RwLock<HashMap<EditSessionId, EditSession>>,
    shared_sessions: RwLock<HashMap<SharedSessionId, SharedSession>>,
    suggestion_events: RwLock<Vec<SuggestionEvent>>,
    metrics: RwLock<HashMap<String, DailyMetric>>,
    sync_log: RwLock<HashMap<SharedSessionId, Vec<SyncEvent>>>,
}

fn metric_key(date: NaiveDate, language: &str) -> String {
    format!("{date}:{language}")
}

fn load_collection<T: serde::de::DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let data = fs::read_to_string(path)
        .map_err(|e| StoreError::Persistence(format!("read {}: {e}", path.display())))?;
    Ok(serde_json::from_str(&data).unwrap_or_default())
}

impl RecordStore {
    /// Purely in-memory store, used by tests and local-only deployments.
    pub fn in_memory() -> Self {
        Self {
            storage_path: None,
            edit_sessions: RwLock::new(HashMap::new()),
            shared_sessions: RwLock::new(HashMap::new()),
            suggestion_events: RwLock::new(Vec::new()),
            metrics: RwLock::new(HashMap::new()),
            sync_log: RwLock::new(HashMap::new()),
        }
    }

    /// Store backed by JSON files under `storage_path`, loading whatever is
    /// already there.
    pub fn at_path(storage_path: impl AsRef<Path>) -> Result<Self> {
        let storage_path = storage_path.as_ref().to_path_buf();
        fs::create_dir_all(&storage_path)
            .map_err(|e| StoreError::Persistence(format!("create {}: {e}", storage_path.display())))?;

        let edit_sessions = load_collection(&storage_path.join("edit_sessions.json"))?;
        let shared_sessions = load_collection(&storage_path.join("shared_sessions.json"))?;
        let suggestion_events = load_collection(&storage_path.join("suggestion_events.json"))?;
        let metrics = load_collection(&storage_path.join("metrics.json"))?;

        Ok(Self {
            storage_path: Some(storage_path),
            edit_sessions: RwLock::new(edit_sessions),
            shared_sessions: RwLock::new(shared_sessions),
            suggestion_events: RwLock::new(suggestion_events),
            metrics: RwLock::new(metrics),
            // Sync logs are transient relay state and are not reloaded.
            sync_log: RwLock::new(HashMap::new()),
        })
    }

    fn save<T: serde::Serialize>(&self, file: &str, value: &T) -> Result<()> {
        let Some(dir) = &self.storage_path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| StoreError::Persistence(format!("serialize {file}: {e}")))?;
        fs::write(dir.join(file), json)
            .map_err(|e| StoreError::Persistence(format!("write {file}: {e}")))?;
        Ok(())
    }

    // --- edit sessions ---

    pub fn create_edit_session(&self, session: EditSession) -> Result<EditSession> {
        let mut sessions = self.edit_sessions.write();
        sessions.insert(session.id, session.clone());
        let snapshot = sessions.clone();
        drop(sessions);

        self.save("edit_sessions.json", &snapshot)?;
        Ok(session)
    }

    pub fn edit_session(&self, id: EditSessionId) -> Option<EditSession> {
        self.edit_sessions.read().get(&id).cloned()
    }

    pub fn update_edit_session(
        &self,
        id: EditSessionId,
        code: String,
        language: String,
    ) -> Result<EditSession> {
        let mut sessions = self.edit_sessions.write();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("edit session {id}")))?;
        session.code = code;
        session.language = language;
        session.updated_at = Utc::now();
        let updated = session.clone();
        let snapshot = sessions.clone();
        drop(sessions);

        self.save("edit_sessions.json", &snapshot)?;
        Ok(updated)
    }

    // --- shared sessions ---

    pub fn insert_shared_session(&self, session: SharedSession) -> Result<SharedSession> {
        let mut sessions = self.shared_sessions.write();
        sessions.insert(session.id, session.clone());
        let snapshot = sessions.clone();
        drop(sessions);

        self.save("shared_sessions.json", &snapshot)?;
        Ok(session)
    }

    pub fn shared_session(&self, id: SharedSessionId) -> Option<SharedSession> {
        self.shared_sessions.read().get(&id).cloned()
    }

    /// Look up the live session carrying `code` (already normalized).
    /// Expired or inactive records are invisible here even while still
    /// physically stored.
    pub fn find_active_by_code(&self, code: &str, now: DateTime<Utc>) -> Option<SharedSession> {
        self.shared_sessions
            .read()
            .values()
            .find(|s| s.share_code == code && s.is_live(now))
            .cloned()
    }

    /// Whether `code` is already held by a live session.
    pub fn code_in_use(&self, code: &str, now: DateTime<Utc>) -> bool {
        self.shared_sessions
            .read()
            .values()
            .any(|s| s.share_code == code && s.is_live(now))
    }

    /// Conditionally assign the guest slot: first join wins. A repeat join
    /// by the same participant is idempotent; a different participant after
    /// the slot is taken gets a conflict.
    pub fn claim_guest(
        &self,
        id: SharedSessionId,
        guest: ParticipantId,
        now: DateTime<Utc>,
    ) -> Result<SharedSession> {
        let mut sessions = self.shared_sessions.write();
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("shared session {id}")))?;

        match session.guest {
            None => {
                session.guest = Some(guest);
                session.connected_at = Some(now);
            }
            Some(existing) if existing == guest => {}
            Some(_) => {
                return Err(StoreError::Conflict(format!(
                    "guest slot of {id} already taken"
                )))
            }
        }

        let claimed = session.clone();
        let snapshot = sessions.clone();
        drop(sessions);

        self.save("shared_sessions.json", &snapshot)?;
        Ok(claimed)
    }

    pub fn deactivate_shared_session(&self, id: SharedSessionId) -> Result<()> {
        let mut sessions = self.shared_sessions.write();
        if let Some(session) = sessions.get_mut(&id) {
            session.active = false;
        }
        let snapshot = sessions.clone();
        drop(sessions);

        self.save("shared_sessions.json", &snapshot)
    }

    // --- suggestion events ---

    pub fn record_suggestion(&self, event: SuggestionEvent) -> Result<()> {
        let mut events = self.suggestion_events.write();
        events.push(event);
        let snapshot = events.clone();
        drop(events);

        self.save("suggestion_events.json", &snapshot)
    }

    pub fn suggestion_events(&self) -> Vec<SuggestionEvent> {
        self.suggestion_events.read().clone()
    }

    // --- daily metrics ---

    /// Increment the aggregate for `(date, language)`, creating it on first
    /// use.
    pub fn upsert_metric(&self, date: NaiveDate, language: &str, fallback: bool) -> Result<()> {
        let mut metrics = self.metrics.write();
        let metric = metrics
            .entry(metric_key(date, language))
            .or_insert_with(|| DailyMetric::new(date, language.to_string()));
        metric.suggestion_count += 1;
        if fallback {
            metric.fallback_count += 1;
        }
        let snapshot = metrics.clone();
        drop(metrics);

        self.save("metrics.json", &snapshot)
    }

    pub fn metric(&self, date: NaiveDate, language: &str) -> Option<DailyMetric> {
        self.metrics.read().get(&metric_key(date, language)).cloned()
    }

    // --- sync event log ---

    /// Append to a session's event log, dropping the oldest entries past
    /// `cap`. Older events are superseded by newer ones, so the cap only
    /// ever discards history.
    pub fn append_sync_event(&self, event: SyncEvent, cap: usize) {
        let mut logs = self.sync_log.write();
        let log = logs.entry(event.session_id).or_default();
        log.push(event);
        if log.len() > cap {
            let overflow = log.len() - cap;
            log.drain(..overflow);
            debug!(overflow, "sync log capped");
        }
    }

    pub fn sync_events_after(
        &self,
        session_id: SharedSessionId,
        cursor: Option<EventId>,
    ) -> Vec<SyncEvent> {
        let logs = self.sync_log.read();
        let Some(log) = logs.get(&session_id) else {
            return Vec::new();
        };
        log.iter()
            .filter(|e| cursor.map_or(true, |c| e.id > c))
            .cloned()
            .collect()
    }

    pub fn drop_sync_log(&self, session_id: SharedSessionId) {
        self.sync_log.write().remove(&session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Permission, SyncPayload};

    fn live_session() -> SharedSession {
        SharedSession::new(
            EditSessionId::new(),
            ParticipantId::new(),
            Permission::Edit,
            "AB3K9Q".to_string(),
            chrono::Duration::hours(24),
        )
    }

    #[test]
    fn expired_sessions_are_invisible_to_lookup() {
        let store = RecordStore::in_memory();
        let mut session = live_session();
        session.expires_at = Utc::now() - chrono::Duration::minutes(1);
        store.insert_shared_session(session).unwrap();

        assert!(store.find_active_by_code("AB3K9Q", Utc::now()).is_none());
        assert!(!store.code_in_use("AB3K9Q", Utc::now()));
    }

    #[test]
    fn guest_claim_is_first_join_wins() {
        let store = RecordStore::in_memory();
        let session = store.insert_shared_session(live_session()).unwrap();
        let first = ParticipantId::new();
        let second = ParticipantId::new();

        let claimed = store.claim_guest(session.id, first, Utc::now()).unwrap();
        assert_eq!(claimed.guest, Some(first));
        assert!(claimed.connected_at.is_some());

        // Idempotent for the same participant.
        store.claim_guest(session.id, first, Utc::now()).unwrap();

        let err = store.claim_guest(session.id, second, Utc::now()).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn metric_upsert_increments_existing_key() {
        let store = RecordStore::in_memory();
        let date = Utc::now().date_naive();

        store.upsert_metric(date, "javascript", false).unwrap();
        store.upsert_metric(date, "javascript", true).unwrap();
        store.upsert_metric(date, "rust", false).unwrap();

        let js = store.metric(date, "javascript").unwrap();
        assert_eq!(js.suggestion_count, 2);
        assert_eq!(js.fallback_count, 1);
        assert_eq!(store.metric(date, "rust").unwrap().suggestion_count, 1);
    }

    #[test]
    fn sync_log_cap_drops_oldest_not_newest() {
        let store = RecordStore::in_memory();
        let session_id = SharedSessionId::new();
        let origin = ParticipantId::new();

        let mut last = None;
        for i in 0..51 {
            let event = SyncEvent {
                id: EventId { millis: i, nonce: 0 },
                session_id,
                origin,
                payload: SyncPayload::Edit {
                    code: format!("v{i}"),
                    language: "javascript".to_string(),
                },
                created_at: Utc::now(),
            };
            last = Some(event.id);
            store.append_sync_event(event, 50);
        }

        let retained = store.sync_events_after(session_id, None);
        assert_eq!(retained.len(), 50);
        assert_eq!(retained.last().map(|e| e.id), last);
        assert_eq!(retained.first().map(|e| e.id.millis), Some(1));
    }

    #[test]
    fn persistence_errors_are_distinct_from_not_found() {
        // A directory that cannot exist makes every flush fail.
        let store = RecordStore {
            storage_path: Some(PathBuf::from("/dev/null/records")),
            edit_sessions: RwLock::new(HashMap::new()),
            shared_sessions: RwLock::new(HashMap::new()),
            suggestion_events: RwLock::new(Vec::new()),
            metrics: RwLock::new(HashMap::new()),
            sync_log: RwLock::new(HashMap::new()),
        };

        let err = store.insert_shared_session(live_session()).unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));
    }

    #[test]
    fn edit_sessions_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::at_path(dir.path()).unwrap();
        let session = store
            .create_edit_session(EditSession::new(
                Some("scratch".to_string()),
                "let x = 1;".to_string(),
                "javascript".to_string(),
            ))
            .unwrap();

        let reloaded = RecordStore::at_path(dir.path()).unwrap();
        let found = reloaded.edit_session(session.id).unwrap();
        assert_eq!(found.code, "let x = 1;");
    }
}
