//! Session registry: creates and looks up shared sessions by share code,
//! enforcing activation, expiry, and the single-guest slot.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};

use records::{EditSessionId, ParticipantId, Permission, RecordStore, SharedSession, SharedSessionId};

use crate::{share_code, AssistConfig, AssistError, Result};

/// Bounded retry against the astronomically unlikely code collision.
const CODE_ATTEMPTS: usize = 16;

pub struct SessionRegistry {
    store: Arc<RecordStore>,
    ttl: chrono::Duration,
}

impl SessionRegistry {
    pub fn new(store: Arc<RecordStore>, config: &AssistConfig) -> Self {
        let ttl = chrono::Duration::from_std(config.session_ttl)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        Self { store, ttl }
    }

    /// Create a session for `owner` with a freshly allocated share code,
    /// active for the configured TTL.
    pub fn create(
        &self,
        owner: EditSessionId,
        host: ParticipantId,
        permission: Permission,
    ) -> Result<SharedSession> {
        let now = Utc::now();
        let mut code = share_code::generate();
        let mut attempts = 1;
        while self.store.code_in_use(&code, now) {
            if attempts >= CODE_ATTEMPTS {
                return Err(AssistError::Persistence(
                    "could not allocate an unused share code".to_string(),
                ));
            }
            code = share_code::generate();
            attempts += 1;
        }

        let session = SharedSession::new(owner, host, permission, code, self.ttl);
        let session = self.store.insert_shared_session(session)?;
        info!(code = %session.share_code, session = %session.id, "shared session created");
        Ok(session)
    }

    /// Join the live session behind `raw_code`, claiming the guest slot
    /// first-join-wins. Unknown, expired, or inactive codes are
    /// [`AssistError::NotFound`]; a slot already held by someone else is
    /// [`AssistError::SlotTaken`].
    pub fn join(&self, raw_code: &str, guest: ParticipantId) -> Result<SharedSession> {
        let code = share_code::normalize(raw_code);
        let now = Utc::now();

        let session = self
            .store
            .find_active_by_code(&code, now)
            .ok_or_else(|| AssistError::NotFound(code.clone()))?;

        let session = self.store.claim_guest(session.id, guest, now)?;
        info!(code = %code, session = %session.id, %guest, "guest joined");
        Ok(session)
    }

    /// Read-only lookup by code, with the same visibility rules as join.
    pub fn lookup_code(&self, raw_code: &str) -> Result<SharedSession> {
        let code = share_code::normalize(raw_code);
        self.store
            .find_active_by_code(&code, Utc::now())
            .ok_or(AssistError::NotFound(code))
    }

    pub fn lookup(&self, id: SharedSessionId) -> Option<SharedSession> {
        self.store
            .shared_session(id)
            .filter(|s| s.is_live(Utc::now()))
    }

    /// Deactivate a session. Only the host's call has effect; a guest-issued
    /// end request is a deliberate no-op, not an error.
    pub fn end(&self, id: SharedSessionId, is_host: bool) -> Result<()> {
        if !is_host {
            debug!(session = %id, "guest end request ignored");
            return Ok(());
        }
        self.store.deactivate_shared_session(id)?;
        self.store.drop_sync_log(id);
        info!(session = %id, "shared session ended");
        Ok(())
    }
}
