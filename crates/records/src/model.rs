//! Record types persisted by the stores.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{EditSessionId, EventId, ParticipantId, SharedSessionId};

/// Rights granted to the guest of a shared session. The host always has
/// edit rights; the permission is fixed at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    View,
    Edit,
}

/// One collaboration between a host and at most one guest, addressed by a
/// short human-typable share code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedSession {
    pub id: SharedSessionId,
    pub owner_session_id: EditSessionId,
    pub share_code: String,
    pub host: ParticipantId,
    pub guest: Option<ParticipantId>,
    pub permission: Permission,
    pub active: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SharedSession {
    pub fn new(
        owner_session_id: EditSessionId,
        host: ParticipantId,
        permission: Permission,
        share_code: String,
        ttl: chrono::Duration,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            id: SharedSessionId::new(),
            owner_session_id,
            share_code,
            host,
            guest: None,
            permission,
            active: true,
            connected_at: None,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// Whether the session is visible to read paths. Expiry is a logical
    /// invariant checked on every lookup, not a background eviction.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.active && now < self.expires_at
    }
}

/// Payload of one propagated change. Consumers apply whole-buffer
/// replacement, so edit payloads carry the full buffer, not a patch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncPayload {
    Edit { code: String, language: String },
    Cursor { line: u32, column: u32 },
    LanguageChange { code: String, language: String },
}

/// One entry of a session's append-only event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEvent {
    pub id: EventId,
    pub session_id: SharedSessionId,
    pub origin: ParticipantId,
    pub payload: SyncPayload,
    pub created_at: DateTime<Utc>,
}

impl SyncEvent {
    pub fn new(session_id: SharedSessionId, origin: ParticipantId, payload: SyncPayload) -> Self {
        Self {
            id: EventId::now(),
            session_id,
            origin,
            payload,
            created_at: Utc::now(),
        }
    }
}

/// The underlying editor document a collaboration shares.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditSession {
    pub id: EditSessionId,
    pub title: Option<String>,
    pub code: String,
    pub language: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EditSession {
    pub fn new(title: Option<String>, code: String, language: String) -> Self {
        let now = Utc::now();
        Self {
            id: EditSessionId::new(),
            title,
            code,
            language,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What a suggestion was asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Completion,
    Optimization,
    Debugging,
    Documentation,
}

impl std::fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completion => write!(f, "completion"),
            Self::Optimization => write!(f, "optimization"),
            Self::Debugging => write!(f, "debugging"),
            Self::Documentation => write!(f, "documentation"),
        }
    }
}

/// One answered suggestion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionEvent {
    pub id: uuid::Uuid,
    pub edit_session: Option<EditSessionId>,
    pub language: String,
    pub kind: SuggestionKind,
    pub fallback: bool,
    pub created_at: DateTime<Utc>,
}

impl SuggestionEvent {
    pub fn new(
        edit_session: Option<EditSessionId>,
        language: String,
        kind: SuggestionKind,
        fallback: bool,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            edit_session,
            language,
            kind,
            fallback,
            created_at: Utc::now(),
        }
    }
}

/// Per-day suggestion aggregate, keyed on the (date, language) composite.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyMetric {
    pub date: NaiveDate,
    pub language: String,
    pub suggestion_count: u64,
    pub fallback_count: u64,
}

impl DailyMetric {
    pub fn new(date: NaiveDate, language: String) -> Self {
        Self {
            date,
            language,
            suggestion_count: 0,
            fallback_count: 0,
        }
    }
}
