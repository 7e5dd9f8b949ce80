//! Persisted data model for the editor shell: edit sessions, suggestion
//! events, daily metrics, shared collaboration sessions and their sync
//! event logs, plus the two storage media backing them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod local;
mod model;
mod store;

pub use local::*;
pub use model::*;
pub use store::*;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("conflicting update: {0}")]
    Conflict(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Stable opaque identity of one participant (one browser profile).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParticipantId(pub uuid::Uuid);

impl ParticipantId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ParticipantId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one shared collaboration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SharedSessionId(pub uuid::Uuid);

impl SharedSessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SharedSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SharedSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Identifier of one underlying editor document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditSessionId(pub uuid::Uuid);

impl EditSessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for EditSessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EditSessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Orderable sync event identifier: creation time in unix millis plus a
/// tiebreak counter started at a random point per process. Ids from one
/// writer always order by creation, even within a single millisecond;
/// across writers the random offsets keep ids distinct.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EventId {
    pub millis: i64,
    pub nonce: u32,
}

fn next_tiebreak() -> u32 {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::OnceLock;

    static COUNTER: OnceLock<AtomicU32> = OnceLock::new();
    COUNTER
        .get_or_init(|| AtomicU32::new(rand::random()))
        .fetch_add(1, Ordering::Relaxed)
}

impl EventId {
    pub fn now() -> Self {
        Self {
            millis: chrono::Utc::now().timestamp_millis(),
            nonce: next_tiebreak(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_order_by_time_then_nonce() {
        let a = EventId { millis: 1, nonce: 9 };
        let b = EventId { millis: 2, nonce: 0 };
        let c = EventId { millis: 2, nonce: 1 };
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn participant_ids_are_unique() {
        assert_ne!(ParticipantId::new(), ParticipantId::new());
    }

    #[test]
    fn ids_minted_in_a_burst_still_order() {
        let ids: Vec<EventId> = (0..100).map(|_| EventId::now()).collect();
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }
}
