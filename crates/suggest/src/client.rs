//! Suggestion client: wraps a backend, substitutes the canned answer when
//! the backend fails, and treats only the most recent outstanding request
//! as authoritative so stale answers are never applied over newer ones.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use records::{EditSessionId, RecordStore, SuggestionEvent};

use crate::backends::{canned_suggestion, SuggestionBackend};
use crate::{Suggestion, SuggestionRequest};

pub struct SuggestionClient {
    backend: Box<dyn SuggestionBackend>,
    records: Option<Arc<RecordStore>>,
    latest: AtomicU64,
}

impl SuggestionClient {
    pub fn new(backend: Box<dyn SuggestionBackend>) -> Self {
        Self {
            backend,
            records: None,
            latest: AtomicU64::new(0),
        }
    }

    /// Also log suggestion events and the daily metric into `records`.
    pub fn with_records(mut self, records: Arc<RecordStore>) -> Self {
        self.records = Some(records);
        self
    }

    /// Ask for a suggestion. Never errors: backend failures substitute the
    /// canned per-kind answer. Returns `None` when a newer request was
    /// issued while this one was in flight — the answer is stale and must
    /// not be applied.
    pub async fn request(
        &self,
        edit_session: Option<EditSessionId>,
        request: SuggestionRequest,
    ) -> Option<Suggestion> {
        let ticket = self.latest.fetch_add(1, Ordering::SeqCst) + 1;

        let suggestion = match self.backend.suggest(&request).await {
            Ok(suggestion) => suggestion,
            Err(err) => {
                warn!(backend = self.backend.name(), %err, "suggestion backend failed, substituting canned answer");
                canned_suggestion(request.kind, &request.language)
            }
        };

        if self.latest.load(Ordering::SeqCst) != ticket {
            debug!("discarding stale suggestion answer");
            return None;
        }

        if let Some(records) = &self.records {
            let event = SuggestionEvent::new(
                edit_session,
                request.language.clone(),
                request.kind,
                suggestion.fallback,
            );
            if let Err(err) = records.record_suggestion(event) {
                warn!(%err, "suggestion event not recorded");
            }
            if let Err(err) =
                records.upsert_metric(Utc::now().date_naive(), &request.language, suggestion.fallback)
            {
                warn!(%err, "daily metric not updated");
            }
        }

        Some(suggestion)
    }
}
