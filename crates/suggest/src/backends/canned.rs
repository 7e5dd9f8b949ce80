//! Built-in canned responder: per-kind boilerplate answers used by demo
//! deployments and substituted whenever the real backend is unreachable.

use anyhow::Result;

use super::{BackendType, SuggestionBackend};
use crate::{Suggestion, SuggestionKind, SuggestionRequest};

pub struct CannedBackend;

impl CannedBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CannedBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// The substitute answer for `kind`, marked as a fallback.
pub fn canned_suggestion(kind: SuggestionKind, language: &str) -> Suggestion {
    let (text, explanation) = match kind {
        SuggestionKind::Completion => (
            format!("// No {language} completion available right now"),
            "The suggestion service is unavailable; showing a placeholder completion.",
        ),
        SuggestionKind::Optimization => (
            "// No optimization available right now".to_string(),
            "The suggestion service is unavailable; try again once connected.",
        ),
        SuggestionKind::Debugging => (
            "// Unable to analyze for bugs while offline".to_string(),
            "The suggestion service is unavailable; no issues could be detected.",
        ),
        SuggestionKind::Documentation => (
            "/// Documentation unavailable offline".to_string(),
            "The suggestion service is unavailable; documentation could not be generated.",
        ),
    };
    Suggestion {
        text,
        explanation: explanation.to_string(),
        issue_detected: None,
        fallback: true,
    }
}

#[async_trait::async_trait]
impl SuggestionBackend for CannedBackend {
    fn name(&self) -> &str {
        "canned"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Canned
    }

    async fn is_available(&self) -> Result<bool> {
        Ok(true)
    }

    async fn suggest(&self, request: &SuggestionRequest) -> Result<Suggestion> {
        Ok(canned_suggestion(request.kind, &request.language))
    }
}
