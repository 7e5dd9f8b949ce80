//! AI suggestion client for the editor shell. One request/response
//! operation against a pluggable backend, with a canned fallback so an
//! unreachable or unconfigured backend never breaks the editor.

use serde::{Deserialize, Serialize};

mod backends;
mod client;

pub use backends::*;
pub use client::*;

pub use records::SuggestionKind;

/// One suggestion request: the buffer, its language, optionally where the
/// cursor is, and what the user asked for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestionRequest {
    pub code: String,
    pub language: String,
    pub cursor: Option<(u32, u32)>,
    pub kind: SuggestionKind,
}

/// A backend's answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub explanation: String,
    pub issue_detected: Option<bool>,
    /// True when this is the canned substitute, not a real backend answer.
    #[serde(default)]
    pub fallback: bool,
}
