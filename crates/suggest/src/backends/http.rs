//! Hosted HTTP suggestion backend.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{BackendConfig, BackendType, SuggestionBackend};
use crate::{Suggestion, SuggestionRequest};

pub struct HttpBackend {
    api_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    code: &'a str,
    language: &'a str,
    cursor: Option<(u32, u32)>,
    request_kind: crate::SuggestionKind,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    suggestion: String,
    explanation: String,
    issue_detected: Option<bool>,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Result<Self> {
        let api_url = config.api_url.context("http backend requires api_url")?;
        let timeout = Duration::from_secs(config.timeout_secs.unwrap_or(20));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building http client")?;

        Ok(Self {
            api_url,
            api_key: config.api_key,
            client,
        })
    }
}

#[async_trait::async_trait]
impl SuggestionBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Http
    }

    async fn is_available(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.api_url))
            .send()
            .await;
        Ok(matches!(response, Ok(r) if r.status().is_success()))
    }

    async fn suggest(&self, request: &SuggestionRequest) -> Result<Suggestion> {
        let wire = WireRequest {
            code: &request.code,
            language: &request.language,
            cursor: request.cursor,
            request_kind: request.kind,
        };

        let mut builder = self
            .client
            .post(format!("{}/suggest", self.api_url))
            .json(&wire);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {key}"));
        }

        let response = builder.send().await?;
        if !response.status().is_success() {
            anyhow::bail!(
                "suggestion endpoint error: {} - {}",
                response.status(),
                response.text().await.unwrap_or_default()
            );
        }

        let wire: WireResponse = response.json().await?;
        Ok(Suggestion {
            text: wire.suggestion,
            explanation: wire.explanation,
            issue_detected: wire.issue_detected,
            fallback: false,
        })
    }
}
