//! Suggestion backends abstraction.
//!
//! Provides a unified interface over whatever actually produces
//! suggestions: a hosted HTTP endpoint, or the built-in canned responder
//! used by local/demo deployments.

pub mod canned;
pub mod http;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub use canned::{canned_suggestion, CannedBackend};
pub use http::HttpBackend;

use crate::{Suggestion, SuggestionRequest};

/// Backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// Hosted HTTP suggestion endpoint
    Http,
    /// Built-in canned responder
    Canned,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http => write!(f, "http"),
            Self::Canned => write!(f, "canned"),
        }
    }
}

/// Suggestion backend trait
#[async_trait::async_trait]
pub trait SuggestionBackend: Send + Sync {
    /// Backend name
    fn name(&self) -> &str;

    /// Backend type
    fn backend_type(&self) -> BackendType;

    /// Check if backend is available/configured
    async fn is_available(&self) -> Result<bool>;

    /// Produce a suggestion for the request
    async fn suggest(&self, request: &SuggestionRequest) -> Result<Suggestion>;
}

/// Backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend type
    pub backend_type: BackendType,

    /// API endpoint URL (for the hosted backend)
    pub api_url: Option<String>,

    /// API key or token
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

impl BackendConfig {
    pub fn new(backend_type: BackendType) -> Self {
        Self {
            backend_type,
            api_url: None,
            api_key: None,
            timeout_secs: Some(20),
        }
    }

    /// With API endpoint
    pub fn with_api_url(mut self, url: String) -> Self {
        self.api_url = Some(url);
        self
    }

    /// With API key
    pub fn with_api_key(mut self, key: String) -> Self {
        self.api_key = Some(key);
        self
    }

    /// With timeout
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Save configuration to JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load configuration from JSON
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&json)?;
        Ok(config)
    }
}

/// Backend factory for creating backend instances
pub struct BackendFactory;

impl BackendFactory {
    /// Create backend from config
    pub fn create(config: BackendConfig) -> Result<Box<dyn SuggestionBackend>> {
        match config.backend_type {
            BackendType::Http => {
                let backend = HttpBackend::new(config)?;
                Ok(Box::new(backend))
            }
            BackendType::Canned => Ok(Box::new(CannedBackend::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_config() {
        let config = BackendConfig::new(BackendType::Http)
            .with_api_url("http://localhost:8787".to_string())
            .with_timeout(5);

        assert_eq!(config.backend_type, BackendType::Http);
        assert_eq!(config.api_url, Some("http://localhost:8787".to_string()));
        assert_eq!(config.timeout_secs, Some(5));
    }

    #[test]
    fn test_backend_type_display() {
        assert_eq!(BackendType::Http.to_string(), "http");
        assert_eq!(BackendType::Canned.to_string(), "canned");
    }

    #[test]
    fn http_backend_requires_an_api_url() {
        let err = BackendFactory::create(BackendConfig::new(BackendType::Http));
        assert!(err.is_err());
    }
}
