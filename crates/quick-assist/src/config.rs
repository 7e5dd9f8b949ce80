//! Timing and capacity knobs for the collaboration subsystem.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistConfig {
    /// Coalescing window for outgoing local edits. Only the latest buffer
    /// state inside the window is published.
    pub debounce: Duration,

    /// Window after applying a remote event during which local change
    /// notifications are suppressed instead of re-published.
    pub echo_guard: Duration,

    /// Staleness bound of the polling-backed channel.
    pub poll_interval: Duration,

    /// Retained tail of a session's event log.
    pub event_log_cap: usize,

    /// Logical lifetime of a shared session.
    pub session_ttl: Duration,

    /// How often the opener checks whether a popup window was closed.
    pub window_poll: Duration,

    /// How often a direct-link child retries establishing a real session.
    pub join_retry: Duration,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            echo_guard: Duration::from_millis(100),
            poll_interval: Duration::from_millis(500),
            event_log_cap: 50,
            session_ttl: Duration::from_secs(24 * 60 * 60),
            window_poll: Duration::from_secs(1),
            join_retry: Duration::from_secs(2),
        }
    }
}

impl AssistConfig {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_echo_guard(mut self, echo_guard: Duration) -> Self {
        self.echo_guard = echo_guard;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_event_log_cap(mut self, cap: usize) -> Self {
        self.event_log_cap = cap;
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_window_poll(mut self, window_poll: Duration) -> Self {
        self.window_poll = window_poll;
        self
    }

    pub fn with_join_retry(mut self, join_retry: Duration) -> Self {
        self.join_retry = join_retry;
        self
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| crate::AssistError::Persistence(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| crate::AssistError::Persistence(e.to_string()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| crate::AssistError::Persistence(e.to_string()))?;
        serde_json::from_str(&json).map_err(|e| crate::AssistError::Persistence(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = AssistConfig::default();
        assert_eq!(config.debounce, Duration::from_millis(500));
        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.event_log_cap, 50);
        assert_eq!(config.session_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn builders_override_single_knobs() {
        let config = AssistConfig::default()
            .with_debounce(Duration::from_millis(50))
            .with_event_log_cap(10);
        assert_eq!(config.debounce, Duration::from_millis(50));
        assert_eq!(config.event_log_cap, 10);
        assert_eq!(config.poll_interval, Duration::from_millis(500));
    }
}
