//! Participant configuration.

use crate::board::{DEFAULT_BOARD_HEIGHT, DEFAULT_BOARD_WIDTH};
use crate::error::{BoardError, BoardResult};
use crate::protocol::Role;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_SERVER_URL: &str = "ws://localhost:3030/ws";
/// Shortest pause between reconnect attempts, whatever the policy says.
pub const MIN_RETRY_DELAY_MS: u64 = 100;

/// Automatic reconnect behaviour of the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    pub enabled: bool,
    pub initial_delay_ms: u64,
    /// Upper bound for the doubling delay.
    pub max_delay_ms: u64,
}

impl ReconnectPolicy {
    /// Hosts retry from 1 s up to 5 s between attempts.
    pub fn host() -> Self {
        Self {
            enabled: true,
            initial_delay_ms: 1000,
            max_delay_ms: 5000,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::host()
        }
    }

    pub fn for_role(role: Role) -> Self {
        match role {
            Role::Host => Self::host(),
            Role::Viewer => Self::disabled(),
        }
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms.max(MIN_RETRY_DELAY_MS))
    }

    /// Delay after `current`: doubled, never below the floor, and capped.
    pub fn next_delay(&self, current: Duration) -> Duration {
        let cap = self.max_delay_ms.max(self.initial_delay_ms).max(MIN_RETRY_DELAY_MS);
        (current * 2)
            .max(Duration::from_millis(MIN_RETRY_DELAY_MS))
            .min(Duration::from_millis(cap))
    }

    pub fn validate(&self) -> BoardResult<()> {
        if self.enabled && self.initial_delay_ms == 0 {
            return Err(BoardError::InvalidInput(
                "reconnect initial_delay_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::disabled()
    }
}

/// Everything a participant needs to join a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub server_url: String,
    pub room: String,
    pub display_name: String,
    pub role: Role,
    pub board_width: f64,
    pub board_height: f64,
    /// Defaults by role when absent.
    pub reconnect: Option<ReconnectPolicy>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            room: String::new(),
            display_name: "Anonymous".to_string(),
            role: Role::Viewer,
            board_width: DEFAULT_BOARD_WIDTH,
            board_height: DEFAULT_BOARD_HEIGHT,
            reconnect: None,
        }
    }
}

impl SessionConfig {
    pub fn from_json(json: &str) -> BoardResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> BoardResult<()> {
        let url = Url::parse(&self.server_url)
            .map_err(|e| BoardError::InvalidInput(format!("invalid server url: {e}")))?;
        if url.scheme() != "ws" && url.scheme() != "wss" {
            return Err(BoardError::InvalidInput(format!(
                "server url must use ws or wss, got {}",
                url.scheme()
            )));
        }
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.board_width) || !positive(self.board_height) {
            return Err(BoardError::InvalidInput(format!(
                "invalid board size {}x{}",
                self.board_width, self.board_height
            )));
        }
        if let Some(policy) = &self.reconnect {
            policy.validate()?;
        }
        Ok(())
    }

    /// The configured policy, or the role default.
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        self.reconnect
            .clone()
            .unwrap_or_else(|| ReconnectPolicy::for_role(self.role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_partial_json() {
        let config = SessionConfig::from_json(r#"{"room":"math","role":"host"}"#).unwrap();
        assert_eq!(config.room, "math");
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
        assert_eq!(config.board_width, DEFAULT_BOARD_WIDTH);
        assert_eq!(config.reconnect_policy(), ReconnectPolicy::host());
    }

    #[test]
    fn test_viewer_does_not_reconnect_by_default() {
        let config = SessionConfig::default();
        assert!(!config.reconnect_policy().enabled);
    }

    #[test]
    fn test_rejects_http_url() {
        let config = SessionConfig {
            server_url: "http://localhost:3030".into(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(BoardError::InvalidInput(_))));
    }

    #[test]
    fn test_rejects_zero_size() {
        let result = SessionConfig::from_json(r#"{"board_width":0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = ReconnectPolicy::host();
        let mut delay = policy.initial_delay();
        let mut seen = Vec::new();
        for _ in 0..5 {
            seen.push(delay.as_millis());
            delay = policy.next_delay(delay);
        }
        assert_eq!(seen, vec![1000, 2000, 4000, 5000, 5000]);
    }

    #[test]
    fn test_zero_retry_delay() {
        let result = SessionConfig::from_json(
            r#"{"role":"host","reconnect":{"enabled":true,"initial_delay_ms":0,"max_delay_ms":0}}"#,
        );
        assert!(matches!(result, Err(BoardError::InvalidInput(_))));

        // Built directly, the policy still never retries back to back.
        let policy = ReconnectPolicy {
            enabled: true,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        };
        assert_eq!(policy.initial_delay(), Duration::from_millis(MIN_RETRY_DELAY_MS));
        assert_eq!(
            policy.next_delay(policy.initial_delay()),
            Duration::from_millis(MIN_RETRY_DELAY_MS)
        );
    }
}
