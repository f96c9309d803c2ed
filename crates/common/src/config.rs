use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::relay::{RelayEndpoint, Timing, DEFAULT_CONNECT_TIMEOUT};

pub const DEFAULT_RELAYS: [&str; 3] = [
    "wss://relay.damus.io",
    "wss://nos.lol",
    "wss://relay.snort.social",
];
pub const DEFAULT_HISTORY_LIMIT: usize = 5;
pub const DEFAULT_USER_SECRET: &str = "super-secret-key";
/// Seconds; zero waits forever
pub const DEFAULT_LISTEN_TIMEOUT: u64 = 30;

pub fn default_relays() -> Vec<RelayEndpoint> {
    DEFAULT_RELAYS
        .iter()
        .filter_map(|relay| relay.parse().ok())
        .collect()
}

/// Settings shared by every flow
///
/// Every field has a default, so a partial (or missing) file still gives a
/// usable config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relays every operation fans out to
    pub relays: Vec<RelayEndpoint>,
    /// Records requested from each relay when reading history
    pub history_limit: usize,
    /// Salt mixed into every conversation key
    pub user_secret: String,
    /// Chat display name used when none is given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_username: Option<String>,
    /// One-shot listen timeout in seconds, 0 waits forever
    pub listen_timeout: u64,
    pub timing: TimingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relays: default_relays(),
            history_limit: DEFAULT_HISTORY_LIMIT,
            user_secret: DEFAULT_USER_SECRET.to_string(),
            default_username: None,
            listen_timeout: DEFAULT_LISTEN_TIMEOUT,
            timing: TimingConfig::default(),
        }
    }
}

impl Config {
    /// Replace unusable values with their defaults
    ///
    /// An empty relay list, a zero history limit, an empty secret or a
    /// blank username fall back.
    pub fn normalized(mut self) -> Self {
        if self.relays.is_empty() {
            self.relays = default_relays();
        }
        if self.history_limit == 0 {
            self.history_limit = DEFAULT_HISTORY_LIMIT;
        }
        if self.user_secret.is_empty() {
            self.user_secret = DEFAULT_USER_SECRET.to_string();
        }
        self.default_username = self
            .default_username
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty());
        self
    }

    /// `None` means wait forever
    pub fn listen_timeout(&self) -> Option<Duration> {
        match self.listen_timeout {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

/// Fan-out time limits, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub fetch_wait_ms: u64,
    pub query_deadline_ms: u64,
    pub publish_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let timing = Timing::default();
        Self {
            fetch_wait_ms: timing.fetch_wait.as_millis() as u64,
            query_deadline_ms: timing.query_deadline.as_millis() as u64,
            publish_timeout_ms: timing.publish_timeout.as_millis() as u64,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl TimingConfig {
    pub fn timing(&self) -> Timing {
        Timing {
            fetch_wait: Duration::from_millis(self.fetch_wait_ms),
            query_deadline: Duration::from_millis(self.query_deadline_ms),
            publish_timeout: Duration::from_millis(self.publish_timeout_ms),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.relays.len(), 3);
        assert_eq!(config.relays[0].as_str(), "wss://relay.damus.io");
        assert_eq!(config.history_limit, 5);
        assert_eq!(config.user_secret, "super-secret-key");
        assert_eq!(config.listen_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.timing.timing(), Timing::default());
        assert_eq!(config.timing.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            relays = ["ws://localhost:7777"]
            listen_timeout = 0

            [timing]
            fetch_wait_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(config.relays.len(), 1);
        assert_eq!(config.history_limit, DEFAULT_HISTORY_LIMIT);
        assert_eq!(config.listen_timeout(), None);
        assert_eq!(config.timing.timing().fetch_wait, Duration::from_millis(1500));
        assert_eq!(config.timing.publish_timeout_ms, 5000);
    }

    #[test]
    fn test_normalize_falls_back() {
        let config = Config {
            relays: vec![],
            history_limit: 0,
            user_secret: String::new(),
            default_username: Some("   ".to_string()),
            ..Config::default()
        }
        .normalized();

        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_relay_is_rejected() {
        let result: Result<Config, _> = toml::from_str(r#"relays = ["https://example.com"]"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = Config {
            default_username: Some("alice".to_string()),
            ..Config::default()
        };
        let text = toml::to_string(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back, config);
    }
}
