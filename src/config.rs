use std::time::Duration;

use serde::Deserialize;

const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Wallet-side mediation settings.
///
/// Usually deserialized from the wallet's JSON configuration; every field has a default.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct MediationConfig {
    /// Upper bound on waiting for a DID connection to complete, in milliseconds.
    pub connection_timeout_ms: u64,
    /// Upper bound on candidate discovery for a single query, in milliseconds.
    pub discovery_timeout_ms: u64,
}

impl Default for MediationConfig {
    fn default() -> Self {
        Self {
            connection_timeout_ms: DEFAULT_TIMEOUT_MS,
            discovery_timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl MediationConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn discovery_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery_timeout_ms)
    }

    /// Set the connection timeout; sub-millisecond precision is dropped.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = millis(timeout);
        self
    }

    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout_ms = millis(timeout);
        self
    }
}

fn millis(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: MediationConfig =
            serde_json::from_value(json!({ "connection_timeout_ms": 3000 })).unwrap();
        assert_eq!(config.connection_timeout(), Duration::from_secs(3));
        assert_eq!(config.discovery_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn sub_second_timeouts_are_kept() {
        let config = MediationConfig::default()
            .with_connection_timeout(Duration::from_millis(500))
            .with_discovery_timeout(Duration::from_millis(250));

        assert_eq!(config.connection_timeout(), Duration::from_millis(500));
        assert_eq!(config.discovery_timeout(), Duration::from_millis(250));
        assert_eq!(config.connection_timeout_ms, 500);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_value::<MediationConfig>(json!({ "timeout": 3 })).is_err());
    }
}
