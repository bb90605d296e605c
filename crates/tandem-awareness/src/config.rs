//! Awareness configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tandem_core::Value;

use crate::error::{AwarenessError, Result};

/// Default time after which a silent peer is considered gone
pub const DEFAULT_OUTDATED_TIMEOUT_MS: u64 = 30_000;

/// Awareness store and reaper configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AwarenessConfig {
    /// Milliseconds without an update before a peer is evicted
    pub outdated_timeout_ms: u64,
    /// Local state set when the store is created
    pub initial_state: Option<Value>,
}

impl AwarenessConfig {
    pub fn new(outdated_timeout_ms: u64) -> Self {
        Self {
            outdated_timeout_ms,
            ..Self::default()
        }
    }

    pub fn with_outdated_timeout(mut self, timeout: Duration) -> Self {
        self.outdated_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_initial_state(mut self, state: Value) -> Self {
        self.initial_state = Some(state);
        self
    }

    /// Parse a TOML fragment such as
    ///
    /// ```toml
    /// outdated_timeout_ms = 10000
    ///
    /// [initial_state]
    /// name = "alice"
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| AwarenessError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.outdated_timeout_ms == 0 {
            return Err(AwarenessError::InvalidConfig(
                "outdated_timeout_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    pub fn outdated_timeout(&self) -> Duration {
        Duration::from_millis(self.outdated_timeout_ms)
    }
}

impl Default for AwarenessConfig {
    fn default() -> Self {
        Self {
            outdated_timeout_ms: DEFAULT_OUTDATED_TIMEOUT_MS,
            initial_state: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AwarenessConfig::default();
        assert_eq!(config.outdated_timeout(), Duration::from_secs(30));
        assert!(config.initial_state.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml() {
        let config = AwarenessConfig::from_toml_str(
            r#"
            outdated_timeout_ms = 200

            [initial_state]
            name = "alice"
            "#,
        )
        .unwrap();

        assert_eq!(config.outdated_timeout_ms, 200);
        let state = config.initial_state.unwrap();
        assert_eq!(state.get_path("name").and_then(Value::as_str), Some("alice"));
    }

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = AwarenessConfig::from_toml_str("").unwrap();
        assert_eq!(config, AwarenessConfig::default());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        assert!(matches!(
            AwarenessConfig::from_toml_str("outdated_timeout_ms = 0"),
            Err(AwarenessError::InvalidConfig(_))
        ));
        assert!(AwarenessConfig::new(0).validate().is_err());
    }

    #[test]
    fn test_builder() {
        let config = AwarenessConfig::default()
            .with_outdated_timeout(Duration::from_millis(1500))
            .with_initial_state(Value::object());
        assert_eq!(config.outdated_timeout_ms, 1500);
        assert_eq!(config.initial_state, Some(Value::object()));
    }
}
