use crate::constants::{
    DEFAULT_MAX_SEND_ATTEMPTS, DEFAULT_POWER_READY_ATTEMPTS, DEFAULT_REQUEST_DELAY_MS, DEFAULT_SUPPORTED_CHIPS,
};
use crate::error::{Result, UfcsError};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable protocol timing and limits.
///
/// The defaults match the deployed driver; none of them are mandated by the
/// protocol itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Total sends of one acknowledged message before giving up
    pub max_send_attempts: u8,
    /// Pause between resends (ms)
    pub retry_backoff_ms: u64,
    /// PowerReady receive attempts after an accepted request
    pub power_ready_attempts: u8,
    /// Pause before a source info poll or a set-point request (ms)
    pub request_delay_ms: u64,
    /// Chip names accepted by the registry
    pub supported_chips: Vec<String>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_send_attempts: DEFAULT_MAX_SEND_ATTEMPTS,
            retry_backoff_ms: 0,
            power_ready_attempts: DEFAULT_POWER_READY_ATTEMPTS,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            supported_chips: DEFAULT_SUPPORTED_CHIPS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ProtocolConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ProtocolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_send_attempts == 0 {
            return Err(UfcsError::Config("max_send_attempts must be at least 1".to_string()));
        }
        if self.power_ready_attempts == 0 {
            return Err(UfcsError::Config("power_ready_attempts must be at least 1".to_string()));
        }
        if self.supported_chips.is_empty() {
            return Err(UfcsError::Config("supported_chips must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_send_attempts, Duration::from_millis(self.retry_backoff_ms))
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn supports_chip(&self, name: &str) -> bool {
        self.supported_chips.iter().any(|chip| chip == name)
    }
}
