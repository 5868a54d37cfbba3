use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::batch::DEFAULT_BATCH_CAPACITY;
use crate::error::ChainError;

/// Runtime configuration for the audit ledger, loaded from environment
/// variables with sensible defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Events per batch before auto-sealing.
    pub batch_capacity: usize,
    /// Bounded retries per anchor publication.
    pub anchor_max_retries: u32,
    /// Timeout for a single anchor attempt, in seconds.
    pub anchor_timeout_secs: u64,
}

impl LedgerConfig {
    pub fn load() -> Result<Self, ChainError> {
        let batch_capacity = env::var("AUDIT_BATCH_CAPACITY")
            .unwrap_or_else(|_| DEFAULT_BATCH_CAPACITY.to_string())
            .parse()
            .map_err(|e| ChainError::ConfigError(format!("AUDIT_BATCH_CAPACITY: {}", e)))?;

        let anchor_max_retries = env::var("AUDIT_ANCHOR_MAX_RETRIES")
            .unwrap_or_else(|_| "3".to_string())
            .parse()
            .map_err(|e| ChainError::ConfigError(format!("AUDIT_ANCHOR_MAX_RETRIES: {}", e)))?;

        let anchor_timeout_secs = env::var("AUDIT_ANCHOR_TIMEOUT_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|e| ChainError::ConfigError(format!("AUDIT_ANCHOR_TIMEOUT_SECS: {}", e)))?;

        let config = Self {
            batch_capacity,
            anchor_max_retries,
            anchor_timeout_secs,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ChainError> {
        if self.batch_capacity == 0 {
            return Err(ChainError::ConfigError(
                "batch capacity must be at least 1".to_string(),
            ));
        }
        if self.anchor_max_retries == 0 {
            return Err(ChainError::ConfigError(
                "anchor retries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn anchor_timeout(&self) -> Duration {
        Duration::from_secs(self.anchor_timeout_secs)
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            batch_capacity: DEFAULT_BATCH_CAPACITY,
            anchor_max_retries: 3,
            anchor_timeout_secs: 10,
        }
    }
}
