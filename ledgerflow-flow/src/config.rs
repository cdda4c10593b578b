use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::ConfigError;

/// Delay between finalization attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackoffConfig {
    Fixed {
        delay_ms: u64,
    },

    Exponential {
        initial_delay_ms: u64,
        max_delay_ms: u64,
        /// Growth per attempt (default: 2.0)
        #[serde(default = "default_multiplier")]
        multiplier: f64,
    },
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for BackoffConfig {
    fn default() -> Self {
        BackoffConfig::Exponential {
            initial_delay_ms: 500,
            max_delay_ms: 10_000,
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Delay after failed attempt number `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        match self {
            BackoffConfig::Fixed { delay_ms } => Duration::from_millis(*delay_ms),
            BackoffConfig::Exponential {
                initial_delay_ms,
                max_delay_ms,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let delay_ms = (*initial_delay_ms as f64) * multiplier.powi(exponent);
                let capped = delay_ms.min(*max_delay_ms as f64).max(0.0);
                Duration::from_millis(capped as u64)
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if let BackoffConfig::Exponential {
            initial_delay_ms,
            max_delay_ms,
            multiplier,
        } = self
        {
            if !multiplier.is_finite() || *multiplier < 1.0 {
                return Err(ConfigError::Invalid {
                    field: "backoff.multiplier",
                    reason: format!("must be a finite number >= 1, got {}", multiplier),
                });
            }
            if max_delay_ms < initial_delay_ms {
                return Err(ConfigError::Invalid {
                    field: "backoff.max_delay_ms",
                    reason: format!(
                        "{} is below initial_delay_ms {}",
                        max_delay_ms, initial_delay_ms
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Settings for the mint flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
    /// Length of the validity window of built proposals
    #[serde(default = "default_validity_window_secs")]
    pub validity_window_secs: u64,

    /// How long one finalization attempt may wait for the notary
    #[serde(default = "default_finality_timeout_ms")]
    pub finality_timeout_ms: u64,

    /// Finalization attempts before giving up, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_validity_window_secs() -> u64 {
    // One day
    86_400
}

fn default_finality_timeout_ms() -> u64 {
    30_000
}

fn default_max_attempts() -> u32 {
    3
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            validity_window_secs: default_validity_window_secs(),
            finality_timeout_ms: default_finality_timeout_ms(),
            max_attempts: default_max_attempts(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl FlowConfig {
    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: FlowConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_attempts",
                reason: "at least one attempt is required".to_string(),
            });
        }
        if self.finality_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "finality_timeout_ms",
                reason: "must be positive".to_string(),
            });
        }
        if self.validity_window_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "validity_window_secs",
                reason: "must be positive".to_string(),
            });
        }
        self.backoff.validate()
    }

    pub fn finality_timeout(&self) -> Duration {
        Duration::from_millis(self.finality_timeout_ms)
    }

    pub fn validity_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.validity_window_secs.min(i64::MAX as u64) as i64)
    }
}
