use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::location::SamplingPolicy;
use crate::{
    AppError, ErrorKind, DEFAULT_ATTEMPT_TIMEOUT_MS, DEFAULT_CHANNEL_URL,
    DEFAULT_MIN_DISTANCE_M, DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_SAMPLE_INTERVAL_MS,
};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("config is not valid JSON: {0}")]
    Parse(String),
    #[error("channel url '{url}' is invalid: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },
    #[error("{field} must be a non-negative number")]
    MustBeNonNegative { field: &'static str },
}

impl From<ConfigError> for AppError {
    fn from(e: ConfigError) -> Self {
        AppError::new(ErrorKind::Configuration, e.to_string())
    }
}

/// Shell-supplied settings. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoreConfig {
    pub channel_url: String,
    pub reconnect_attempts: u32,
    pub attempt_timeout_ms: u64,
    pub sample_interval_ms: u64,
    pub min_distance_m: f64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            channel_url: DEFAULT_CHANNEL_URL.to_string(),
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            attempt_timeout_ms: DEFAULT_ATTEMPT_TIMEOUT_MS,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
        }
    }
}

impl CoreConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.channel_url).map_err(|e| ConfigError::InvalidUrl {
            url: self.channel_url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            return Err(ConfigError::InvalidUrl {
                url: self.channel_url.clone(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if self.reconnect_attempts == 0 {
            return Err(ConfigError::MustBePositive {
                field: "reconnectAttempts",
            });
        }
        if self.attempt_timeout_ms == 0 {
            return Err(ConfigError::MustBePositive {
                field: "attemptTimeoutMs",
            });
        }
        if self.sample_interval_ms == 0 {
            return Err(ConfigError::MustBePositive {
                field: "sampleIntervalMs",
            });
        }
        if !self.min_distance_m.is_finite() || self.min_distance_m < 0.0 {
            return Err(ConfigError::MustBeNonNegative {
                field: "minDistanceM",
            });
        }
        Ok(())
    }

    #[must_use]
    pub fn sampling_policy(&self) -> SamplingPolicy {
        SamplingPolicy {
            interval_ms: self.sample_interval_ms,
            min_distance_m: self.min_distance_m,
        }
    }
}
