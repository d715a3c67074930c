// lib.rs - shared coordination core for requester and responder clients

#![forbid(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::too_many_lines)]

pub mod app;
pub mod capabilities;
pub mod config;
pub mod connection;
pub mod event;
pub mod fleet;
pub mod geo;
pub mod lifecycle;
pub mod location;
pub mod model;
pub mod pending;
pub mod presence;
pub mod protocol;
pub mod view;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

pub use app::App;
pub use capabilities::{Capabilities, Effect};
pub use config::CoreConfig;
pub use event::Event;
pub use geo::{distance_km, format_distance_km, CoordinateError, LatLon};
pub use model::Model;
pub use view::ViewModel;

pub use crux_core::{render::Render, App as CruxApp};

pub const DEFAULT_CHANNEL_URL: &str = "http://localhost:3000";
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 10;
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 10_000;
pub const BASE_RETRY_DELAY_MS: u64 = 1_000;
pub const MAX_RETRY_DELAY_MS: u64 = 5_000;
pub const JITTER_MAX_MS: u64 = 500;
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_MIN_DISTANCE_M: f64 = 10.0;
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(30);
pub const MAP_LATITUDE_DELTA: f64 = 0.0922;
pub const MAP_LONGITUDE_DELTA: f64 = 0.0421;
pub const PRESENCE_STORE_KEY: &str = "driverStatus";
pub const RESPONDER_USER_TYPE: &str = "ambulance";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorSeverity {
    Transient,
    Permanent,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    Validation,
    Connectivity,
    Conflict,
    NotFound,
    Location,
    LocationPermissionDenied,
    Protocol,
    Storage,
    Configuration,
    InvalidState,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::Connectivity => "CONNECTIVITY_ERROR",
            Self::Conflict => "CONFLICT",
            Self::NotFound => "NOT_FOUND",
            Self::Location => "LOCATION_ERROR",
            Self::LocationPermissionDenied => "LOCATION_PERMISSION_DENIED",
            Self::Protocol => "PROTOCOL_ERROR",
            Self::Storage => "STORAGE_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
            Self::InvalidState => "INVALID_STATE",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    #[must_use]
    pub const fn default_severity(self) -> ErrorSeverity {
        match self {
            Self::Connectivity | Self::Conflict | Self::Location | Self::Storage => {
                ErrorSeverity::Transient
            }

            Self::Protocol | Self::InvalidState | Self::Internal => ErrorSeverity::Fatal,

            Self::Validation
            | Self::NotFound
            | Self::LocationPermissionDenied
            | Self::Configuration => ErrorSeverity::Permanent,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::Connectivity | Self::Conflict | Self::Location | Self::Storage
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
    pub message: String,
    pub internal_message: Option<String>,
    pub context: HashMap<String, String>,
}

impl AppError {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            severity: kind.default_severity(),
            message: message.into(),
            internal_message: None,
            context: HashMap::new(),
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    #[must_use]
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connectivity, message)
    }

    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    #[must_use]
    pub fn with_internal(mut self, internal: impl Into<String>) -> Self {
        self.internal_message = Some(internal.into());
        self
    }

    #[must_use]
    pub fn with_severity(mut self, severity: ErrorSeverity) -> Self {
        self.severity = severity;
        self
    }

    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable() && !matches!(self.severity, ErrorSeverity::Fatal)
    }

    #[must_use]
    pub fn user_facing_message(&self) -> String {
        match self.kind {
            ErrorKind::Validation | ErrorKind::Conflict => self.message.clone(),
            ErrorKind::Connectivity => {
                "Unable to reach the dispatch server. Your last action could not be confirmed."
                    .into()
            }
            ErrorKind::NotFound => "This request is no longer available.".into(),
            ErrorKind::Location => {
                "Unable to determine your location. Please check your GPS settings.".into()
            }
            ErrorKind::LocationPermissionDenied => {
                "Allow location access to use this feature.".into()
            }
            ErrorKind::Storage => "Unable to save your status on this device.".into(),
            ErrorKind::Protocol | ErrorKind::InvalidState | ErrorKind::Internal => {
                "An unexpected error occurred. Please try again.".into()
            }
            ErrorKind::Configuration => {
                "The app is misconfigured. Please contact support.".into()
            }
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code(), self.message)?;
        if let Some(internal) = &self.internal_message {
            write!(f, " (internal: {internal})")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

pub type AppResult<T> = Result<T, AppError>;

#[must_use]
pub fn calculate_retry_delay(attempt: u32, jitter_ms: u64) -> u64 {
    if attempt == 0 {
        return 0;
    }
    let exponential = BASE_RETRY_DELAY_MS.saturating_mul(2u64.saturating_pow(attempt - 1));
    exponential.min(MAX_RETRY_DELAY_MS).saturating_add(jitter_ms)
}

#[must_use]
pub fn generate_jitter() -> u64 {
    use rand::Rng;

    rand::thread_rng().gen_range(0..JITTER_MAX_MS)
}

#[must_use]
pub fn get_current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
