//! Weather engine error types.
//!
//! Within a refresh cycle none of these escape: each is caught where it
//! happens and turned into a fallback value or an advisory on the view.
//! Outside the cycle they convert into `AppError`.

use nimbus_core::{AppError, DatabaseError, NetworkError, WeatherError};
use thiserror::Error;

/// Live position read failures. Always recoverable through the fallback chain.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Location sensor unavailable")]
    SensorUnavailable,
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Location request timed out")]
    Timeout,
    #[error("Location error: {0}")]
    Other(String),
}

/// Provider request failures. Recovered by reading the field from cache.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed payload: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Network(e) => e.user_message(),
            Self::Status { status: 401, .. } => "Weather API key is invalid. Check settings.",
            Self::Status { .. } => "Weather service error. Please try again.",
            Self::Malformed(_) => "Received an unexpected response. Please try again.",
        }
    }
}

impl From<FetchError> for WeatherError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Status { status: 401, .. } => WeatherError::InvalidApiKey,
            other => WeatherError::ApiError(other.to_string()),
        }
    }
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Network(e) => AppError::Network(e),
            other => AppError::Weather(other.into()),
        }
    }
}

/// Key/value store failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Serialization error: {0}")]
    Serialize(String),
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Storage(e) => AppError::Database(e),
            other => AppError::Other(anyhow::Error::new(other)),
        }
    }
}

/// Failures that abort a whole refresh cycle.
#[derive(Debug, Error)]
pub enum RefreshError {
    #[error("Fetch task failed: {0}")]
    TaskFailed(String),
}

impl RefreshError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::TaskFailed(_) => "An error occurred while fetching data. Please try again.",
        }
    }
}

impl From<tokio::task::JoinError> for RefreshError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskFailed(err.to_string())
    }
}
