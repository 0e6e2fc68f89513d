//! Error handling for the application

use thiserror::Error;

/// Errors surfaced by the ingestion, storage and alerting core
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Price fetch failed: {0}")]
    FetchFailure(String),

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] sqlx::Error),

    #[error("Notification failed: {0}")]
    Notification(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl TrackerError {
    /// Short label used in tick failure log lines
    pub fn kind(&self) -> &'static str {
        match self {
            TrackerError::FetchFailure(_) => "FetchFailure",
            TrackerError::MalformedSnapshot(_) => "MalformedSnapshot",
            TrackerError::StoreUnavailable(_) => "StoreUnavailable",
            TrackerError::Notification(_) => "Notification",
            TrackerError::Config(_) => "Config",
        }
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        TrackerError::MalformedSnapshot(msg.into())
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        TrackerError::FetchFailure(err.to_string())
    }
}

pub type TrackerResult<T> = Result<T, TrackerError>;
