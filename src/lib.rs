//! coinwatch - crypto price collector
//! Local time series, recent-window views and hourly-move alerts

pub mod app;
pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod shared;

// Re-export main types for convenience
pub use domain::ingest::IngestionMerger;
pub use domain::window::RecentWindowExtractor;
pub use domain::alert::ThresholdNotifier;
pub use infrastructure::storage::SqliteStore;
pub use shared::errors::TrackerError;
