//! Domain layer - snapshots, ingestion, windowing and alerting rules

pub mod alert;
pub mod ingest;
pub mod snapshot;
pub mod window;

pub use alert::{NotifierConfig, ThresholdNotifier};
pub use ingest::{IngestOutcome, IngestionMerger};
pub use snapshot::{IntervalBatch, IntervalBatches, Snapshot};
pub use window::{RecentWindow, RecentWindowExtractor};
