pub mod coinbase;
pub mod wire;

use async_trait::async_trait;

use crate::domain::snapshot::Snapshot;
use crate::shared::errors::TrackerResult;

pub use coinbase::CoinbaseClient;

/// Source of price snapshots
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Fetch and normalize one snapshot
    async fn fetch_snapshot(&self) -> TrackerResult<Snapshot>;
}
