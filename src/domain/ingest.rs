//! Merges fetched snapshots into the time series

use std::sync::Arc;

use tracing::{debug, info};

use crate::domain::snapshot::{IntervalBatches, PricePoint, Snapshot};
use crate::infrastructure::storage::SqliteStore;
use crate::shared::errors::TrackerResult;
use crate::shared::types::{Interval, Sample};
use crate::shared::utils::{round_change, round_price};

/// What one `ingest` call did, plus the batches for display consumers
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub batches: IntervalBatches,
    pub latest_price: f64,
    /// `false` when the latest row was suppressed as unchanged
    pub latest_written: bool,
}

/// Sole writer of the price series
pub struct IngestionMerger {
    store: Arc<SqliteStore>,
}

impl IngestionMerger {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    /// Apply one snapshot in a single transaction.
    ///
    /// If the stored latest price equals the new rounded price, the latest
    /// row is not written. A flat market and a stale provider reading look
    /// identical here, so two consecutive equal readings always collapse into
    /// one row. Interval batches are merged either way, each against its own
    /// column only, and returned to the caller.
    pub async fn ingest(&self, snapshot: Snapshot) -> TrackerResult<IngestOutcome> {
        snapshot.validate()?;
        let Snapshot { latest, batches } = snapshot;

        let latest_price = round_price(latest.price);
        let mut row = Sample::new(latest.timestamp, latest_price);
        row.hour = latest.percent_change.get(&Interval::Hour).copied().map(round_change);
        row.day = latest.percent_change.get(&Interval::Day).copied().map(round_change);
        row.week = latest.percent_change.get(&Interval::Week).copied().map(round_change);
        row.month = latest.percent_change.get(&Interval::Month).copied().map(round_change);
        row.year = latest.percent_change.get(&Interval::Year).copied().map(round_change);

        let mut tx = self.store.begin().await?;

        let latest_written = if tx.latest_price().await? == Some(latest_price) {
            debug!("Latest price {} unchanged, skipping latest row", latest_price);
            false
        } else {
            tx.insert_sample(&row).await?;
            true
        };

        for (interval, batch) in &batches {
            let points: Vec<PricePoint> = batch
                .points
                .iter()
                .map(|p| PricePoint {
                    price: round_price(p.price),
                    timestamp: p.timestamp,
                })
                .collect();
            tx.insert_batch(*interval, round_change(batch.percent_change), &points)
                .await?;
        }

        tx.commit().await?;

        info!("Latest: {:.2}", latest_price);
        Ok(IngestOutcome {
            batches,
            latest_price,
            latest_written,
        })
    }
}
