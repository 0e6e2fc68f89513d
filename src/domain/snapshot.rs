//! Normalized result of one price fetch

use std::collections::BTreeMap;

use serde::Serialize;

use crate::shared::errors::{TrackerError, TrackerResult};
use crate::shared::types::Interval;

/// The provider's current reading
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatestSample {
    pub timestamp: i64,
    pub price: f64,
    pub percent_change: BTreeMap<Interval, f64>,
}

/// One `(price, timestamp)` pair from a historical batch
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PricePoint {
    pub price: f64,
    pub timestamp: i64,
}

/// Provider history for one interval, sharing a single percent-change figure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalBatch {
    pub percent_change: f64,
    pub points: Vec<PricePoint>,
}

impl IntervalBatch {
    pub fn new(percent_change: f64, points: Vec<PricePoint>) -> Self {
        Self {
            percent_change,
            points,
        }
    }

    pub fn min_price(&self) -> Option<f64> {
        self.points.iter().map(|p| p.price).reduce(f64::min)
    }

    pub fn max_price(&self) -> Option<f64> {
        self.points.iter().map(|p| p.price).reduce(f64::max)
    }

    /// Points ordered oldest first; providers usually list newest first
    pub fn chronological(&self) -> Vec<PricePoint> {
        let mut points = self.points.clone();
        points.sort_by_key(|p| p.timestamp);
        points
    }
}

/// Interval batches keyed by interval
pub type IntervalBatches = BTreeMap<Interval, IntervalBatch>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub latest: LatestSample,
    pub batches: IntervalBatches,
}

impl Snapshot {
    /// Checks that every interval is covered and every number is finite.
    /// Runs before any write so a bad snapshot never half-applies.
    pub fn validate(&self) -> TrackerResult<()> {
        check_finite(self.latest.price, "latest price")?;

        for interval in Interval::ALL {
            let change = self.latest.percent_change.get(&interval).ok_or_else(|| {
                TrackerError::malformed(format!("missing latest percent change: {}", interval))
            })?;
            check_finite(*change, "latest percent change")?;

            let batch = self.batches.get(&interval).ok_or_else(|| {
                TrackerError::malformed(format!("missing interval batch: {}", interval))
            })?;
            check_finite(batch.percent_change, "batch percent change")?;
            for point in &batch.points {
                check_finite(point.price, "batch price")?;
            }
        }

        Ok(())
    }
}

fn check_finite(value: f64, what: &str) -> TrackerResult<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(TrackerError::malformed(format!("{} is not a finite number", what)))
    }
}
