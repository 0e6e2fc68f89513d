//! Trailing-window views over the price series

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::infrastructure::storage::SqliteStore;
use crate::shared::errors::TrackerResult;
use crate::shared::types::Sample;
use crate::shared::utils::{calculate_percentage_change, minute_bucket};

pub const DEFAULT_SPAN: Duration = Duration::from_secs(60 * 60);

/// One price per minute, oldest first, as parallel sequences
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecentWindow {
    pub times: Vec<i64>,
    pub prices: Vec<f64>,
}

impl RecentWindow {
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.prices.last().copied()
    }

    /// Percent move from the first to the last point. A single point gives
    /// 0.0; an empty window or a zero first price gives `None`.
    pub fn percent_change(&self) -> Option<f64> {
        let first = *self.prices.first()?;
        let last = *self.prices.last()?;
        calculate_percentage_change(first, last)
    }

    /// Reduce newest-first samples to one point per minute bucket. The first
    /// sample met in each bucket wins, so with a descending scan the most
    /// recent sample of every minute survives.
    pub fn from_descending(samples: &[Sample]) -> Self {
        let mut buckets: BTreeMap<i64, f64> = BTreeMap::new();
        for sample in samples {
            buckets
                .entry(minute_bucket(sample.timestamp))
                .or_insert(sample.price);
        }

        let (times, prices) = buckets.into_iter().unzip();
        Self { times, prices }
    }
}

/// Read-only view builder over the store
#[derive(Clone)]
pub struct RecentWindowExtractor {
    store: Arc<SqliteStore>,
}

impl RecentWindowExtractor {
    pub fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }

    pub async fn latest_price(&self) -> TrackerResult<Option<f64>> {
        self.store.latest_price().await
    }

    /// Samples in `[now - span, ...]`, deduplicated to one per minute
    pub async fn query_recent_window(&self, now: i64, span: Duration) -> TrackerResult<RecentWindow> {
        let since = now.saturating_sub(i64::try_from(span.as_secs()).unwrap_or(i64::MAX));
        let samples = self.store.samples_since(since).await?;
        Ok(RecentWindow::from_descending(&samples))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::types::Interval;

    // 10:00:00 UTC on an arbitrary day
    const TEN_AM: i64 = 1_700_042_400;

    async fn extractor_with(rows: &[(i64, f64)]) -> RecentWindowExtractor {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        store.ensure_schema().await.unwrap();
        for (ts, price) in rows {
            store.insert_if_absent(*ts, *price, None).await.unwrap();
        }
        RecentWindowExtractor::new(store)
    }

    #[tokio::test]
    async fn test_latest_sample_in_minute_wins() {
        let extractor = extractor_with(&[
            (TEN_AM + 5, 100.0),
            (TEN_AM + 45, 101.0),
            (TEN_AM + 70, 102.0),
        ])
        .await;

        let window = extractor
            .query_recent_window(TEN_AM + 120, DEFAULT_SPAN)
            .await
            .unwrap();

        assert_eq!(window.times, vec![TEN_AM, TEN_AM + 60]);
        assert_eq!(window.prices, vec![101.0, 102.0]);
    }

    #[tokio::test]
    async fn test_empty_window() {
        let extractor = extractor_with(&[(TEN_AM - 7200, 90.0)]).await;
        let window = extractor
            .query_recent_window(TEN_AM, DEFAULT_SPAN)
            .await
            .unwrap();

        assert!(window.is_empty());
        assert!(window.prices.is_empty());
        assert_eq!(window.percent_change(), None);
    }

    #[tokio::test]
    async fn test_window_boundary_is_inclusive() {
        let extractor = extractor_with(&[(TEN_AM - 3600, 95.0), (TEN_AM - 3601, 94.0)]).await;
        let window = extractor
            .query_recent_window(TEN_AM, DEFAULT_SPAN)
            .await
            .unwrap();

        assert_eq!(window.prices, vec![95.0]);
    }

    #[tokio::test]
    async fn test_single_point_window() {
        let extractor = extractor_with(&[(TEN_AM + 30, 100.0)]).await;
        let window = extractor
            .query_recent_window(TEN_AM + 60, DEFAULT_SPAN)
            .await
            .unwrap();

        assert_eq!(window.len(), 1);
        assert_eq!(window.percent_change(), Some(0.0));
        assert_eq!(window.last_price(), Some(100.0));
    }

    #[tokio::test]
    async fn test_huge_span_covers_everything() {
        let extractor = extractor_with(&[(60, 1.0), (TEN_AM, 100.0)]).await;
        let window = extractor
            .query_recent_window(TEN_AM, Duration::from_secs(u64::MAX))
            .await
            .unwrap();

        assert_eq!(window.prices, vec![1.0, 100.0]);
    }

    #[test]
    fn test_output_is_ascending_for_any_input_order() {
        let samples: Vec<Sample> = [(300, 3.0), (100, 1.0), (200, 2.0)]
            .iter()
            .map(|(ts, p)| Sample::new(*ts, *p))
            .collect();
        let window = RecentWindow::from_descending(&samples);
        assert_eq!(window.times, vec![60, 180, 300]);
        assert_eq!(window.prices, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_percent_change_over_window() {
        let window = RecentWindow {
            times: vec![0, 60],
            prices: vec![200.0, 210.0],
        };
        assert_eq!(window.percent_change(), Some(5.0));

        let zero = RecentWindow {
            times: vec![0, 60],
            prices: vec![0.0, 1.0],
        };
        assert_eq!(zero.percent_change(), None);
    }

    #[tokio::test]
    async fn test_sparse_interval_columns_do_not_affect_window() {
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        store.ensure_schema().await.unwrap();
        store
            .insert_if_absent(TEN_AM, 100.0, Some((Interval::Year, 0.5)))
            .await
            .unwrap();
        let extractor = RecentWindowExtractor::new(store);

        assert_eq!(extractor.latest_price().await.unwrap(), Some(100.0));
        let window = extractor.query_recent_window(TEN_AM, DEFAULT_SPAN).await.unwrap();
        assert_eq!(window.prices, vec![100.0]);
    }
}
