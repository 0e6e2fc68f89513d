//! SQLite-backed time series store

use std::str::FromStr;
use std::time::Duration;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous},
    Pool, QueryBuilder, Row, Sqlite, SqliteConnection, Transaction,
};
use tracing::debug;

use crate::domain::snapshot::PricePoint;
use crate::shared::errors::TrackerResult;
use crate::shared::types::{Interval, Sample};

const TABLE: &str = "price_samples";

// Three binds per row keeps every chunk well under SQLite's parameter limit.
const BATCH_CHUNK: usize = 1000;

/// Durable price series keyed by unix timestamp.
///
/// The ingestion merger is the only writer; everything else reads.
#[derive(Clone)]
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (creating if missing) a store file in WAL mode so readers never
    /// block on the ingestion writer.
    pub async fn open(db_path: &str) -> TrackerResult<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        debug!("Opened price store at {}", db_path);
        Ok(Self { pool })
    }

    /// Private in-memory store. A single long-lived connection holds the data.
    pub async fn in_memory() -> TrackerResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn ensure_schema(&self) -> TrackerResult<()> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {TABLE} (
                timestamp INTEGER NOT NULL PRIMARY KEY,
                price REAL NOT NULL,
                hour REAL,
                day REAL,
                week REAL,
                month REAL,
                year REAL
            );
            "#
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Price of the newest row, `None` while the store is empty
    pub async fn latest_price(&self) -> TrackerResult<Option<f64>> {
        let mut conn = self.pool.acquire().await?;
        latest_price_on(&mut conn).await
    }

    /// Newest row that carries an hourly percent change
    pub async fn latest_hour_change(&self) -> TrackerResult<Option<Sample>> {
        let row = sqlx::query(&format!(
            "SELECT * FROM {TABLE} WHERE hour IS NOT NULL ORDER BY timestamp DESC LIMIT 1"
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(sample_from_row).transpose()
    }

    pub async fn insert_if_absent(
        &self,
        timestamp: i64,
        price: f64,
        column: Option<(Interval, f64)>,
    ) -> TrackerResult<()> {
        let mut conn = self.pool.acquire().await?;
        insert_if_absent_on(&mut conn, timestamp, price, column).await
    }

    /// All rows at or after `since`, newest first
    pub async fn samples_since(&self, since: i64) -> TrackerResult<Vec<Sample>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM {TABLE} WHERE timestamp >= ? ORDER BY timestamp DESC"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(sample_from_row).collect()
    }

    pub async fn sample_at(&self, timestamp: i64) -> TrackerResult<Option<Sample>> {
        let row = sqlx::query(&format!("SELECT * FROM {TABLE} WHERE timestamp = ?"))
            .bind(timestamp)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(sample_from_row).transpose()
    }

    pub async fn count(&self) -> TrackerResult<i64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {TABLE}"))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Start an all-or-nothing write
    pub async fn begin(&self) -> TrackerResult<StoreTx> {
        Ok(StoreTx {
            tx: self.pool.begin().await?,
        })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Write handle for one ingestion call; dropped without `commit` it rolls back
pub struct StoreTx {
    tx: Transaction<'static, Sqlite>,
}

impl StoreTx {
    pub async fn latest_price(&mut self) -> TrackerResult<Option<f64>> {
        latest_price_on(&mut self.tx).await
    }

    /// Write a full row. On an existing timestamp the price stays and only
    /// null interval columns are filled.
    pub async fn insert_sample(&mut self, sample: &Sample) -> TrackerResult<()> {
        let columns = Interval::ALL.map(|i| i.as_str());
        sqlx::query(&format!(
            "INSERT INTO {TABLE} (timestamp, price, {}) VALUES (?, ?, ?, ?, ?, ?, ?){}",
            columns.join(", "),
            on_conflict_fill(&columns)
        ))
        .bind(sample.timestamp)
        .bind(sample.price)
        .bind(sample.hour)
        .bind(sample.day)
        .bind(sample.week)
        .bind(sample.month)
        .bind(sample.year)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    /// Insert-if-absent for a whole provider batch against one interval column
    pub async fn insert_batch(
        &mut self,
        interval: Interval,
        percent_change: f64,
        points: &[PricePoint],
    ) -> TrackerResult<()> {
        let column = interval.as_str();

        for chunk in points.chunks(BATCH_CHUNK) {
            let mut query_builder: QueryBuilder<Sqlite> =
                QueryBuilder::new(format!("INSERT INTO {TABLE} (timestamp, price, {column}) "));

            query_builder.push_values(chunk, |mut b, p| {
                b.push_bind(p.timestamp)
                    .push_bind(p.price)
                    .push_bind(percent_change);
            });
            query_builder.push(on_conflict_fill(&[column]));

            query_builder.build().execute(&mut *self.tx).await?;
        }

        Ok(())
    }

    pub async fn commit(self) -> TrackerResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

async fn latest_price_on(conn: &mut SqliteConnection) -> TrackerResult<Option<f64>> {
    let price: Option<f64> = sqlx::query_scalar(&format!(
        "SELECT price FROM {TABLE} ORDER BY timestamp DESC LIMIT 1"
    ))
    .fetch_optional(&mut *conn)
    .await?;

    Ok(price)
}

async fn insert_if_absent_on(
    conn: &mut SqliteConnection,
    timestamp: i64,
    price: f64,
    column: Option<(Interval, f64)>,
) -> TrackerResult<()> {
    match column {
        Some((interval, value)) => {
            let column = interval.as_str();
            sqlx::query(&format!(
                "INSERT INTO {TABLE} (timestamp, price, {column}) VALUES (?, ?, ?){}",
                on_conflict_fill(&[column])
            ))
            .bind(timestamp)
            .bind(price)
            .bind(value)
            .execute(&mut *conn)
            .await?;
        }
        None => {
            sqlx::query(&format!(
                "INSERT INTO {TABLE} (timestamp, price) VALUES (?, ?){}",
                on_conflict_fill(&[])
            ))
            .bind(timestamp)
            .bind(price)
            .execute(&mut *conn)
            .await?;
        }
    }

    Ok(())
}

/// Conflict clause shared by every write: an existing row keeps its price
/// and each listed interval column is only set while it is still null.
fn on_conflict_fill(columns: &[&str]) -> String {
    if columns.is_empty() {
        return " ON CONFLICT(timestamp) DO NOTHING".to_string();
    }
    let sets: Vec<String> = columns
        .iter()
        .map(|c| format!("{c} = COALESCE({TABLE}.{c}, excluded.{c})"))
        .collect();
    format!(" ON CONFLICT(timestamp) DO UPDATE SET {}", sets.join(", "))
}

fn sample_from_row(row: &SqliteRow) -> TrackerResult<Sample> {
    Ok(Sample {
        timestamp: row.try_get("timestamp")?,
        price: row.try_get("price")?,
        hour: row.try_get("hour")?,
        day: row.try_get("day")?,
        week: row.try_get("week")?,
        month: row.try_get("month")?,
        year: row.try_get("year")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SqliteStore {
        let store = SqliteStore::in_memory().await.unwrap();
        store.ensure_schema().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let store = store().await;
        store.ensure_schema().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_latest_price_empty_then_newest() {
        let store = store().await;
        assert_eq!(store.latest_price().await.unwrap(), None);

        store.insert_if_absent(200, 11.0, None).await.unwrap();
        store.insert_if_absent(100, 10.0, None).await.unwrap();
        assert_eq!(store.latest_price().await.unwrap(), Some(11.0));
    }

    #[tokio::test]
    async fn test_insert_if_absent_never_overwrites() {
        let store = store().await;
        store
            .insert_if_absent(100, 10.0, Some((Interval::Hour, 0.01)))
            .await
            .unwrap();
        store
            .insert_if_absent(100, 99.0, Some((Interval::Hour, 0.5)))
            .await
            .unwrap();

        let sample = store.sample_at(100).await.unwrap().unwrap();
        assert_eq!(sample.price, 10.0);
        assert_eq!(sample.hour, Some(0.01));
    }

    #[tokio::test]
    async fn test_insert_if_absent_fills_null_column() {
        let store = store().await;
        store
            .insert_if_absent(100, 10.0, Some((Interval::Hour, 0.01)))
            .await
            .unwrap();
        store
            .insert_if_absent(100, 12.0, Some((Interval::Day, 0.02)))
            .await
            .unwrap();

        let sample = store.sample_at(100).await.unwrap().unwrap();
        assert_eq!(sample.price, 10.0);
        assert_eq!(sample.hour, Some(0.01));
        assert_eq!(sample.day, Some(0.02));
        assert_eq!(sample.week, None);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_batch_insert_keeps_first_value_per_timestamp() {
        let store = store().await;
        store
            .insert_if_absent(100, 10.0, Some((Interval::Week, 0.3)))
            .await
            .unwrap();

        let mut tx = store.begin().await.unwrap();
        let points = vec![
            PricePoint { price: 20.0, timestamp: 100 },
            PricePoint { price: 21.0, timestamp: 160 },
            PricePoint { price: 22.0, timestamp: 160 },
        ];
        tx.insert_batch(Interval::Week, 0.4, &points).await.unwrap();
        tx.commit().await.unwrap();

        let first = store.sample_at(100).await.unwrap().unwrap();
        assert_eq!((first.price, first.week), (10.0, Some(0.3)));
        let second = store.sample_at(160).await.unwrap().unwrap();
        assert_eq!((second.price, second.week), (21.0, Some(0.4)));
    }

    #[tokio::test]
    async fn test_dropped_transaction_rolls_back() {
        let store = store().await;
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_sample(&Sample::new(100, 10.0)).await.unwrap();
        }
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_samples_since_is_descending() {
        let store = store().await;
        for ts in [100, 300, 200, 50] {
            store.insert_if_absent(ts, ts as f64, None).await.unwrap();
        }
        let ts: Vec<i64> = store
            .samples_since(100)
            .await
            .unwrap()
            .iter()
            .map(|s| s.timestamp)
            .collect();
        assert_eq!(ts, vec![300, 200, 100]);
    }

    #[tokio::test]
    async fn test_latest_hour_change_skips_rows_without_hour() {
        let store = store().await;
        assert!(store.latest_hour_change().await.unwrap().is_none());

        store
            .insert_if_absent(100, 10.0, Some((Interval::Hour, 0.02)))
            .await
            .unwrap();
        store
            .insert_if_absent(200, 11.0, Some((Interval::Day, 0.05)))
            .await
            .unwrap();

        let sample = store.latest_hour_change().await.unwrap().unwrap();
        assert_eq!(sample.timestamp, 100);
        assert_eq!(sample.hour, Some(0.02));
    }

    #[tokio::test]
    async fn test_insert_sample_only_fills_null_columns() {
        let store = store().await;
        store
            .insert_if_absent(100, 10.0, Some((Interval::Hour, 0.01)))
            .await
            .unwrap();

        let mut row = Sample::new(100, 99.0);
        row.hour = Some(0.5);
        row.day = Some(0.02);
        let mut tx = store.begin().await.unwrap();
        tx.insert_sample(&row).await.unwrap();
        tx.commit().await.unwrap();

        let sample = store.sample_at(100).await.unwrap().unwrap();
        assert_eq!(sample.price, 10.0);
        assert_eq!(sample.hour, Some(0.01));
        assert_eq!(sample.day, Some(0.02));
        assert_eq!(sample.year, None);
    }

    #[test]
    fn test_conflict_clause() {
        assert_eq!(on_conflict_fill(&[]), " ON CONFLICT(timestamp) DO NOTHING");
        assert_eq!(
            on_conflict_fill(&["hour", "day"]),
            " ON CONFLICT(timestamp) DO UPDATE SET hour = COALESCE(price_samples.hour, excluded.hour), \
             day = COALESCE(price_samples.day, excluded.day)"
        );
    }
}
