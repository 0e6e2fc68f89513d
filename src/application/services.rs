//! Application services - periodic ingestion and alert loops

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::domain::alert::ThresholdNotifier;
use crate::domain::ingest::{IngestOutcome, IngestionMerger};
use crate::infrastructure::notify::NotificationSink;
use crate::infrastructure::provider::PriceProvider;
use crate::infrastructure::storage::SqliteStore;
use crate::shared::errors::TrackerResult;
use crate::shared::utils::now_secs;

/// Stop signal shared by every loop; `true` means stop
pub type Shutdown = watch::Receiver<bool>;

/// Fetch + merge, the unit of work of one ingestion tick
pub struct IngestionService {
    provider: Arc<dyn PriceProvider>,
    merger: IngestionMerger,
}

impl IngestionService {
    pub fn new(provider: Arc<dyn PriceProvider>, store: Arc<SqliteStore>) -> Self {
        Self {
            provider,
            merger: IngestionMerger::new(store),
        }
    }

    pub async fn tick(&self) -> TrackerResult<IngestOutcome> {
        let snapshot = self.provider.fetch_snapshot().await?;
        self.merger.ingest(snapshot).await
    }

    /// Tick every `every` until shutdown. Failed ticks are logged by kind and
    /// skipped; the next tick proceeds normally.
    pub async fn run(&self, every: Duration, shutdown: Shutdown) {
        info!("Ingestion loop started, every {:?}", every);
        let mut ticker = Ticker::new(every, shutdown);

        while ticker.next().await {
            match self.tick().await {
                Ok(outcome) if !outcome.latest_written => {
                    info!("Price unchanged at {:.2}", outcome.latest_price);
                }
                Ok(_) => {}
                Err(e) => warn!("Ingestion tick failed ({}): {}", e.kind(), e),
            }
            let next = chrono::Local::now() + chrono::Duration::seconds(every.as_secs() as i64);
            info!("Next update at {}", next.format("%I:%M:%S %p"));
        }
        info!("Ingestion loop stopped");
    }
}

/// Poll the store and alert on large hourly moves until shutdown
pub async fn run_notifier_loop(
    mut notifier: ThresholdNotifier,
    store: Arc<SqliteStore>,
    sink: Arc<dyn NotificationSink>,
    every: Duration,
    shutdown: Shutdown,
) {
    info!("Notifier loop started, every {:?}", every);
    let mut ticker = Ticker::new(every, shutdown);

    while ticker.next().await {
        if let Err(e) = notifier.poll(now_secs(), &store, sink.as_ref()).await {
            error!("Notifier tick failed ({}): {}", e.kind(), e);
        }
    }
    info!("Notifier loop stopped");
}

/// Fixed-cadence ticks that end on shutdown. The first tick fires one period
/// from creation. Shutdown is only observed while waiting, so work done
/// between ticks always runs to completion.
pub struct Ticker {
    interval: Interval,
    shutdown: Shutdown,
}

impl Ticker {
    pub fn new(every: Duration, shutdown: Shutdown) -> Self {
        let mut interval = interval_at(Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self { interval, shutdown }
    }

    /// Wait for the next tick; `false` once stop was requested
    pub async fn next(&mut self) -> bool {
        loop {
            if *self.shutdown.borrow() {
                return false;
            }
            tokio::select! {
                _ = self.interval.tick() => return true,
                changed = self.shutdown.changed() => {
                    // sender gone counts as a stop request
                    if changed.is_err() {
                        return false;
                    }
                }
            }
        }
    }
}

/// Stop channel flipped on Ctrl-C
pub fn ctrl_c_shutdown() -> Shutdown {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Stop requested, finishing current tick...");
        }
        let _ = tx.send(true);
    });
    rx
}
