// src/app.rs
use anyhow::{Context, Result};
use clap::Subcommand;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::application::{ctrl_c_shutdown, run_notifier_loop, IngestionService, Ticker};
use crate::config::Config;
use crate::domain::alert::ThresholdNotifier;
use crate::domain::snapshot::IntervalBatches;
use crate::domain::window::{RecentWindow, RecentWindowExtractor};
use crate::infrastructure::{CoinbaseClient, LogSink, NotificationSink, SqliteStore, WebhookSink};
use crate::shared::types::Interval;
use crate::shared::utils::{calculate_percentage_change, format_local, now_secs};

#[derive(Subcommand, Debug, Clone)]
pub enum Mode {
    /// Store a price sample every ingest interval until Ctrl-C
    Collect,
    /// Keep ingesting and print the recent window on every refresh
    Live,
    /// Fetch once and summarize the provider's interval batches
    Viz {
        /// Intervals to show (hour, day, week, month, year)
        #[arg(long, value_delimiter = ',', default_value = "hour,day")]
        intervals: Vec<Interval>,
    },
    /// Print the newest stored price
    Latest,
    /// Print the stored recent window once
    Window {
        /// Window length in seconds (defaults to window.span_secs)
        #[arg(long)]
        span_secs: Option<u64>,
    },
}

pub async fn run(cfg: Config, mode: Mode) -> Result<()> {
    info!(
        "Starting coinwatch for {}/{} (store: {})",
        cfg.provider.asset_symbol, cfg.provider.currency, cfg.store.path
    );

    let store = Arc::new(
        SqliteStore::open(&cfg.store.path)
            .await
            .context("open price store")?,
    );
    store.ensure_schema().await.context("create price table")?;

    let result = match mode {
        Mode::Latest => print_latest(&cfg, &store).await,
        Mode::Window { span_secs } => {
            let span = span_secs.map(Duration::from_secs).unwrap_or_else(|| cfg.window_span());
            print_window(&cfg, &store, span).await
        }
        Mode::Collect => run_collect(&cfg, store.clone()).await,
        Mode::Live => run_live(&cfg, store.clone()).await,
        Mode::Viz { intervals } => run_viz(&cfg, store.clone(), &intervals).await,
    };

    store.close().await;
    result
}

fn ingestion_service(cfg: &Config, store: Arc<SqliteStore>) -> Result<IngestionService> {
    let provider = CoinbaseClient::new(&cfg.provider)?;
    Ok(IngestionService::new(Arc::new(provider), store))
}

fn notification_sink(cfg: &Config) -> Result<Arc<dyn NotificationSink>> {
    let sink: Arc<dyn NotificationSink> = match &cfg.notifier.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(
            url.clone(),
            Duration::from_secs(cfg.provider.timeout_secs),
        )?),
        None => Arc::new(LogSink),
    };
    Ok(sink)
}

async fn print_latest(cfg: &Config, store: &Arc<SqliteStore>) -> Result<()> {
    let extractor = RecentWindowExtractor::new(store.clone());
    match extractor.latest_price().await? {
        Some(price) => println!("Latest: {:.2} {}", price, cfg.provider.currency),
        None => println!("No samples stored yet"),
    }
    Ok(())
}

async fn print_window(cfg: &Config, store: &Arc<SqliteStore>, span: Duration) -> Result<()> {
    let extractor = RecentWindowExtractor::new(store.clone());
    let window = extractor.query_recent_window(now_secs(), span).await?;
    print!("{}", render_window(&window, &cfg.provider.currency));
    Ok(())
}

async fn run_collect(cfg: &Config, store: Arc<SqliteStore>) -> Result<()> {
    let service = ingestion_service(cfg, store.clone())?;
    service
        .tick()
        .await
        .context("Error occurred while fetching the data")?;

    let shutdown = ctrl_c_shutdown();
    info!("Press Ctrl-C to stop. The current update always completes first.");

    let notifier_task = if cfg.notifier.enabled {
        let notifier = ThresholdNotifier::new(cfg.notifier_config());
        Some(tokio::spawn(run_notifier_loop(
            notifier,
            store.clone(),
            notification_sink(cfg)?,
            cfg.notifier_poll_interval(),
            shutdown.clone(),
        )))
    } else {
        None
    };

    service.run(cfg.ingest_interval(), shutdown).await;

    if let Some(task) = notifier_task {
        if let Err(e) = task.await {
            error!("Notifier task ended abnormally: {}", e);
        }
    }
    Ok(())
}

async fn run_live(cfg: &Config, store: Arc<SqliteStore>) -> Result<()> {
    let service = ingestion_service(cfg, store.clone())?;
    let extractor = RecentWindowExtractor::new(store);
    service
        .tick()
        .await
        .context("Error occurred while fetching the data")?;

    let shutdown = ctrl_c_shutdown();
    let mut ticker = Ticker::new(cfg.refresh_interval(), shutdown);

    loop {
        let view = live_view(&extractor, now_secs(), cfg.window_span(), &cfg.provider.currency).await;
        if let Some(view) = view {
            print!("{}", view);
        }

        if !ticker.next().await {
            break;
        }
        if let Err(e) = service.tick().await {
            warn!("Refresh failed ({}): {}", e.kind(), e);
        }
    }
    Ok(())
}

/// One live refresh. A failed read is reported and yields nothing, so the
/// live loop keeps going.
async fn live_view(
    extractor: &RecentWindowExtractor,
    now: i64,
    span: Duration,
    currency: &str,
) -> Option<String> {
    match extractor.query_recent_window(now, span).await {
        Ok(window) => Some(render_window(&window, currency)),
        Err(e) => {
            warn!("Window refresh failed ({}): {}", e.kind(), e);
            None
        }
    }
}

async fn run_viz(cfg: &Config, store: Arc<SqliteStore>, intervals: &[Interval]) -> Result<()> {
    let service = ingestion_service(cfg, store)?;
    let outcome = service
        .tick()
        .await
        .context("Error occurred while fetching the data")?;
    print!("{}", render_batches(&outcome.batches, intervals));
    Ok(())
}

/// Text rendering of a recent window: header line plus one row per minute
pub fn render_window(window: &RecentWindow, currency: &str) -> String {
    let mut out = String::new();
    let (Some(&first_time), Some(&last_time), Some(last_price)) =
        (window.times.first(), window.times.last(), window.last_price())
    else {
        out.push_str("No samples in the recent window\n");
        return out;
    };

    let change = match window.percent_change() {
        Some(change) => format!("{:+.2}%", change),
        None => "n/a".to_string(),
    };
    let _ = writeln!(
        out,
        "Latest Price: {:.2} {}  {}  Current Time: {}",
        last_price,
        currency,
        change,
        format_local(last_time, "%H:%M")
    );
    let _ = writeln!(
        out,
        "{} point(s) from {} to {}",
        window.len(),
        format_local(first_time, "%H:%M"),
        format_local(last_time, "%H:%M")
    );
    for (time, price) in window.times.iter().zip(&window.prices) {
        let _ = writeln!(out, "  {}  {:.2}", format_local(*time, "%H:%M"), price);
    }
    out
}

/// Summary table of the selected provider batches
pub fn render_batches(batches: &IntervalBatches, intervals: &[Interval]) -> String {
    let mut out = String::new();
    for interval in intervals {
        let Some(batch) = batches.get(interval) else {
            let _ = writeln!(out, "{:<6} no data", interval);
            continue;
        };
        let points = batch.chronological();
        let (Some(first), Some(last)) = (points.first(), points.last()) else {
            let _ = writeln!(out, "{:<6} 0 points, provider change {:+.2}%", interval, batch.percent_change * 100.0);
            continue;
        };

        let moved = calculate_percentage_change(first.price, last.price)
            .map(|c| format!("{:+.2}%", c))
            .unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(
            out,
            "{:<6} {} points  {} {:.2} -> {} {:.2}  min {:.2}  max {:.2}  moved {}  provider change {:+.2}%",
            interval,
            points.len(),
            format_local(first.timestamp, "%Y-%m-%d %H:%M"),
            first.price,
            format_local(last.timestamp, "%Y-%m-%d %H:%M"),
            last.price,
            batch.min_price().unwrap_or(first.price),
            batch.max_price().unwrap_or(last.price),
            moved,
            batch.percent_change * 100.0
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{IntervalBatch, PricePoint};

    #[test]
    fn test_render_empty_window() {
        let out = render_window(&RecentWindow::default(), "CAD");
        assert_eq!(out, "No samples in the recent window\n");
    }

    #[test]
    fn test_render_window_header() {
        let window = RecentWindow {
            times: vec![1_700_042_400, 1_700_042_460],
            prices: vec![200.0, 210.0],
        };
        let out = render_window(&window, "CAD");
        let header = out.lines().next().unwrap();
        assert!(header.starts_with("Latest Price: 210.00 CAD  +5.00%"));
        assert_eq!(out.lines().count(), 4);
    }

    #[tokio::test]
    async fn test_live_view_survives_store_errors() {
        // no schema: every read fails
        let store = Arc::new(SqliteStore::in_memory().await.unwrap());
        let extractor = RecentWindowExtractor::new(store.clone());
        let span = Duration::from_secs(3600);

        assert!(live_view(&extractor, 1_700_042_460, span, "CAD").await.is_none());

        store.ensure_schema().await.unwrap();
        store.insert_if_absent(1_700_042_400, 200.0, None).await.unwrap();
        let view = live_view(&extractor, 1_700_042_460, span, "CAD").await.unwrap();
        assert!(view.starts_with("Latest Price: 200.00 CAD"));
    }

    #[test]
    fn test_render_batches() {
        let mut batches = IntervalBatches::new();
        batches.insert(
            Interval::Hour,
            IntervalBatch::new(
                0.0123,
                vec![
                    PricePoint { price: 110.0, timestamp: 1_700_042_460 },
                    PricePoint { price: 100.0, timestamp: 1_700_042_400 },
                ],
            ),
        );
        batches.insert(Interval::Day, IntervalBatch::new(-0.02, vec![]));

        let out = render_batches(&batches, &[Interval::Hour, Interval::Day, Interval::Year]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("2 points"));
        assert!(lines[0].contains("moved +10.00%"));
        assert!(lines[0].contains("provider change +1.23%"));
        assert!(lines[1].contains("0 points, provider change -2.00%"));
        assert_eq!(lines[2], "year   no data");
    }
}
