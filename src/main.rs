use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use coinwatch::app::{self, Mode};
use coinwatch::config::Config;

#[derive(Parser, Debug)]
#[command(version, about = "Collect crypto prices into a local time series and watch for large moves")]
struct Args {
    #[command(subcommand)]
    mode: Mode,

    /// Path to config file (optional)
    #[arg(long, global = true)]
    config: Option<String>,

    /// SQLite database file (overrides config)
    #[arg(long, global = true)]
    db: Option<String>,

    /// Provider asset uuid (overrides config)
    #[arg(long, global = true)]
    asset_id: Option<String>,

    /// Quote currency, e.g. CAD or USD (overrides config)
    #[arg(long, global = true)]
    currency: Option<String>,

    /// Seconds between ingestion ticks (overrides config)
    #[arg(long, global = true)]
    interval_secs: Option<u64>,

    /// Enable hourly-move alerts while collecting
    #[arg(long, global = true)]
    notify: bool,

    /// Hourly move that triggers an alert, as a fraction (0.01 = 1%)
    #[arg(long, global = true)]
    threshold: Option<f64>,

    /// Minimum seconds between two alerts (overrides config)
    #[arg(long, global = true)]
    cooldown_secs: Option<u64>,

    /// Webhook that receives alerts as JSON (overrides config)
    #[arg(long, global = true)]
    webhook_url: Option<String>,
}

impl Args {
    /// Priority: CLI args > Config file > Defaults
    fn into_config(self) -> Result<(Config, Mode)> {
        let mut cfg = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(db) = self.db {
            cfg.store.path = db;
        }
        if let Some(asset_id) = self.asset_id {
            cfg.provider.asset_id = asset_id;
        }
        if let Some(currency) = self.currency {
            cfg.provider.currency = currency;
        }
        if let Some(interval_secs) = self.interval_secs {
            cfg.ingest.interval_secs = interval_secs;
        }
        if self.notify {
            cfg.notifier.enabled = true;
        }
        if let Some(threshold) = self.threshold {
            cfg.notifier.threshold = threshold;
        }
        if let Some(cooldown_secs) = self.cooldown_secs {
            cfg.notifier.cooldown_secs = cooldown_secs;
        }
        if let Some(webhook_url) = self.webhook_url {
            cfg.notifier.webhook_url = Some(webhook_url);
        }

        cfg.validate()?;
        Ok((cfg, self.mode))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let (cfg, mode) = Args::parse().into_config()?;
    app::run(cfg, mode).await
}
