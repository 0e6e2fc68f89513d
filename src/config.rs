use anyhow::{Context, Result};
use serde::Deserialize;
use std::{fs, path::Path, time::Duration};

use crate::domain::alert::NotifierConfig;
use crate::shared::errors::TrackerError;

/// Upper bound for every configured period (one year)
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProviderCfg {
    pub base_url: String,
    /// Coinbase internal asset uuid
    pub asset_id: String,
    pub asset_symbol: String,
    pub currency: String,
    pub timeout_secs: u64,
}

impl Default for ProviderCfg {
    fn default() -> Self {
        Self {
            base_url: "https://www.coinbase.com/api/v2".to_string(),
            asset_id: "d85dce9b-5b73-5c3c-8978-522ce1d1c1b4".to_string(), // ETH
            asset_symbol: "ETH".to_string(),
            currency: "CAD".to_string(),
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreCfg {
    pub path: String,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            path: "crypto.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestCfg {
    pub interval_secs: u64,
}

impl Default for IngestCfg {
    fn default() -> Self {
        Self { interval_secs: 60 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowCfg {
    pub span_secs: u64,
    pub refresh_secs: u64,
}

impl Default for WindowCfg {
    fn default() -> Self {
        Self {
            span_secs: 60 * 60,
            refresh_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifierCfg {
    pub enabled: bool,
    /// Fractional hourly move that triggers an alert (0.01 = 1%)
    pub threshold: f64,
    pub cooldown_secs: u64,
    pub poll_interval_secs: u64,
    /// Alerts go to the log when unset
    pub webhook_url: Option<String>,
}

impl Default for NotifierCfg {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.01,
            cooldown_secs: 30 * 60,
            poll_interval_secs: 60,
            webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderCfg,
    pub store: StoreCfg,
    pub ingest: IngestCfg,
    pub window: WindowCfg,
    pub notifier: NotifierCfg,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read {}", path.as_ref().display()))?;
        let cfg = Self::from_toml(&s)?;
        Ok(cfg)
    }

    pub fn from_toml(s: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(s).context("parse Config.toml")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        let intervals = [
            ("ingest.interval_secs", self.ingest.interval_secs),
            ("window.span_secs", self.window.span_secs),
            ("window.refresh_secs", self.window.refresh_secs),
            ("notifier.poll_interval_secs", self.notifier.poll_interval_secs),
            ("provider.timeout_secs", self.provider.timeout_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, v)| *v == 0) {
            return Err(TrackerError::Config(format!("{} must be greater than zero", name)));
        }
        let cooldown = ("notifier.cooldown_secs", self.notifier.cooldown_secs);
        if let Some((name, _)) = intervals
            .iter()
            .chain([&cooldown])
            .find(|(_, v)| *v > MAX_INTERVAL_SECS)
        {
            return Err(TrackerError::Config(format!(
                "{} must be at most {} seconds",
                name, MAX_INTERVAL_SECS
            )));
        }
        if !self.notifier.threshold.is_finite() || self.notifier.threshold < 0.0 {
            return Err(TrackerError::Config(format!(
                "notifier.threshold must be a non-negative number, got {}",
                self.notifier.threshold
            )));
        }
        if self.provider.asset_id.trim().is_empty() || self.provider.currency.trim().is_empty() {
            return Err(TrackerError::Config(
                "provider.asset_id and provider.currency are required".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ingest_interval(&self) -> Duration {
        Duration::from_secs(self.ingest.interval_secs)
    }

    pub fn window_span(&self) -> Duration {
        Duration::from_secs(self.window.span_secs)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.window.refresh_secs)
    }

    pub fn notifier_poll_interval(&self) -> Duration {
        Duration::from_secs(self.notifier.poll_interval_secs)
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            threshold: self.notifier.threshold,
            cooldown_secs: self.notifier.cooldown_secs as i64,
            asset_symbol: self.provider.asset_symbol.clone(),
            currency: self.provider.currency.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let cfg = Config::from_toml("").unwrap();
        assert_eq!(cfg.ingest.interval_secs, 60);
        assert_eq!(cfg.window.span_secs, 3600);
        assert_eq!(cfg.notifier.cooldown_secs, 1800);
        assert_eq!(cfg.provider.currency, "CAD");
        assert!(!cfg.notifier.enabled);
    }

    #[test]
    fn test_partial_sections_override() {
        let cfg = Config::from_toml(
            r#"
            [store]
            path = "/tmp/eth.db"

            [notifier]
            enabled = true
            threshold = 0.025
            webhook_url = "http://localhost:8080/hook"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.store.path, "/tmp/eth.db");
        assert!(cfg.notifier.enabled);
        assert_eq!(cfg.notifier.threshold, 0.025);
        assert_eq!(cfg.notifier.poll_interval_secs, 60);
        assert_eq!(cfg.notifier_config().cooldown_secs, 1800);
        assert_eq!(cfg.notifier_config().asset_symbol, "ETH");
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = Config::from_toml("[ingest]\ninterval_secs = 0").unwrap_err();
        assert!(err.to_string().contains("ingest.interval_secs"));
    }

    #[test]
    fn test_oversized_interval_rejected() {
        let err = Config::from_toml("[ingest]\ninterval_secs = 9223372036854775807").unwrap_err();
        assert!(format!("{:#}", err).contains("ingest.interval_secs must be at most"));

        let err = Config::from_toml("[notifier]\ncooldown_secs = 99999999999").unwrap_err();
        assert!(format!("{:#}", err).contains("notifier.cooldown_secs"));

        assert!(Config::from_toml("[window]\nspan_secs = 31536000").is_ok());
    }

    #[test]
    fn test_negative_threshold_rejected() {
        assert!(Config::from_toml("[notifier]\nthreshold = -0.5").is_err());
    }
}
