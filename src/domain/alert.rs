//! Hourly percent-change alerts with a cooldown

use tracing::{debug, info};

use crate::infrastructure::notify::NotificationSink;
use crate::infrastructure::storage::SqliteStore;
use crate::shared::errors::TrackerResult;
use crate::shared::types::Sample;
use crate::shared::utils::format_local;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertState {
    Idle,
    Cooldown { sent_at: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollDecision {
    /// Nothing stored with an hourly change yet
    NoData,
    BelowThreshold,
    CoolingDown { remaining_secs: i64 },
    Send(Alert),
}

#[derive(Debug, Clone)]
pub struct NotifierConfig {
    /// Fractional hourly move, 0.01 = 1%
    pub threshold: f64,
    pub cooldown_secs: i64,
    pub asset_symbol: String,
    pub currency: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            threshold: 0.01,
            cooldown_secs: 30 * 60,
            asset_symbol: "ETH".to_string(),
            currency: "CAD".to_string(),
        }
    }
}

pub struct ThresholdNotifier {
    config: NotifierConfig,
    state: AlertState,
}

impl ThresholdNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            config,
            state: AlertState::Idle,
        }
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    /// Decide what a poll at `now` should do. Only the cooldown expiry
    /// changes state here; entering cooldown waits for `mark_sent`.
    pub fn decide(&mut self, now: i64, reading: Option<&Sample>) -> PollDecision {
        if let AlertState::Cooldown { sent_at } = self.state {
            let elapsed = now - sent_at;
            if elapsed < self.config.cooldown_secs {
                return PollDecision::CoolingDown {
                    remaining_secs: self.config.cooldown_secs - elapsed,
                };
            }
            self.state = AlertState::Idle;
        }

        let Some(sample) = reading else {
            return PollDecision::NoData;
        };
        let Some(change) = sample.hour else {
            return PollDecision::NoData;
        };

        if change.abs() >= self.config.threshold {
            PollDecision::Send(self.compose(sample, change))
        } else {
            PollDecision::BelowThreshold
        }
    }

    pub fn mark_sent(&mut self, now: i64) {
        self.state = AlertState::Cooldown { sent_at: now };
    }

    /// One poll: read the newest hourly change, send at most one alert.
    /// Returns whether an alert went out. A failed send leaves the notifier
    /// idle so the next qualifying poll tries again.
    pub async fn poll(
        &mut self,
        now: i64,
        store: &SqliteStore,
        sink: &dyn NotificationSink,
    ) -> TrackerResult<bool> {
        let reading = store.latest_hour_change().await?;

        match self.decide(now, reading.as_ref()) {
            PollDecision::Send(alert) => {
                sink.send(&alert.subject, &alert.body).await?;
                self.mark_sent(now);
                info!("Alert sent: {}", alert.subject);
                Ok(true)
            }
            PollDecision::CoolingDown { remaining_secs } => {
                debug!("Alert cooldown, {}s remaining", remaining_secs);
                Ok(false)
            }
            other => {
                debug!("No alert: {:?}", other);
                Ok(false)
            }
        }
    }

    fn compose(&self, sample: &Sample, change: f64) -> Alert {
        let direction = if change < 0.0 { "down" } else { "up" };
        let subject = format!(
            "{} {} {:.2}% in the last hour",
            self.config.asset_symbol,
            direction,
            change.abs() * 100.0
        );
        let body = format!(
            "{} price: {:.2} {} at {}\nHourly change: {:+.2}%\nThreshold: {:.2}%",
            self.config.asset_symbol,
            sample.price,
            self.config.currency,
            format_local(sample.timestamp, "%Y-%m-%d %H:%M:%S"),
            change * 100.0,
            self.config.threshold * 100.0
        );
        Alert { subject, body }
    }
}
