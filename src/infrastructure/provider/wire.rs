//! Coinbase asset-price payload and its normalization into a `Snapshot`

use std::collections::{BTreeMap, HashMap};

use chrono::DateTime;
use serde::Deserialize;
use serde_json::Value;

use crate::domain::snapshot::{IntervalBatch, LatestSample, PricePoint, Snapshot};
use crate::shared::errors::{TrackerError, TrackerResult};
use crate::shared::types::Interval;

/// Top-level response of `/assets/prices/{asset_id}?base={currency}`
#[derive(Debug, Deserialize)]
pub struct PricesEnvelope {
    pub data: Option<AssetPrices>,
    #[serde(default)]
    pub errors: Vec<ApiErrorMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ApiErrorMessage {
    pub id: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AssetPrices {
    pub base: Option<String>,
    pub currency: Option<String>,
    pub prices: Option<PriceTable>,
}

#[derive(Debug, Deserialize)]
pub struct PriceTable {
    pub latest: Option<Value>,
    pub latest_price: Option<LatestPriceWire>,
    pub hour: Option<BatchWire>,
    pub day: Option<BatchWire>,
    pub week: Option<BatchWire>,
    pub month: Option<BatchWire>,
    pub year: Option<BatchWire>,
}

impl PriceTable {
    fn batch(&self, interval: Interval) -> Option<&BatchWire> {
        match interval {
            Interval::Hour => self.hour.as_ref(),
            Interval::Day => self.day.as_ref(),
            Interval::Week => self.week.as_ref(),
            Interval::Month => self.month.as_ref(),
            Interval::Year => self.year.as_ref(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LatestPriceWire {
    pub amount: Option<AmountWire>,
    #[serde(default)]
    pub percent_change: HashMap<String, Value>,
    pub timestamp: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct AmountWire {
    pub amount: Option<Value>,
    pub currency: Option<String>,
    pub scale: Option<Value>,
}

/// `prices` holds `[price, unix_timestamp]` pairs
#[derive(Debug, Deserialize)]
pub struct BatchWire {
    pub percent_change: Option<Value>,
    pub prices: Option<Vec<Vec<Value>>>,
}

impl PricesEnvelope {
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(|e| e.message.as_str())
    }
}

/// Parse a raw response body into a snapshot
pub fn normalize(body: &str) -> TrackerResult<Snapshot> {
    let envelope: PricesEnvelope = serde_json::from_str(body)
        .map_err(|e| TrackerError::malformed(format!("invalid JSON payload: {}", e)))?;
    snapshot_from_envelope(envelope)
}

pub fn snapshot_from_envelope(envelope: PricesEnvelope) -> TrackerResult<Snapshot> {
    let PricesEnvelope { data, errors } = envelope;
    let Some(data) = data else {
        return Err(match errors.into_iter().next() {
            Some(error) => TrackerError::FetchFailure(error.message),
            None => TrackerError::malformed("missing data"),
        });
    };
    let prices = data
        .prices
        .ok_or_else(|| TrackerError::malformed("missing data.prices"))?;
    let latest_wire = prices
        .latest_price
        .as_ref()
        .ok_or_else(|| TrackerError::malformed("missing prices.latest_price"))?;

    let price = match (&prices.latest, latest_wire.amount.as_ref().and_then(|a| a.amount.as_ref())) {
        (Some(latest), _) => number(latest, "prices.latest")?,
        (None, Some(amount)) => number(amount, "latest_price.amount.amount")?,
        (None, None) => return Err(TrackerError::malformed("missing prices.latest")),
    };

    let timestamp = latest_wire
        .timestamp
        .as_ref()
        .ok_or_else(|| TrackerError::malformed("missing latest_price.timestamp"))
        .and_then(parse_timestamp)?;

    let mut percent_change = BTreeMap::new();
    let mut batches = BTreeMap::new();

    for interval in Interval::ALL {
        let change = latest_wire
            .percent_change
            .get(interval.as_str())
            .ok_or_else(|| {
                TrackerError::malformed(format!("missing latest_price.percent_change.{}", interval))
            })?;
        percent_change.insert(interval, number(change, "latest_price.percent_change")?);

        let batch = prices
            .batch(interval)
            .ok_or_else(|| TrackerError::malformed(format!("missing interval batch: {}", interval)))?;
        batches.insert(interval, batch_from_wire(interval, batch)?);
    }

    Ok(Snapshot {
        latest: LatestSample {
            timestamp,
            price,
            percent_change,
        },
        batches,
    })
}

fn batch_from_wire(interval: Interval, batch: &BatchWire) -> TrackerResult<IntervalBatch> {
    let change = batch
        .percent_change
        .as_ref()
        .ok_or_else(|| TrackerError::malformed(format!("missing {}.percent_change", interval)))?;
    let pairs = batch
        .prices
        .as_ref()
        .ok_or_else(|| TrackerError::malformed(format!("missing {}.prices", interval)))?;

    let points = pairs
        .iter()
        .map(|pair| match pair.as_slice() {
            [price, timestamp, ..] => Ok(PricePoint {
                price: number(price, "batch price")?,
                timestamp: integer(timestamp, "batch timestamp")?,
            }),
            _ => Err(TrackerError::malformed(format!(
                "{} price entry has {} element(s), expected 2",
                interval,
                pair.len()
            ))),
        })
        .collect::<TrackerResult<Vec<_>>>()?;

    Ok(IntervalBatch::new(number(change, "batch percent_change")?, points))
}

/// The provider sends decimals either as JSON numbers or strings
fn number(value: &Value, field: &str) -> TrackerResult<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| TrackerError::malformed(format!("{} is not a number: {}", field, value)))
}

/// Whole seconds only; `1614592800.0` is accepted, fractions and values
/// outside `i64` are not
fn integer(value: &Value, field: &str) -> TrackerResult<i64> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| TrackerError::malformed(format!("{} is not an integer: {}", field, value)))
}

fn parse_timestamp(value: &Value) -> TrackerResult<i64> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp())
            .map_err(|e| TrackerError::malformed(format!("bad latest_price.timestamp '{}': {}", s, e))),
        other => integer(other, "latest_price.timestamp"),
    }
}
