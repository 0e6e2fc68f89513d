use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::wire::{self, PricesEnvelope};
use super::PriceProvider;
use crate::config::ProviderCfg;
use crate::domain::snapshot::Snapshot;
use crate::shared::errors::{TrackerError, TrackerResult};

/// Coinbase public asset-price endpoint client
pub struct CoinbaseClient {
    http_client: Client,
    base_url: String,
    asset_id: String,
    currency: String,
}

impl CoinbaseClient {
    pub fn new(cfg: &ProviderCfg) -> TrackerResult<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            asset_id: cfg.asset_id.clone(),
            currency: cfg.currency.clone(),
        })
    }

    pub fn url(&self) -> String {
        format!(
            "{}/assets/prices/{}?base={}",
            self.base_url, self.asset_id, self.currency
        )
    }
}

#[async_trait]
impl PriceProvider for CoinbaseClient {
    async fn fetch_snapshot(&self) -> TrackerResult<Snapshot> {
        let url = self.url();
        debug!("Fetching prices from {}", url);

        let response = self.http_client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // error bodies look like {"errors":[{"message": ...}]}
            let message = serde_json::from_str::<PricesEnvelope>(&body)
                .ok()
                .and_then(|env| env.first_error().map(str::to_string))
                .unwrap_or_else(|| format!("HTTP {}", status));
            warn!("Price endpoint returned {}: {}", status, message);
            return Err(TrackerError::FetchFailure(message));
        }

        wire::normalize(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_layout() {
        let cfg = ProviderCfg {
            base_url: "https://www.coinbase.com/api/v2/".to_string(),
            ..ProviderCfg::default()
        };
        let client = CoinbaseClient::new(&cfg).unwrap();
        assert_eq!(
            client.url(),
            "https://www.coinbase.com/api/v2/assets/prices/d85dce9b-5b73-5c3c-8978-522ce1d1c1b4?base=CAD"
        );
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_fetch_failure() {
        let cfg = ProviderCfg {
            base_url: "http://127.0.0.1:9".to_string(),
            timeout_secs: 1,
            ..ProviderCfg::default()
        };
        let client = CoinbaseClient::new(&cfg).unwrap();
        let err = client.fetch_snapshot().await.unwrap_err();
        assert_eq!(err.kind(), "FetchFailure");
    }
}
