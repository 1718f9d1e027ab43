//! HTTP price feed client
//!
//! Thin reqwest wrapper over a price API exposing
//! `GET {base}/price/{token_address}`. Any transport, decode or bogus-value
//! failure maps to `PriceUnavailable`; staleness handling happens upstream.

use crate::domain::price::PriceSource;
use crate::shared::errors::ReadError;
use crate::shared::types::TokenInfo;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct PriceResponse {
    price: f64,
}

pub struct HttpPriceSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPriceSource {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl PriceSource for HttpPriceSource {
    async fn spot_price(&self, token: &TokenInfo) -> Result<f64, ReadError> {
        let url = format!("{}/price/{}", self.base_url, token.address);
        debug!("fetching price for {} from {}", token.symbol, url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ReadError::PriceUnavailable(format!("{}: {}", token.symbol, e)))?;

        if !response.status().is_success() {
            return Err(ReadError::PriceUnavailable(format!(
                "{}: HTTP {}",
                token.symbol,
                response.status()
            )));
        }

        let body: PriceResponse = response
            .json()
            .await
            .map_err(|e| ReadError::PriceUnavailable(format!("{}: bad payload: {}", token.symbol, e)))?;

        if !body.price.is_finite() || body.price <= 0.0 {
            return Err(ReadError::PriceUnavailable(format!(
                "{}: non-positive price {}",
                token.symbol, body.price
            )));
        }

        Ok(body.price)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_normalization() {
        let source = HttpPriceSource::new("http://localhost:9000/");
        assert_eq!(source.base_url, "http://localhost:9000");
    }

    #[test]
    fn test_price_payload_decoding() {
        let body: PriceResponse = serde_json::from_str(r#"{"price": 1.25}"#).unwrap();
        assert_eq!(body.price, 1.25);

        let extra: PriceResponse =
            serde_json::from_str(r#"{"price": 0.5, "source": "aggregate"}"#).unwrap();
        assert_eq!(extra.price, 0.5);
    }
}
