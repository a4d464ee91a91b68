use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::error::SourceError;
use crate::source::{PriceSource, validate_price};

pub const DEFAULT_POINTER: &str = "/price";

/// Polls a JSON endpoint and reads the price at a JSON pointer
/// (e.g. `/data/amount`). The value may be a number or a numeric string.
pub struct HttpJsonSource {
    client: Client,
    url: String,
    pointer: String,
}

impl HttpJsonSource {
    pub fn new(url: impl Into<String>, pointer: impl Into<String>) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(concat!("price-feed/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
            pointer: pointer.into(),
        })
    }

    /// Create from `PRICE_FEED_URL` and optional `PRICE_FEED_POINTER`.
    pub fn from_env() -> Result<Self, SourceError> {
        let url = std::env::var("PRICE_FEED_URL")
            .map_err(|_| SourceError::Config("PRICE_FEED_URL not set".into()))?;
        let pointer =
            std::env::var("PRICE_FEED_POINTER").unwrap_or_else(|_| DEFAULT_POINTER.to_string());
        Self::new(url, pointer)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Read a price out of a JSON document.
pub fn extract_price(body: &Value, pointer: &str) -> Result<f64, SourceError> {
    let value = body
        .pointer(pointer)
        .ok_or_else(|| SourceError::Parse(format!("no value at '{pointer}'")))?;

    let price = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| SourceError::Parse(format!("'{n}' is not representable as f64")))?,
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|e| SourceError::Parse(format!("invalid price '{s}': {e}")))?,
        other => {
            return Err(SourceError::Parse(format!(
                "expected number at '{pointer}', got {other}"
            )));
        }
    };
    validate_price(price)
}

#[async_trait]
impl PriceSource for HttpJsonSource {
    fn name(&self) -> &str {
        "http-json"
    }

    async fn fetch_price(&self) -> Result<f64, SourceError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SourceError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        extract_price(&body, &self.pointer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_nested_number() {
        let body = json!({"data": {"base": "ETH", "amount": 3021.17}});
        assert_eq!(extract_price(&body, "/data/amount").unwrap(), 3021.17);
    }

    #[test]
    fn extracts_numeric_string() {
        let body = json!({"price": " 0.000412 "});
        assert_eq!(extract_price(&body, DEFAULT_POINTER).unwrap(), 0.000412);
    }

    #[test]
    fn extracts_from_array_index() {
        let body = json!({"result": [{"p": 7}, {"p": 8}]});
        assert_eq!(extract_price(&body, "/result/1/p").unwrap(), 8.0);
    }

    #[test]
    fn missing_pointer_is_parse_error() {
        let body = json!({"price": 1.0});
        assert!(matches!(
            extract_price(&body, "/data/amount"),
            Err(SourceError::Parse(_))
        ));
    }

    #[test]
    fn non_numeric_values_are_rejected() {
        assert!(extract_price(&json!({"price": null}), "/price").is_err());
        assert!(extract_price(&json!({"price": "n/a"}), "/price").is_err());
        assert!(matches!(
            extract_price(&json!({"price": 0}), "/price"),
            Err(SourceError::InvalidPrice(_))
        ));
    }

    #[test]
    fn new_keeps_url() {
        let source = HttpJsonSource::new("http://localhost:9/price", "/price").unwrap();
        assert_eq!(source.url(), "http://localhost:9/price");
        assert_eq!(source.name(), "http-json");
    }
}
