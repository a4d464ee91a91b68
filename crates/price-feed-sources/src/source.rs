use async_trait::async_trait;

use crate::error::SourceError;

/// Something that can produce the current price on demand.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Source name (for logging/display).
    fn name(&self) -> &str;

    /// Fetch one price. Implementations should fail fast; the caller applies its own
    /// timeout as well.
    async fn fetch_price(&self) -> Result<f64, SourceError>;
}

/// Accept only finite, strictly positive prices.
pub fn validate_price(price: f64) -> Result<f64, SourceError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(SourceError::InvalidPrice(price))
    }
}
