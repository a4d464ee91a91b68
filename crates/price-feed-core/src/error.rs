use thiserror::Error;

use crate::timeframe::Timeframe;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Unknown timeframe: {0}")]
    UnknownTimeframe(String),

    #[error("Timeframe {0} is not configured")]
    TimeframeNotConfigured(Timeframe),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Invalid range: from {from} is after to {to}")]
    InvalidRange { from: i64, to: i64 },

    #[error("Invalid limit: {0}")]
    InvalidLimit(usize),

    #[error("No data found for {timeframe} in the requested range")]
    NoData { timeframe: Timeframe },

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl FeedError {
    /// True for structurally invalid queries, as opposed to I/O failures or an
    /// empty-but-valid result.
    pub fn is_invalid_query(&self) -> bool {
        matches!(
            self,
            FeedError::UnknownTimeframe(_)
                | FeedError::TimeframeNotConfigured(_)
                | FeedError::InvalidTimestamp(_)
                | FeedError::InvalidRange { .. }
                | FeedError::InvalidLimit(_)
        )
    }
}
