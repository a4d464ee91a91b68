pub mod aggregator;
pub mod backfill;
pub mod candle;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod history;
pub mod query;
pub mod retention;
pub mod snapshot;
pub mod timeframe;

pub use candle::{Candle, Tick};
pub use config::FeedConfig;
pub use engine::FeedEngine;
pub use error::FeedError;
pub use timeframe::Timeframe;
