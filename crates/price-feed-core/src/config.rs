use std::collections::BTreeMap;

use crate::error::FeedError;
use crate::retention::RetentionPolicy;
use crate::timeframe::Timeframe;

pub const DEFAULT_MAX_CANDLES: usize = 100;
pub const DEFAULT_HISTORY_WINDOW_MS: i64 = 24 * 60 * 60 * 1000;
pub const DEFAULT_HISTORY_MARGIN_MS: i64 = 60_000;
pub const DEFAULT_SAVE_INTERVAL_MS: i64 = 60_000;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

/// Per-deployment engine parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedConfig {
    /// Configured timeframes, sorted and deduplicated.
    pub timeframes: Vec<Timeframe>,
    pub max_candles: usize,
    /// Maximum candle age per timeframe; timeframes absent here are count-capped only.
    pub max_age_ms: BTreeMap<Timeframe, i64>,
    pub history_window_ms: i64,
    pub history_margin_ms: i64,
    /// Minimum time between successful snapshot saves.
    pub save_interval_ms: i64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            timeframes: vec![
                Timeframe::M5,
                Timeframe::M15,
                Timeframe::M30,
                Timeframe::H1,
                Timeframe::H24,
            ],
            max_candles: DEFAULT_MAX_CANDLES,
            max_age_ms: default_max_ages(),
            history_window_ms: DEFAULT_HISTORY_WINDOW_MS,
            history_margin_ms: DEFAULT_HISTORY_MARGIN_MS,
            save_interval_ms: DEFAULT_SAVE_INTERVAL_MS,
        }
    }
}

fn default_max_ages() -> BTreeMap<Timeframe, i64> {
    BTreeMap::from([
        (Timeframe::H1, 7 * DAY_MS),
        (Timeframe::H24, 30 * DAY_MS),
        (Timeframe::W1, 730 * DAY_MS),
        (Timeframe::Mo1, 3650 * DAY_MS),
    ])
}

impl FeedConfig {
    /// Default settings with a different timeframe set.
    pub fn with_timeframes(timeframes: impl IntoIterator<Item = Timeframe>) -> Self {
        let mut timeframes: Vec<Timeframe> = timeframes.into_iter().collect();
        timeframes.sort();
        timeframes.dedup();
        Self {
            timeframes,
            ..Self::default()
        }
    }

    pub fn is_configured(&self, timeframe: Timeframe) -> bool {
        self.timeframes.contains(&timeframe)
    }

    /// Parse a query token and require the timeframe to be part of this deployment.
    pub fn resolve(&self, token: &str) -> Result<Timeframe, FeedError> {
        let timeframe = Timeframe::parse(token)?;
        if !self.is_configured(timeframe) {
            return Err(FeedError::TimeframeNotConfigured(timeframe));
        }
        Ok(timeframe)
    }

    pub fn retention_policy(&self, timeframe: Timeframe) -> RetentionPolicy {
        RetentionPolicy {
            max_candles: self.max_candles,
            max_age_ms: self.max_age_ms.get(&timeframe).copied(),
        }
    }
}
