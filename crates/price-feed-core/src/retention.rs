use std::collections::BTreeMap;

use crate::aggregator::CandleAggregator;
use crate::config::FeedConfig;
use crate::history::HistoryBuffer;
use crate::timeframe::Timeframe;

/// Eviction limits for one candle series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_candles: usize,
    pub max_age_ms: Option<i64>,
}

impl RetentionPolicy {
    /// Count cap first, then age cap. Returns the number of candles dropped.
    pub fn apply(&self, series: &mut CandleAggregator, now_ms: i64) -> usize {
        let mut dropped = series.keep_last(self.max_candles);
        if let Some(max_age) = self.max_age_ms {
            dropped += series.drop_before(now_ms - max_age);
        }
        dropped
    }
}

/// What a retention pass removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evicted {
    pub ticks: usize,
    pub candles: BTreeMap<Timeframe, usize>,
}

impl Evicted {
    pub fn total_candles(&self) -> usize {
        self.candles.values().sum()
    }
}

/// Applies count and age caps to every series and trims the tick history.
#[derive(Debug, Clone)]
pub struct RetentionManager {
    policies: BTreeMap<Timeframe, RetentionPolicy>,
}

impl RetentionManager {
    pub fn from_config(config: &FeedConfig) -> Self {
        Self {
            policies: config
                .timeframes
                .iter()
                .map(|&tf| (tf, config.retention_policy(tf)))
                .collect(),
        }
    }

    pub fn enforce(
        &self,
        history: &mut HistoryBuffer,
        series: &mut BTreeMap<Timeframe, CandleAggregator>,
        now_ms: i64,
    ) -> Evicted {
        let mut evicted = Evicted {
            ticks: history.trim(now_ms),
            ..Evicted::default()
        };
        for (timeframe, aggregator) in series.iter_mut() {
            if let Some(policy) = self.policies.get(timeframe) {
                let dropped = policy.apply(aggregator, now_ms);
                if dropped > 0 {
                    evicted.candles.insert(*timeframe, dropped);
                }
            }
        }
        evicted
    }
}
