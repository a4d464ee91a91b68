//! Startup reconciliation of candle series against the tick history.
//!
//! The history only spans about a day, so week and month series cannot be
//! reconstructed beyond that horizon; they fill in as new ticks arrive.

use std::collections::BTreeMap;

use tracing::info;

use crate::aggregator::CandleAggregator;
use crate::history::HistoryBuffer;
use crate::timeframe::Timeframe;

/// Series shorter than this are rebuilt from history.
pub const MIN_CANDLES: usize = 2;

/// Replay every tick of `history`, in stored order, into a fresh series.
pub fn rebuild(timeframe: Timeframe, history: &HistoryBuffer) -> CandleAggregator {
    let mut aggregator = CandleAggregator::new(timeframe);
    for tick in history.iter() {
        aggregator.update(tick.price, tick.timestamp);
    }
    aggregator
}

/// Rebuild every configured series holding fewer than [`MIN_CANDLES`] candles,
/// creating missing ones. Returns the timeframes that were rebuilt.
pub fn reconcile(
    timeframes: &[Timeframe],
    series: &mut BTreeMap<Timeframe, CandleAggregator>,
    history: &HistoryBuffer,
) -> Vec<Timeframe> {
    let mut rebuilt = Vec::new();
    for &timeframe in timeframes {
        let existing = series.get(&timeframe).map_or(0, CandleAggregator::len);
        if existing >= MIN_CANDLES {
            continue;
        }

        let aggregator = rebuild(timeframe, history);
        info!(
            "{timeframe}: rebuilt {} candle(s) from {} tick(s) (had {existing})",
            aggregator.len(),
            history.len(),
        );
        series.insert(timeframe, aggregator);
        rebuilt.push(timeframe);
    }
    rebuilt
}
