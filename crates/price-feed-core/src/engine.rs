use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregator::CandleAggregator;
use crate::backfill;
use crate::candle::{Candle, Tick};
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::history::HistoryBuffer;
use crate::query::{self, CandleQuery, Stats};
use crate::retention::{Evicted, RetentionManager};
use crate::snapshot::{Snapshot, SnapshotStore};
use crate::timeframe::Timeframe;

/// Owns the tick history, one candle series per configured timeframe, and the
/// latest-price metadata.
///
/// All mutation goes through [`FeedEngine::ingest`] (and boot-time reconciliation),
/// which leaves every series consistent before returning. Callers sharing an engine
/// across tasks should hold an exclusive lock for each ingest and a shared lock for
/// queries.
#[derive(Debug, Clone)]
pub struct FeedEngine {
    config: FeedConfig,
    retention: RetentionManager,
    history: HistoryBuffer,
    series: BTreeMap<Timeframe, CandleAggregator>,
    latest_price: Option<f64>,
    last_updated: Option<i64>,
    last_saved: Option<i64>,
}

/// Point-in-time summary of an engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub latest_price: Option<f64>,
    pub last_updated: Option<i64>,
    pub history_len: usize,
    pub candles: BTreeMap<Timeframe, usize>,
}

impl FeedEngine {
    /// Empty engine with one series per configured timeframe.
    pub fn new(config: FeedConfig) -> Self {
        let history = HistoryBuffer::new(config.history_window_ms, config.history_margin_ms);
        let series = config
            .timeframes
            .iter()
            .map(|&tf| (tf, CandleAggregator::new(tf)))
            .collect();
        Self {
            retention: RetentionManager::from_config(&config),
            config,
            history,
            series,
            latest_price: None,
            last_updated: None,
            last_saved: None,
        }
    }

    /// Restore state from a snapshot. Series for timeframes outside this deployment,
    /// or with unrecognised names, are dropped. A series that breaks the candle
    /// invariants is loaded empty so that reconciliation rebuilds it from history.
    pub fn from_snapshot(config: FeedConfig, snapshot: Snapshot) -> Self {
        let mut engine = Self::new(config);
        let mut history = snapshot.history;
        if history.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
            warn!("snapshot history is out of order, sorting {} tick(s)", history.len());
            history.sort_by_key(|t| t.timestamp);
        }
        engine.history = HistoryBuffer::from_ticks(
            history,
            engine.config.history_window_ms,
            engine.config.history_margin_ms,
        );
        engine.latest_price = snapshot.latest_price;
        engine.last_updated = snapshot.last_updated;

        for (name, candles) in snapshot.ohlc {
            match Timeframe::parse(&name) {
                Ok(tf) if engine.config.is_configured(tf) => {
                    let mut aggregator = CandleAggregator::with_candles(tf, candles);
                    if let Err(reason) = aggregator.validate() {
                        warn!("{tf}: discarding persisted series, {reason}");
                        aggregator = CandleAggregator::new(tf);
                    }
                    engine.series.insert(tf, aggregator);
                }
                Ok(tf) => {
                    debug!("{tf}: not configured, dropping {} candle(s)", candles.len());
                }
                Err(_) => warn!("unknown timeframe '{name}' in snapshot, ignoring"),
            }
        }
        engine
    }

    /// Load the persisted state (or start empty), then backfill and apply retention.
    ///
    /// A missing snapshot is initialised and saved; a failed load is logged and the
    /// engine starts empty without overwriting what is on disk.
    pub fn boot(config: FeedConfig, store: &dyn SnapshotStore, now_ms: i64) -> Self {
        let mut engine = match store.load() {
            Ok(Some(snapshot)) => {
                info!(
                    "loaded snapshot: {} tick(s), {} series",
                    snapshot.history.len(),
                    snapshot.ohlc.len()
                );
                Self::from_snapshot(config, snapshot)
            }
            Ok(None) => {
                info!("no snapshot found, initialising empty state");
                let mut engine = Self::new(config);
                if let Err(e) = engine.persist(store, now_ms) {
                    warn!("failed to save initial snapshot: {e}");
                }
                engine
            }
            Err(e) => {
                warn!("failed to load snapshot, starting empty: {e}");
                Self::new(config)
            }
        };
        engine.reconcile(now_ms);
        engine
    }

    /// Rebuild under-populated series from history, then enforce retention.
    pub fn reconcile(&mut self, now_ms: i64) -> Vec<Timeframe> {
        let rebuilt =
            backfill::reconcile(&self.config.timeframes, &mut self.series, &self.history);
        self.retention
            .enforce(&mut self.history, &mut self.series, now_ms);
        rebuilt
    }

    /// One ingestion step: record the tick, update every series, evict.
    ///
    /// Non-finite prices are rejected before any state changes.
    pub fn ingest(&mut self, price: f64, now_ms: i64) -> Result<Evicted, FeedError> {
        if !price.is_finite() {
            return Err(FeedError::InvalidData(format!("non-finite price: {price}")));
        }

        self.history.append(Tick::new(price, now_ms));
        for aggregator in self.series.values_mut() {
            if aggregator.update(price, now_ms) {
                debug!("{}: opened candle", aggregator.timeframe());
            }
        }
        self.latest_price = Some(price);
        self.last_updated = Some(now_ms);

        let evicted = self
            .retention
            .enforce(&mut self.history, &mut self.series, now_ms);
        if evicted.ticks > 0 || !evicted.candles.is_empty() {
            debug!(
                "evicted {} tick(s), {} candle(s)",
                evicted.ticks,
                evicted.total_candles()
            );
        }
        Ok(evicted)
    }

    /// Owned copy of the current state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            latest_price: self.latest_price,
            last_updated: self.last_updated,
            history: self.history.to_vec(),
            ohlc: self
                .series
                .iter()
                .map(|(tf, agg)| (tf.name().to_string(), agg.candles().to_vec()))
                .collect(),
        }
    }

    /// True when no save has succeeded yet or the save interval has elapsed since
    /// the last successful one.
    pub fn save_due(&self, now_ms: i64) -> bool {
        self.last_saved
            .is_none_or(|saved| now_ms - saved >= self.config.save_interval_ms)
    }

    pub fn mark_saved(&mut self, now_ms: i64) {
        self.last_saved = Some(now_ms);
    }

    pub fn last_saved(&self) -> Option<i64> {
        self.last_saved
    }

    /// Save unconditionally and record the save time on success.
    pub fn persist(&mut self, store: &dyn SnapshotStore, now_ms: i64) -> Result<(), FeedError> {
        store.save(&self.snapshot())?;
        self.mark_saved(now_ms);
        Ok(())
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn series(&self, timeframe: Timeframe) -> Option<&CandleAggregator> {
        self.series.get(&timeframe)
    }

    pub fn latest(&self) -> Option<Tick> {
        self.latest_price
            .zip(self.last_updated)
            .map(|(price, timestamp)| Tick::new(price, timestamp))
    }

    /// Candles for a validated query. A bounded query with no matches is `NoData`.
    pub fn candles(&self, query: &CandleQuery) -> Result<Vec<Candle>, FeedError> {
        let series = self
            .series
            .get(&query.timeframe)
            .ok_or(FeedError::TimeframeNotConfigured(query.timeframe))?;
        let candles = query::filter_candles(series.candles(), query.from, query.to);
        if candles.is_empty() && query.is_bounded() {
            return Err(FeedError::NoData {
                timeframe: query.timeframe,
            });
        }
        Ok(candles)
    }

    /// Parse raw request parameters and run the candle query.
    pub fn query_candles(
        &self,
        timeframe: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Vec<Candle>, FeedError> {
        let query = CandleQuery::parse(&self.config, timeframe, from, to)?;
        self.candles(&query)
    }

    /// Every configured series, unfiltered.
    pub fn all_candles(&self) -> BTreeMap<Timeframe, Vec<Candle>> {
        self.series
            .iter()
            .map(|(tf, agg)| (*tf, agg.candles().to_vec()))
            .collect()
    }

    pub fn sample(
        &self,
        window_minutes: i64,
        limit: usize,
        now_ms: i64,
    ) -> Result<Vec<Tick>, FeedError> {
        query::sample(&self.history, window_minutes, limit, now_ms)
    }

    /// Raw ticks in `[from, to]` with summary statistics.
    pub fn history_range(
        &self,
        from: Option<i64>,
        to: Option<i64>,
    ) -> Result<(Vec<Tick>, Stats), FeedError> {
        query::check_range(from, to)?;
        let ticks = self.history.range(from, to);
        let stats = Stats::of(&ticks);
        Ok((ticks, stats))
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            latest_price: self.latest_price,
            last_updated: self.last_updated,
            history_len: self.history.len(),
            candles: self
                .series
                .iter()
                .map(|(tf, agg)| (*tf, agg.len()))
                .collect(),
        }
    }
}
