use crate::candle::Candle;
use crate::timeframe::Timeframe;

/// Incremental candle builder for one timeframe.
///
/// The series is append-only apart from its last candle, which absorbs ticks until
/// its bucket has elapsed. Ticks are expected in non-decreasing timestamp order; an
/// older tick is folded into the current tail rather than reordered.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleAggregator {
    timeframe: Timeframe,
    candles: Vec<Candle>,
}

impl CandleAggregator {
    pub fn new(timeframe: Timeframe) -> Self {
        Self {
            timeframe,
            candles: Vec::new(),
        }
    }

    pub fn with_candles(timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        Self { timeframe, candles }
    }

    pub fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    /// Fold one tick into the series. Returns `true` if a new candle was opened.
    ///
    /// Skipped buckets are not filled: a tick after a gap opens exactly one candle
    /// at its own bucket.
    pub fn update(&mut self, price: f64, timestamp: i64) -> bool {
        let duration = self.timeframe.duration_ms();
        if let Some(last) = self.candles.last_mut()
            && timestamp < last.timestamp + duration
        {
            last.fold(price);
            return false;
        }

        let bucket_start = self.timeframe.bucket_start(timestamp);
        self.candles.push(Candle::open_at(bucket_start, price));
        true
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Check the series invariants: bucket-aligned starts, strictly increasing,
    /// `low <= open, close <= high` and at least one tick per candle.
    pub fn validate(&self) -> Result<(), String> {
        let duration = self.timeframe.duration_ms();
        for (i, c) in self.candles.iter().enumerate() {
            if c.timestamp.rem_euclid(duration) != 0 {
                return Err(format!("candle {i} at {} is not bucket-aligned", c.timestamp));
            }
            if !(c.low <= c.open && c.open <= c.high && c.low <= c.close && c.close <= c.high) {
                return Err(format!("candle {i} at {} has inconsistent OHLC", c.timestamp));
            }
            if c.volume < 1 {
                return Err(format!("candle {i} at {} has volume {}", c.timestamp, c.volume));
            }
        }
        if let Some(i) = self
            .candles
            .windows(2)
            .position(|w| w[1].timestamp <= w[0].timestamp)
        {
            return Err(format!("candle {} does not follow candle {i}", i + 1));
        }
        Ok(())
    }

    /// Keep only the newest `max` candles. Returns the number dropped.
    pub fn keep_last(&mut self, max: usize) -> usize {
        let excess = self.candles.len().saturating_sub(max);
        self.candles.drain(..excess);
        excess
    }

    /// Drop candles whose bucket starts before `cutoff`. Returns the number dropped.
    pub fn drop_before(&mut self, cutoff: i64) -> usize {
        let before = self.candles.len();
        self.candles.retain(|c| c.timestamp >= cutoff);
        before - self.candles.len()
    }
}
