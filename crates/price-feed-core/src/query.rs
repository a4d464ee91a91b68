//! Read-only queries over the tick history and candle series.

use serde::Serialize;

use crate::candle::{Candle, Tick};
use crate::config::FeedConfig;
use crate::error::FeedError;
use crate::history::HistoryBuffer;
use crate::timeframe::Timeframe;

pub const DEFAULT_SAMPLE_LIMIT: usize = 10;

/// Sample windows at least this long fall back to the whole history when empty.
pub const LONG_WINDOW_MINUTES: i64 = 10_080;

/// A validated candle-series request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandleQuery {
    pub timeframe: Timeframe,
    pub from: Option<i64>,
    pub to: Option<i64>,
}

impl CandleQuery {
    /// Validate raw request parameters against a deployment.
    pub fn parse(
        config: &FeedConfig,
        timeframe: &str,
        from: Option<&str>,
        to: Option<&str>,
    ) -> Result<Self, FeedError> {
        let timeframe = config.resolve(timeframe)?;
        let (from, to) = parse_range(from, to)?;
        Ok(Self { timeframe, from, to })
    }

    pub fn is_bounded(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }
}

/// Parse optional millisecond bounds and require `from <= to` when both are set.
pub fn parse_range(
    from: Option<&str>,
    to: Option<&str>,
) -> Result<(Option<i64>, Option<i64>), FeedError> {
    let from = from.map(parse_timestamp).transpose()?;
    let to = to.map(parse_timestamp).transpose()?;
    check_range(from, to)?;
    Ok((from, to))
}

pub fn check_range(from: Option<i64>, to: Option<i64>) -> Result<(), FeedError> {
    if let (Some(from), Some(to)) = (from, to)
        && from > to
    {
        return Err(FeedError::InvalidRange { from, to });
    }
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<i64, FeedError> {
    raw.trim()
        .parse()
        .map_err(|_| FeedError::InvalidTimestamp(raw.to_string()))
}

/// Candles whose bucket start lies in `[from, to]`. Never sampled.
pub fn filter_candles(candles: &[Candle], from: Option<i64>, to: Option<i64>) -> Vec<Candle> {
    candles
        .iter()
        .filter(|c| from.is_none_or(|f| c.timestamp >= f))
        .filter(|c| to.is_none_or(|end| c.timestamp <= end))
        .cloned()
        .collect()
}

/// Fixed-stride downsampling that always keeps the newest point.
///
/// With `n > limit` points, returns indices `0, step, .., (limit - 2) * step` where
/// `step = n / limit`, followed by the last point.
pub fn downsample(points: &[Tick], limit: usize) -> Result<Vec<Tick>, FeedError> {
    if limit == 0 {
        return Err(FeedError::InvalidLimit(limit));
    }
    let n = points.len();
    if n <= limit {
        return Ok(points.to_vec());
    }

    let step = n / limit;
    let mut sampled: Vec<Tick> = (0..limit - 1).map(|i| points[i * step]).collect();
    sampled.push(points[n - 1]);
    Ok(sampled)
}

/// Recent raw samples over the last `window_minutes`, downsampled to `limit` points.
pub fn sample(
    history: &HistoryBuffer,
    window_minutes: i64,
    limit: usize,
    now_ms: i64,
) -> Result<Vec<Tick>, FeedError> {
    let cutoff = now_ms.saturating_sub(window_minutes.saturating_mul(60_000));
    let mut points = history.since(cutoff);
    if points.is_empty() && window_minutes >= LONG_WINDOW_MINUTES {
        points = history.to_vec();
    }
    downsample(&points, limit)
}

/// Summary statistics over a set of ticks. An empty set is all zeros.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Stats {
    pub count: usize,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl Stats {
    pub fn of(ticks: &[Tick]) -> Self {
        if ticks.is_empty() {
            return Self::default();
        }

        let (sum, min, max) = ticks.iter().fold(
            (0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(sum, min, max), t| (sum + t.price, min.min(t.price), max.max(t.price)),
        );
        Self {
            count: ticks.len(),
            avg: sum / ticks.len() as f64,
            min,
            max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: i64 = 86_400_000;

    fn ticks(n: usize) -> Vec<Tick> {
        (0..n)
            .map(|i| Tick::new(i as f64, i as i64 * 1000))
            .collect()
    }

    fn history_of(points: &[Tick]) -> HistoryBuffer {
        HistoryBuffer::from_ticks(points.to_vec(), DAY, 60_000)
    }

    #[test]
    fn downsample_short_input_is_unchanged() {
        let points = ticks(10);
        assert_eq!(downsample(&points, 10).unwrap(), points);
        assert_eq!(downsample(&points[..3], 10).unwrap(), points[..3].to_vec());
    }

    #[test]
    fn downsample_37_points_keeps_last() {
        let points = ticks(37);
        let sampled = downsample(&points, 10).unwrap();

        assert_eq!(sampled.len(), 10);
        let prices: Vec<f64> = sampled.iter().map(|t| t.price).collect();
        assert_eq!(
            prices,
            vec![0.0, 3.0, 6.0, 9.0, 12.0, 15.0, 18.0, 21.0, 24.0, 36.0]
        );
        assert_ne!(sampled[9], points[27]);
    }

    #[test]
    fn downsample_last_point_even_when_stride_lands_on_it() {
        let points = ticks(20);
        let sampled = downsample(&points, 10).unwrap();
        assert_eq!(sampled.len(), 10);
        assert_eq!(sampled[8].price, 16.0);
        assert_eq!(sampled[9].price, 19.0);
    }

    #[test]
    fn downsample_limit_one_returns_newest() {
        let sampled = downsample(&ticks(5), 1).unwrap();
        assert_eq!(sampled, vec![Tick::new(4.0, 4000)]);
    }

    #[test]
    fn downsample_rejects_zero_limit() {
        assert!(matches!(
            downsample(&ticks(5), 0),
            Err(FeedError::InvalidLimit(0))
        ));
    }

    #[test]
    fn sample_filters_by_window() {
        let now = 10 * 60_000;
        let points: Vec<Tick> = (0..=10).map(|m| Tick::new(m as f64, m * 60_000)).collect();
        let history = history_of(&points);

        let sampled = sample(&history, 3, 10, now).unwrap();
        let prices: Vec<f64> = sampled.iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![7.0, 8.0, 9.0, 10.0]);
    }

    #[test]
    fn long_window_falls_back_to_whole_history() {
        let points = vec![Tick::new(1.0, 0), Tick::new(2.0, 1000)];
        let history = history_of(&points);
        // Both points are older than a week relative to `now`.
        let now = 30 * DAY;

        assert_eq!(sample(&history, LONG_WINDOW_MINUTES, 10, now).unwrap(), points);
        assert!(sample(&history, LONG_WINDOW_MINUTES - 1, 10, now)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn huge_window_saturates_instead_of_overflowing() {
        let points = vec![Tick::new(1.0, 0), Tick::new(2.0, 1000)];
        let history = history_of(&points);

        let sampled = sample(&history, i64::MAX / 1000, 10, 2_000).unwrap();
        assert_eq!(sampled, points);
        assert_eq!(sample(&history, i64::MAX, 10, 2_000).unwrap(), points);
    }

    #[test]
    fn stats_over_ticks() {
        let stats = Stats::of(&[Tick::new(10.0, 0), Tick::new(12.0, 1), Tick::new(8.0, 2)]);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.avg, 10.0);
        assert_eq!(stats.min, 8.0);
        assert_eq!(stats.max, 12.0);
    }

    #[test]
    fn stats_empty_is_zero() {
        assert_eq!(
            Stats::of(&[]),
            Stats {
                count: 0,
                avg: 0.0,
                min: 0.0,
                max: 0.0,
            }
        );
    }

    #[test]
    fn filter_candles_inclusive_bounds() {
        let candles: Vec<Candle> = (0..5)
            .map(|i| Candle::open_at(i * 300_000, i as f64))
            .collect();

        assert_eq!(
            filter_candles(&candles, Some(300_000), Some(900_000)).len(),
            3
        );
        assert_eq!(filter_candles(&candles, None, Some(0)).len(), 1);
        assert_eq!(filter_candles(&candles, None, None).len(), 5);
    }

    #[test]
    fn parse_rejects_inverted_range() {
        let config = FeedConfig::default();
        for token in ["5m", "1h", "24h"] {
            assert!(matches!(
                CandleQuery::parse(&config, token, Some("2000"), Some("1000")),
                Err(FeedError::InvalidRange {
                    from: 2000,
                    to: 1000
                })
            ));
        }
    }

    #[test]
    fn parse_rejects_non_numeric_timestamp() {
        let config = FeedConfig::default();
        assert!(matches!(
            CandleQuery::parse(&config, "5m", Some("yesterday"), None),
            Err(FeedError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn parse_resolves_aliases() {
        let config = FeedConfig::with_timeframes([Timeframe::M5, Timeframe::H12]);
        let query = CandleQuery::parse(&config, "12", None, Some("5000")).unwrap();
        assert_eq!(query.timeframe, Timeframe::H12);
        assert_eq!(query.to, Some(5000));
        assert!(query.is_bounded());

        assert!(matches!(
            CandleQuery::parse(&config, "7m", None, None),
            Err(FeedError::UnknownTimeframe(_))
        ));
    }
}
