use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single raw price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub price: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl Tick {
    pub fn new(price: f64, timestamp: i64) -> Self {
        Self { price, timestamp }
    }
}

/// An OHLCV candle for one timeframe bucket.
///
/// `timestamp` is the bucket start in milliseconds; `volume` counts the ticks
/// folded into the candle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl Candle {
    /// Open a fresh candle from the first tick of a bucket.
    pub fn open_at(bucket_start: i64, price: f64) -> Self {
        Self {
            timestamp: bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 1,
        }
    }

    /// Fold another tick into this candle.
    pub fn fold(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += 1;
    }

    /// Bucket start as a UTC datetime, if representable.
    pub fn opened_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_tracks_extremes_and_close() {
        let mut candle = Candle::open_at(0, 10.0);
        candle.fold(12.0);
        candle.fold(9.0);

        assert_eq!(candle.open, 10.0);
        assert_eq!(candle.high, 12.0);
        assert_eq!(candle.low, 9.0);
        assert_eq!(candle.close, 9.0);
        assert_eq!(candle.volume, 3);
    }

    #[test]
    fn serializes_with_timestamp_field() {
        let candle = Candle::open_at(300_000, 20.0);
        let json = serde_json::to_value(&candle).unwrap();
        assert_eq!(json["timestamp"], 300_000);
        assert_eq!(json["volume"], 1);
    }

    #[test]
    fn opened_at_converts_millis() {
        let candle = Candle::open_at(1_736_942_400_000, 1.0);
        let dt = candle.opened_at().unwrap();
        assert_eq!(dt.timestamp_millis(), 1_736_942_400_000);
    }
}
