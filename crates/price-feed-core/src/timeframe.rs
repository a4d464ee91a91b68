use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::FeedError;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// Candle bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "12h")]
    H12,
    #[serde(rename = "24h")]
    H24,
    #[serde(rename = "1w")]
    W1,
    /// Fixed 30-day month.
    #[serde(rename = "1M")]
    Mo1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 8] = [
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::H12,
        Timeframe::H24,
        Timeframe::W1,
        Timeframe::Mo1,
    ];

    pub fn duration_ms(&self) -> i64 {
        match self {
            Timeframe::M5 => 5 * MINUTE_MS,
            Timeframe::M15 => 15 * MINUTE_MS,
            Timeframe::M30 => 30 * MINUTE_MS,
            Timeframe::H1 => HOUR_MS,
            Timeframe::H12 => 12 * HOUR_MS,
            Timeframe::H24 => DAY_MS,
            Timeframe::W1 => 7 * DAY_MS,
            Timeframe::Mo1 => 30 * DAY_MS,
        }
    }

    /// Canonical name, also used as the snapshot map key.
    pub fn name(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H12 => "12h",
            Timeframe::H24 => "24h",
            Timeframe::W1 => "1w",
            Timeframe::Mo1 => "1M",
        }
    }

    /// Start of the bucket containing `timestamp` (floor, also for pre-epoch values).
    pub fn bucket_start(&self, timestamp: i64) -> i64 {
        let duration = self.duration_ms();
        timestamp.div_euclid(duration) * duration
    }

    /// Resolve a query token. Accepts minute counts, short names and long names.
    /// Matching is case-sensitive so that `1M` (month) never aliases a minute token.
    pub fn parse(token: &str) -> Result<Self, FeedError> {
        let tf = match token.trim() {
            "5" | "5m" => Timeframe::M5,
            "15" | "15m" => Timeframe::M15,
            "30" | "30m" => Timeframe::M30,
            "60" | "1" | "1h" | "hour" => Timeframe::H1,
            "720" | "12" | "12h" => Timeframe::H12,
            "1440" | "24" | "24h" | "1d" | "day" => Timeframe::H24,
            "10080" | "1w" | "week" => Timeframe::W1,
            "43200" | "1M" | "month" => Timeframe::Mo1,
            other => return Err(FeedError::UnknownTimeframe(other.to_string())),
        };
        Ok(tf)
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Timeframe {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Timeframe::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minute_tokens() {
        assert_eq!(Timeframe::parse("5").unwrap(), Timeframe::M5);
        assert_eq!(Timeframe::parse("60").unwrap(), Timeframe::H1);
        assert_eq!(Timeframe::parse("1440").unwrap(), Timeframe::H24);
        assert_eq!(Timeframe::parse("720").unwrap(), Timeframe::H12);
    }

    #[test]
    fn parse_hour_shorthand() {
        assert_eq!(Timeframe::parse("1").unwrap(), Timeframe::H1);
        assert_eq!(Timeframe::parse("12").unwrap(), Timeframe::H12);
        assert_eq!(Timeframe::parse("24").unwrap(), Timeframe::H24);
    }

    #[test]
    fn parse_long_names() {
        assert_eq!(Timeframe::parse("week").unwrap(), Timeframe::W1);
        assert_eq!(Timeframe::parse("month").unwrap(), Timeframe::Mo1);
        assert_eq!(Timeframe::parse("1M").unwrap(), Timeframe::Mo1);
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!(matches!(
            Timeframe::parse("7m"),
            Err(FeedError::UnknownTimeframe(t)) if t == "7m"
        ));
        // Lowercase 1m would be one minute, which is not a supported width.
        assert!(Timeframe::parse("1m").is_err());
        assert!(Timeframe::parse("").is_err());
    }

    #[test]
    fn names_round_trip_through_parse() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.name().parse::<Timeframe>().unwrap(), tf);
        }
    }

    #[test]
    fn bucket_start_floors() {
        assert_eq!(Timeframe::M5.bucket_start(0), 0);
        assert_eq!(Timeframe::M5.bucket_start(299_999), 0);
        assert_eq!(Timeframe::M5.bucket_start(300_000), 300_000);
        assert_eq!(Timeframe::M5.bucket_start(-1), -300_000);
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&Timeframe::Mo1).unwrap();
        assert_eq!(json, "\"1M\"");
        let tf: Timeframe = serde_json::from_str("\"24h\"").unwrap();
        assert_eq!(tf, Timeframe::H24);
    }
}
