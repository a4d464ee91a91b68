use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use price_feed_core::export;
use price_feed_core::query::{DEFAULT_SAMPLE_LIMIT, Stats};
use price_feed_core::snapshot::{JsonFileStore, SnapshotStore};
use price_feed_core::{FeedConfig, FeedEngine, FeedError, Timeframe};
use price_feed_sources::http::HttpJsonSource;
use price_feed_sources::{CycleOutcome, PriceSource, run_cycle};
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

#[derive(Parser)]
#[command(
    name = "price-feed",
    about = "Sample a price every second and maintain multi-timeframe OHLC candles"
)]
struct Cli {
    /// Snapshot file holding history and candles
    #[arg(long, default_value = "price-feed.json")]
    snapshot: PathBuf,

    /// Timeframes to maintain (comma-separated, e.g. 5m,15m,1h,24h,1w)
    #[arg(long, value_delimiter = ',', default_value = "5m,15m,30m,1h,24h")]
    timeframes: Vec<String>,

    /// Maximum candles kept per timeframe
    #[arg(long, default_value_t = price_feed_core::config::DEFAULT_MAX_CANDLES)]
    max_candles: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the price source and keep the snapshot up to date
    Run {
        /// JSON endpoint returning the price (falls back to PRICE_FEED_URL)
        #[arg(long)]
        source_url: Option<String>,

        /// JSON pointer to the price inside the response (falls back to PRICE_FEED_POINTER)
        #[arg(long)]
        pointer: Option<String>,

        /// Milliseconds between ingestion cycles
        #[arg(long, default_value_t = 1000)]
        interval_ms: u64,

        /// Milliseconds before a price fetch is abandoned
        #[arg(long, default_value_t = 800)]
        timeout_ms: u64,
    },

    /// Print candles for one timeframe, or every timeframe if omitted
    Candles {
        /// Timeframe token (5, 5m, 60, 1h, 24, week, month, ...)
        #[arg(short, long)]
        timeframe: Option<String>,

        /// Earliest bucket start (ms since epoch)
        #[arg(long)]
        from: Option<String>,

        /// Latest bucket start (ms since epoch)
        #[arg(long)]
        to: Option<String>,
    },

    /// Print recent raw samples, downsampled
    Sample {
        /// Look-back window in minutes
        #[arg(short, long, default_value_t = 60)]
        minutes: i64,

        /// Maximum number of points returned
        #[arg(short, long, default_value_t = DEFAULT_SAMPLE_LIMIT)]
        limit: usize,
    },

    /// Print statistics over raw samples in a time range
    History {
        #[arg(long)]
        from: Option<i64>,

        #[arg(long)]
        to: Option<i64>,
    },

    /// Show what the snapshot contains
    Status {
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write one timeframe's candles to a Parquet file
    Export {
        #[arg(short, long)]
        timeframe: String,

        #[arg(short, long)]
        out: PathBuf,
    },
}

fn build_config(tokens: &[String], max_candles: usize) -> Result<FeedConfig> {
    let timeframes = tokens
        .iter()
        .map(|t| {
            Timeframe::parse(t).with_context(|| format!("invalid --timeframes entry '{t}'"))
        })
        .collect::<Result<Vec<_>>>()?;
    anyhow::ensure!(!timeframes.is_empty(), "at least one timeframe is required");
    anyhow::ensure!(max_candles > 0, "--max-candles must be positive");

    Ok(FeedConfig {
        max_candles,
        ..FeedConfig::with_timeframes(timeframes)
    })
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

fn format_ms(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

/// Load an existing snapshot for read-only commands. Nothing is written back.
fn load_engine(store: &JsonFileStore, config: FeedConfig, now: i64) -> Result<FeedEngine> {
    let snapshot = store
        .load()
        .with_context(|| format!("failed to read {}", store.path().display()))?
        .with_context(|| format!("no snapshot at {}", store.path().display()))?;
    let mut engine = FeedEngine::from_snapshot(config, snapshot);
    engine.reconcile(now);
    Ok(engine)
}

fn create_source(url: Option<String>, pointer: Option<String>) -> Result<HttpJsonSource> {
    let source = match url {
        Some(url) => {
            let pointer = pointer
                .or_else(|| std::env::var("PRICE_FEED_POINTER").ok())
                .unwrap_or_else(|| price_feed_sources::http::DEFAULT_POINTER.to_string());
            HttpJsonSource::new(url, pointer)
        }
        None => HttpJsonSource::from_env(),
    };
    source.context("failed to create price source")
}

async fn cmd_run(
    store: &JsonFileStore,
    config: FeedConfig,
    source: &dyn PriceSource,
    interval: Duration,
    fetch_timeout: Duration,
) -> Result<()> {
    let mut engine = FeedEngine::boot(config, store, now_ms());
    info!(
        "{}: polling every {interval:?}, snapshot at {}",
        source.name(),
        store.path().display()
    );

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut skipped = 0u64;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match run_cycle(&mut engine, source, store, fetch_timeout, now_ms()).await {
                    CycleOutcome::Skipped(_) => skipped += 1,
                    CycleOutcome::Ingested { .. } => {
                        if skipped > 0 {
                            info!("source recovered after {skipped} skipped cycle(s)");
                            skipped = 0;
                        }
                    }
                }
            }
            _ = &mut shutdown => {
                info!("shutdown requested");
                break;
            }
        }
    }

    engine
        .persist(store, now_ms())
        .context("failed to save final snapshot")?;
    info!("final snapshot saved");
    Ok(())
}

fn cmd_candles(
    engine: &FeedEngine,
    timeframe: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<()> {
    let Some(token) = timeframe else {
        anyhow::ensure!(
            from.is_none() && to.is_none(),
            "--from/--to require --timeframe"
        );
        println!("{}", serde_json::to_string_pretty(&engine.all_candles())?);
        return Ok(());
    };

    match engine.query_candles(token, from, to) {
        Ok(candles) => println!("{}", serde_json::to_string_pretty(&candles)?),
        Err(FeedError::NoData { timeframe }) => println!("No {timeframe} candles in range."),
        Err(e) => return Err(e).context("invalid candle query"),
    }
    Ok(())
}

fn cmd_sample(engine: &FeedEngine, minutes: i64, limit: usize, now: i64) -> Result<()> {
    let points = engine
        .sample(minutes, limit, now)
        .context("invalid sample query")?;
    let stats = Stats::of(&points);
    let body = json!({ "points": points, "stats": stats });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

fn cmd_history(engine: &FeedEngine, from: Option<i64>, to: Option<i64>) -> Result<()> {
    let (ticks, stats) = engine
        .history_range(from, to)
        .context("invalid history query")?;
    let span = ticks.first().zip(ticks.last());
    match span {
        Some((first, last)) => println!(
            "{} sample(s), {} to {}",
            stats.count,
            format_ms(first.timestamp),
            format_ms(last.timestamp)
        ),
        None => println!("No samples in range."),
    }
    println!(
        "avg {:.6}  min {:.6}  max {:.6}",
        stats.avg, stats.min, stats.max
    );
    Ok(())
}

/// Bucket start of the oldest candle kept for `timeframe`.
fn oldest_candle_at(engine: &FeedEngine, timeframe: Timeframe) -> Option<String> {
    let series = engine.series(timeframe)?;
    if series.is_empty() {
        return None;
    }
    series.candles()[0].opened_at().map(|dt| dt.to_rfc3339())
}

fn cmd_status(engine: &FeedEngine, as_json: bool) -> Result<()> {
    let status = engine.status();
    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    match engine.latest() {
        Some(tick) => println!(
            "Latest price: {} at {}",
            tick.price,
            format_ms(tick.timestamp)
        ),
        None => println!("No price recorded yet."),
    }
    println!("History: {} sample(s)", status.history_len);

    for (tf, count) in &status.candles {
        match oldest_candle_at(engine, *tf) {
            Some(first) => println!("{tf}: {count} candle(s) since {first}"),
            None => println!("{tf}: no candles"),
        }
    }
    Ok(())
}

fn cmd_export(engine: &FeedEngine, timeframe: &str, out: &Path) -> Result<()> {
    let candles = engine
        .query_candles(timeframe, None, None)
        .context("invalid export timeframe")?;
    if candles.is_empty() {
        warn!("{timeframe}: no candles, writing empty file");
    }
    export::write_parquet(out, &candles)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("Wrote {} candle(s) to {}", candles.len(), out.display());
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level)),
        )
        .init();

    let config = build_config(&cli.timeframes, cli.max_candles)?;
    let store = JsonFileStore::new(&cli.snapshot);

    match cli.command {
        Commands::Run {
            source_url,
            pointer,
            interval_ms,
            timeout_ms,
        } => {
            let source = create_source(source_url, pointer)?;
            cmd_run(
                &store,
                config,
                &source,
                Duration::from_millis(interval_ms),
                Duration::from_millis(timeout_ms),
            )
            .await?;
        }
        Commands::Candles {
            timeframe,
            from,
            to,
        } => {
            let engine = load_engine(&store, config, now_ms())?;
            cmd_candles(&engine, timeframe.as_deref(), from.as_deref(), to.as_deref())?;
        }
        Commands::Sample { minutes, limit } => {
            let now = now_ms();
            let engine = load_engine(&store, config, now)?;
            cmd_sample(&engine, minutes, limit, now)?;
        }
        Commands::History { from, to } => {
            let engine = load_engine(&store, config, now_ms())?;
            cmd_history(&engine, from, to)?;
        }
        Commands::Status { json } => {
            let engine = load_engine(&store, config, now_ms())?;
            cmd_status(&engine, json)?;
        }
        Commands::Export { timeframe, out } => {
            let engine = load_engine(&store, config, now_ms())?;
            cmd_export(&engine, &timeframe, &out)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_run_args() {
        let cli = Cli::try_parse_from([
            "price-feed",
            "--snapshot",
            "/tmp/eth.json",
            "run",
            "--source-url",
            "http://localhost:8080/price",
            "--pointer",
            "/data/amount",
        ])
        .unwrap();

        assert_eq!(cli.snapshot, PathBuf::from("/tmp/eth.json"));
        match cli.command {
            Commands::Run {
                source_url,
                pointer,
                interval_ms,
                timeout_ms,
            } => {
                assert_eq!(source_url.as_deref(), Some("http://localhost:8080/price"));
                assert_eq!(pointer.as_deref(), Some("/data/amount"));
                assert_eq!(interval_ms, 1000);
                assert_eq!(timeout_ms, 800);
            }
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn parse_global_defaults() {
        let cli = Cli::try_parse_from(["price-feed", "status"]).unwrap();
        assert_eq!(cli.timeframes, vec!["5m", "15m", "30m", "1h", "24h"]);
        assert_eq!(cli.max_candles, 100);
        assert!(matches!(cli.command, Commands::Status { json: false }));
    }

    #[test]
    fn parse_status_json_flag() {
        let cli = Cli::try_parse_from(["price-feed", "status", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Status { json: true }));
    }

    #[test]
    fn oldest_candle_formats_bucket_start() {
        let mut engine = FeedEngine::new(FeedConfig::default());
        assert_eq!(oldest_candle_at(&engine, Timeframe::M5), None);
        assert_eq!(oldest_candle_at(&engine, Timeframe::W1), None);

        engine.ingest(10.0, 1_736_942_400_000 + 42).unwrap();
        assert_eq!(
            oldest_candle_at(&engine, Timeframe::M5).as_deref(),
            Some("2025-01-15T12:00:00+00:00")
        );
        assert!(cmd_status(&engine, true).is_ok());
        assert!(cmd_status(&engine, false).is_ok());
    }

    #[test]
    fn parse_candles_keeps_raw_bounds() {
        let cli = Cli::try_parse_from([
            "price-feed",
            "candles",
            "-t",
            "60",
            "--from",
            "1000",
            "--to",
            "abc",
        ])
        .unwrap();

        match cli.command {
            Commands::Candles {
                timeframe,
                from,
                to,
            } => {
                assert_eq!(timeframe.as_deref(), Some("60"));
                assert_eq!(from.as_deref(), Some("1000"));
                assert_eq!(to.as_deref(), Some("abc"));
            }
            _ => panic!("expected Candles command"),
        }
    }

    #[test]
    fn parse_sample_defaults() {
        let cli = Cli::try_parse_from(["price-feed", "sample"]).unwrap();
        match cli.command {
            Commands::Sample { minutes, limit } => {
                assert_eq!(minutes, 60);
                assert_eq!(limit, 10);
            }
            _ => panic!("expected Sample command"),
        }
    }

    #[test]
    fn build_config_from_tokens() {
        let tokens: Vec<String> = ["5", "12h", "week"].iter().map(|s| s.to_string()).collect();
        let config = build_config(&tokens, 50).unwrap();
        assert_eq!(
            config.timeframes,
            vec![Timeframe::M5, Timeframe::H12, Timeframe::W1]
        );
        assert_eq!(config.max_candles, 50);
    }

    #[test]
    fn build_config_rejects_bad_input() {
        assert!(build_config(&["7m".to_string()], 100).is_err());
        assert!(build_config(&[], 100).is_err());
        assert!(build_config(&["5m".to_string()], 0).is_err());
    }

    #[test]
    fn load_engine_requires_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("missing.json"));
        assert!(load_engine(&store, FeedConfig::default(), 0).is_err());
        assert!(!dir.path().join("missing.json").exists());
    }

    #[test]
    fn export_writes_parquet() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("state.json"));
        let mut engine = FeedEngine::new(FeedConfig::default());
        engine.ingest(10.0, 0).unwrap();
        engine.ingest(20.0, 300_000).unwrap();
        engine.persist(&store, 300_000).unwrap();

        let engine = load_engine(&store, FeedConfig::default(), 300_000).unwrap();
        let out = dir.path().join("5m.parquet");
        cmd_export(&engine, "5m", &out).unwrap();
        assert_eq!(export::read_parquet(&out).unwrap().len(), 2);
    }

    #[test]
    fn candles_rejects_invalid_queries() {
        let engine = FeedEngine::new(FeedConfig::default());
        assert!(cmd_candles(&engine, Some("7m"), None, None).is_err());
        assert!(cmd_candles(&engine, Some("5m"), Some("2000"), Some("1000")).is_err());
        assert!(cmd_candles(&engine, None, Some("1"), None).is_err());
        assert!(cmd_candles(&engine, Some("5m"), Some("1"), None).is_ok());
    }
}
