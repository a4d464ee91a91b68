use std::time::Duration;

use price_feed_core::FeedEngine;
use price_feed_core::snapshot::SnapshotStore;
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::source::PriceSource;

/// Result of one scheduled ingestion cycle.
#[derive(Debug)]
pub enum CycleOutcome {
    /// The price was unavailable; nothing changed.
    Skipped(SourceError),
    /// The price was ingested; `saved` reports whether a snapshot was written.
    Ingested { price: f64, saved: bool },
}

/// Fetch one price and fold it into the engine, saving when the throttle allows.
///
/// A fetch error or timeout aborts the cycle before any state is touched. Save
/// failures are logged and otherwise ignored; the in-memory state stays authoritative.
pub async fn run_cycle(
    engine: &mut FeedEngine,
    source: &dyn PriceSource,
    store: &dyn SnapshotStore,
    fetch_timeout: Duration,
    now_ms: i64,
) -> CycleOutcome {
    let price = match tokio::time::timeout(fetch_timeout, source.fetch_price()).await {
        Ok(Ok(price)) => price,
        Ok(Err(e)) => {
            warn!("{}: fetch failed, skipping cycle: {e}", source.name());
            return CycleOutcome::Skipped(e);
        }
        Err(_) => {
            warn!(
                "{}: fetch timed out after {fetch_timeout:?}, skipping cycle",
                source.name()
            );
            return CycleOutcome::Skipped(SourceError::Timeout(fetch_timeout));
        }
    };

    if let Err(e) = engine.ingest(price, now_ms) {
        warn!("{}: rejected price {price}: {e}", source.name());
        return CycleOutcome::Skipped(SourceError::InvalidPrice(price));
    }
    debug!("ingested {price} at {now_ms}");

    let mut saved = false;
    if engine.save_due(now_ms) {
        match engine.persist(store, now_ms) {
            Ok(()) => {
                info!("snapshot saved ({} tick(s))", engine.history().len());
                saved = true;
            }
            Err(e) => warn!("snapshot save failed, will retry: {e}"),
        }
    }

    CycleOutcome::Ingested { price, saved }
}
