use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::candle::{Candle, Tick};
use crate::error::FeedError;

/// Persisted engine state.
///
/// `ohlc` is keyed by timeframe name so that a snapshot written by a deployment with
/// a different timeframe set still loads.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub latest_price: Option<f64>,
    #[serde(default)]
    pub last_updated: Option<i64>,
    #[serde(default)]
    pub history: Vec<Tick>,
    #[serde(default)]
    pub ohlc: BTreeMap<String, Vec<Candle>>,
}

/// Load/save of the whole engine state as one unit.
pub trait SnapshotStore: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<Snapshot>, FeedError>;

    fn save(&self, snapshot: &Snapshot) -> Result<(), FeedError>;
}

/// Snapshot stored as a single JSON file.
///
/// Saves go through a sibling temp file and a rename, so a crash mid-write leaves the
/// previous snapshot intact.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self) -> Result<Option<Snapshot>, FeedError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&self, snapshot: &Snapshot) -> Result<(), FeedError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.temp_path();
        std::fs::write(&tmp, serde_json::to_vec(snapshot)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
