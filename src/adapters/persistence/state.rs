//! State Store - Atomic JSON Market Snapshots
//!
//! Saves the market snapshot to `market_state.json` using atomic writes
//! (write to tmp file, then rename) so a crash mid-write never leaves
//! a truncated snapshot behind.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument};

use crate::ports::repository::MarketSnapshot;

/// Atomic JSON store for the terminal market snapshot.
pub struct StateStore {
    /// Path to market_state.json.
    state_path: PathBuf,
    /// Temporary path for atomic writes.
    tmp_path: PathBuf,
}

impl StateStore {
    /// Create a new state store in the given data directory.
    ///
    /// Creates the directory if it doesn't exist.
    pub fn new(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).context("Failed to create data directory")?;

        Ok(Self {
            state_path: data_dir.join("market_state.json"),
            tmp_path: data_dir.join("market_state.json.tmp"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.state_path
    }

    /// Save a snapshot atomically (tmp → rename).
    #[instrument(skip(self, snapshot))]
    pub fn save(&self, snapshot: &MarketSnapshot) -> Result<()> {
        let json = serde_json::to_string_pretty(snapshot).context("Failed to serialize market snapshot")?;

        fs::write(&self.tmp_path, &json).context("Failed to write tmp state file")?;
        fs::rename(&self.tmp_path, &self.state_path).context("Failed to rename state file")?;

        info!(
            path = %self.state_path.display(),
            version = %snapshot.version,
            block = snapshot.block_number,
            "Market snapshot saved"
        );

        Ok(())
    }

    /// Load the most recent snapshot. `None` if none was written yet.
    #[instrument(skip(self))]
    pub fn load(&self) -> Result<Option<MarketSnapshot>> {
        if !self.state_path.exists() {
            info!("No market snapshot found");
            return Ok(None);
        }

        let json = fs::read_to_string(&self.state_path).context("Failed to read state file")?;
        let snapshot: MarketSnapshot =
            serde_json::from_str(&json).context("Failed to parse market snapshot JSON")?;

        info!(
            version = %snapshot.version,
            checkpoints = snapshot.market_state.checkpoints.len(),
            "Market snapshot loaded"
        );

        Ok(Some(snapshot))
    }

    /// Check if the state file exists and is readable.
    pub fn is_healthy(&self) -> bool {
        if !self.state_path.exists() {
            return true; // nothing written yet
        }
        fs::metadata(&self.state_path).is_ok()
    }
}
