//! Trade Logger - Append-only JSONL Trade Records
//!
//! Persists trade records to per-run JSONL files in the format
//! `trades/<run>.jsonl`. Each line is a self-contained JSON
//! record for easy parsing, streaming, and post-run analysis.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::ports::repository::TradeRecord;

/// Append-only JSONL trade logger, one file per simulation run.
///
/// Every attempted trade is logged, including rejected ones, so a run
/// can be audited line by line.
pub struct TradeLogger {
    /// Directory holding the trade files.
    trades_dir: PathBuf,
    /// File this run appends to.
    path: PathBuf,
}

impl TradeLogger {
    /// Create a trade logger for `run_name` in the given data directory.
    pub fn new(data_dir: &Path, run_name: &str) -> Result<Self> {
        let trades_dir = data_dir.join("trades");
        fs::create_dir_all(&trades_dir).context("Failed to create trades directory")?;

        Ok(Self {
            path: trades_dir.join(format!("{run_name}.jsonl")),
            trades_dir,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a trade record to this run's JSONL file.
    #[instrument(skip(self, record), fields(trade_id = %record.id))]
    pub fn append_trade(&self, record: &TradeRecord) -> Result<()> {
        let mut json = serde_json::to_string(record).context("Failed to serialize trade record")?;
        json.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context("Failed to open trade log file")?;

        file.write_all(json.as_bytes())
            .context("Failed to write trade record")?;
        file.flush().context("Failed to flush trade log")?;

        Ok(())
    }

    /// Load all trade records from every run file, ordered by block.
    #[instrument(skip(self))]
    pub fn load_all_trades(&self) -> Result<Vec<TradeRecord>> {
        let mut trades = Vec::new();

        for entry in fs::read_dir(&self.trades_dir)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "jsonl") {
                let content = fs::read_to_string(&path)?;
                for line in content.lines() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<TradeRecord>(line) {
                        Ok(record) => trades.push(record),
                        Err(e) => {
                            warn!(
                                file = %path.display(),
                                error = %e,
                                "Skipping malformed trade record"
                            );
                        }
                    }
                }
            }
        }

        trades.sort_by_key(|t| t.block_number);
        info!(count = trades.len(), "Loaded trade records");
        Ok(trades)
    }

    /// Load trades submitted within a block range (inclusive).
    pub fn load_trades_range(&self, from_block: u64, to_block: u64) -> Result<Vec<TradeRecord>> {
        let all = self.load_all_trades()?;
        Ok(all
            .into_iter()
            .filter(|t| (from_block..=to_block).contains(&t.block_number))
            .collect())
    }

    /// Check if the trades directory is writable.
    pub fn is_healthy(&self) -> bool {
        let test_path = self.trades_dir.join(".health_check");
        let result = fs::write(&test_path, b"ok");
        let _ = fs::remove_file(&test_path);
        result.is_ok()
    }
}
