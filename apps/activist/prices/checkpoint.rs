use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fs::{self, File},
    io::Write,
    path::PathBuf,
};
use tracing::{debug, warn};

use crate::models::prices::PriceRecord;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct CheckpointState {
    series: BTreeMap<String, BTreeMap<NaiveDate, PriceRecord>>,
    completed: BTreeSet<String>,
}

/// Progress that survives a restart: fetched days per series and the
/// proposals whose dataset rows are already written.
///
/// Every mutation is persisted before it returns, so an interrupted run loses
/// at most the request in flight.
#[derive(Debug)]
pub struct Checkpoint {
    path: PathBuf,
    state: CheckpointState,
}

impl Checkpoint {
    /// Loads `path`; a missing or unreadable file starts an empty checkpoint.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<CheckpointState>(&contents) {
                Ok(state) => state,
                Err(err) => {
                    warn!(error = %err, path = %path.display(), "Unreadable checkpoint, starting empty");
                    CheckpointState::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => CheckpointState::default(),
            Err(err) => {
                warn!(error = %err, path = %path.display(), "Failed to read checkpoint, starting empty");
                CheckpointState::default()
            }
        };

        debug!(
            path = %path.display(),
            series = state.series.len(),
            completed = state.completed.len(),
            "Checkpoint loaded"
        );
        Self { path, state }
    }

    /// Days already fetched for the series `key`.
    pub fn days_for(&self, key: &str) -> BTreeMap<NaiveDate, PriceRecord> {
        self.state.series.get(key).cloned().unwrap_or_default()
    }

    pub fn fetched_days(&self, key: &str) -> usize {
        self.state.series.get(key).map_or(0, BTreeMap::len)
    }

    /// Merges `records` into the series `key` and persists. Days already
    /// present keep their first value.
    pub fn record_days(&mut self, key: &str, records: &[PriceRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let series = self.state.series.entry(key.to_string()).or_default();
        for record in records {
            series.entry(record.date).or_insert(*record);
        }
        self.save()
    }

    pub fn is_completed(&self, key: &str) -> bool {
        self.state.completed.contains(key)
    }

    /// Marks a proposal as written and drops its series days, which now live
    /// in the dataset files.
    pub fn mark_completed(&mut self, key: &str) -> Result<()> {
        self.state.completed.insert(key.to_string());
        self.state.series.remove(key);
        self.save()
    }

    pub fn completed_count(&self) -> usize {
        self.state.completed.len()
    }

    /// Writes to a sibling temp file, syncs it and renames over the target.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let contents =
            serde_json::to_vec_pretty(&self.state).context("Failed to serialize checkpoint")?;
        {
            let mut file = File::create(&tmp)
                .with_context(|| format!("Failed to create {}", tmp.display()))?;
            file.write_all(&contents)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}
