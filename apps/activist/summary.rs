use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};
use tracing::info;

use crate::models::prices::{PriceSeries, PriceSource};

/// Counters for one run, logged and written next to the dataset at the end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub threshold: f64,
    pub daos_processed: usize,
    pub daos_abandoned: Vec<String>,
    pub proposals_fetched: usize,
    pub activist_proposals: usize,
    pub proposals_skipped_completed: usize,
    pub proposals_written: usize,
    pub proposals_without_prices: usize,
    pub proposals_failed: usize,
    pub total_rows: usize,
    pub total_gap_days: usize,
    pub source_days: BTreeMap<PriceSource, usize>,
    pub activist_by_dao: BTreeMap<String, usize>,
}

impl RunSummary {
    pub fn new(threshold: f64) -> Self {
        Self {
            started_at: Some(Utc::now()),
            threshold,
            ..Self::default()
        }
    }

    pub fn record_series(&mut self, series: &PriceSeries) {
        self.total_gap_days += series.gaps().len();
        for (source, days) in series.source_counts() {
            *self.source_days.entry(source).or_insert(0) += days;
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn log(&self) {
        info!(
            daos_processed = self.daos_processed,
            daos_abandoned = self.daos_abandoned.len(),
            proposals_fetched = self.proposals_fetched,
            activist_proposals = self.activist_proposals,
            skipped_completed = self.proposals_skipped_completed,
            proposals_written = self.proposals_written,
            without_prices = self.proposals_without_prices,
            failed = self.proposals_failed,
            total_rows = self.total_rows,
            total_gap_days = self.total_gap_days,
            source_days = ?self.source_days,
            "Collection finished"
        );
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize summary")?;
        fs::write(path, contents).with_context(|| format!("Failed to write {}", path.display()))
    }
}
