use anyhow::{Context, Result};
use chrono::SecondsFormat;
use serde::Serialize;
use std::{
    fs::{self, OpenOptions},
    path::PathBuf,
};
use tracing::{debug, instrument};

use crate::{
    classifier::ActivistScore,
    models::{
        prices::{PriceRecord, PriceSeries},
        proposals::Proposal,
    },
};

const TITLE_CHARS: usize = 40;

/// One CSV line: a price day joined with its proposal metadata.
#[derive(Debug, Serialize)]
pub struct DatasetRow<'a> {
    pub timestamp: i64,
    pub datetime: String,
    pub date: String,
    pub price_usd: f64,
    pub volume_usd: f64,
    pub market_cap_usd: f64,
    pub source: &'a str,
    pub price_change_pct: Option<f64>,
    pub volume_change_pct: Option<f64>,
    pub dao: &'a str,
    pub proposal_id: &'a str,
    pub proposal_title: &'a str,
    pub activist_score: f64,
    pub detection_methods: String,
    pub detection_summary: String,
    pub top_voter_percentage: f64,
    pub proposer_percentage: f64,
    pub total_votes: u64,
    pub proposal_state: &'a str,
    pub proposal_author: &'a str,
    pub proposal_created: String,
}

/// Rows for every record of `series`, in date order.
pub fn build_rows<'a>(
    proposal: &'a Proposal,
    score: &ActivistScore,
    series: &'a PriceSeries,
) -> Vec<DatasetRow<'a>> {
    let methods = score.methods_label();
    let summary = score.summary();
    let created = proposal.created.to_rfc3339_opts(SecondsFormat::Secs, true);

    let mut previous: Option<&PriceRecord> = None;
    let mut rows = Vec::with_capacity(series.len());
    for record in series.records() {
        rows.push(DatasetRow {
            timestamp: record.timestamp_ms,
            datetime: record
                .datetime()
                .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default(),
            date: record.date.format("%Y-%m-%d").to_string(),
            price_usd: record.price_usd,
            volume_usd: record.volume_usd,
            market_cap_usd: record.market_cap_usd,
            source: record.source.as_str(),
            price_change_pct: previous.and_then(|p| pct_change(p.price_usd, record.price_usd)),
            volume_change_pct: previous.and_then(|p| pct_change(p.volume_usd, record.volume_usd)),
            dao: &proposal.dao,
            proposal_id: &proposal.id,
            proposal_title: &proposal.title,
            activist_score: round4(score.score),
            detection_methods: methods.clone(),
            detection_summary: summary.clone(),
            top_voter_percentage: proposal.tally.top_voter_pct,
            proposer_percentage: proposal.tally.proposer_pct,
            total_votes: proposal.tally.total_votes,
            proposal_state: &proposal.state,
            proposal_author: &proposal.author,
            proposal_created: created.clone(),
        });
        previous = Some(record);
    }
    rows
}

fn pct_change(previous: f64, current: f64) -> Option<f64> {
    (previous != 0.0).then(|| (current - previous) / previous * 100.0)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// `{dao}_{proposal_id}_{safe_title}.csv`
pub fn proposal_file_name(proposal: &Proposal) -> String {
    format!(
        "{}_{}_{}.csv",
        path_safe(&proposal.dao),
        path_safe(&proposal.id),
        safe_title(&proposal.title)
    )
}

/// First 40 characters, alphanumerics, spaces, `-` and `_` only, whitespace
/// runs collapsed to `_`.
pub fn safe_title(title: &str) -> String {
    let kept: String = title
        .chars()
        .take(TITLE_CHARS)
        .filter(|c| c.is_alphanumeric() || *c == ' ' || *c == '-' || *c == '_')
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join("_")
}

fn path_safe(component: &str) -> String {
    component
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenProposal {
    pub path: PathBuf,
    pub rows: usize,
}

/// Writes per-proposal CSVs and appends the same rows to the master CSV.
///
/// The per-proposal file is replaced on every write. The master file only
/// grows, so writing a proposal twice duplicates its rows there.
pub struct DatasetWriter {
    dir: PathBuf,
    master_path: PathBuf,
}

impl DatasetWriter {
    pub fn new(dir: impl Into<PathBuf>, master_file: &str) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output dir {}", dir.display()))?;
        let master_path = dir.join(master_file);
        Ok(Self { dir, master_path })
    }

    #[instrument(skip_all, fields(proposal = %proposal.key()))]
    pub fn write_proposal(
        &self,
        proposal: &Proposal,
        score: &ActivistScore,
        series: &PriceSeries,
    ) -> Result<WrittenProposal> {
        let rows = build_rows(proposal, score, series);
        let path = self.dir.join(proposal_file_name(proposal));

        let mut writer = csv::Writer::from_path(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for row in &rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        let master = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.master_path)
            .with_context(|| format!("Failed to open {}", self.master_path.display()))?;
        let needs_header = master.metadata()?.len() == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(master);
        for row in &rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        debug!(path = %path.display(), rows = rows.len(), "Proposal written");
        Ok(WrittenProposal {
            path,
            rows: rows.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_title_keeps_forty_clean_characters() {
        assert_eq!(safe_title("Emergency: remove  lead / now!"), "Emergency_remove_lead_now");
        let long = "a".repeat(60);
        assert_eq!(safe_title(&long).len(), 40);
        assert_eq!(safe_title("?!"), "");
    }

    #[test]
    fn change_is_relative_to_previous_value() {
        assert_eq!(pct_change(2.0, 3.0), Some(50.0));
        assert_eq!(pct_change(0.0, 3.0), None);
    }
}
