use anyhow::Result;
use chrono::{NaiveDate, Utc};
use tracing::{info, instrument, warn};

use crate::{
    classifier::ActivistClassifier,
    config::{AppConfig, DaoConfig},
    dataset::DatasetWriter,
    models::{prices::PriceWindow, proposals::Proposal},
    prices::{PriceCollector, checkpoint::Checkpoint},
    snapshot_api::SnapshotApi,
    summary::RunSummary,
};

/// Everything one run needs, built from a validated config.
pub struct Pipeline<'a> {
    config: &'a AppConfig,
    classifier: ActivistClassifier,
    snapshot: SnapshotApi,
    collector: PriceCollector,
    writer: DatasetWriter,
    checkpoint: Checkpoint,
    today: NaiveDate,
}

/// Fetches, classifies, prices and writes every configured DAO in turn.
pub async fn run(config: &AppConfig) -> Result<RunSummary> {
    Pipeline::new(config)?.run().await
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a AppConfig) -> Result<Self> {
        Ok(Self {
            config,
            classifier: ActivistClassifier::new(
                &config.classifier.weights,
                config.activist_threshold,
            )?,
            snapshot: SnapshotApi::new(&config.snapshot)?,
            collector: PriceCollector::from_config(&config.sources, &config.jitter)?,
            writer: DatasetWriter::new(&config.output.dir, &config.output.master_file)?,
            checkpoint: Checkpoint::load(config.output.checkpoint_path()),
            today: Utc::now().date_naive(),
        })
    }

    pub async fn run(mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::new(self.classifier.threshold());
        info!(
            daos = self.config.daos.len(),
            threshold = self.classifier.threshold(),
            completed = self.checkpoint.completed_count(),
            "Starting collection"
        );

        let config = self.config;
        for dao in &config.daos {
            self.process_dao(dao, &mut summary).await;
        }

        summary.finish();
        summary.log();
        let path = config.output.summary_path();
        if let Err(err) = summary.write(&path) {
            warn!(error = ?err, "Failed to write run summary");
        }
        Ok(summary)
    }

    #[instrument(skip_all, fields(space = %dao.space))]
    async fn process_dao(&mut self, dao: &DaoConfig, summary: &mut RunSummary) {
        let outcome = self.snapshot.fetch_all_proposals(&dao.space).await;
        summary.daos_processed += 1;
        summary.proposals_fetched += outcome.proposals.len();
        if outcome.abandoned.is_some() {
            summary.daos_abandoned.push(dao.space.clone());
        }

        let mut activist = 0;
        for proposal in outcome.proposals {
            let score = self.classifier.score_proposal(&proposal);
            if !self.classifier.is_activist(&score) {
                continue;
            }
            activist += 1;
            summary.activist_proposals += 1;

            let key = proposal.key();
            if self.checkpoint.is_completed(&key) {
                summary.proposals_skipped_completed += 1;
                continue;
            }

            info!(
                proposal = %key,
                score = score.score,
                summary = %score.summary(),
                "Activist proposal"
            );
            let proposal = self.with_tally(proposal).await;

            let Some(window) = PriceWindow::around(
                proposal.created,
                self.config.window.days_before,
                self.config.window.days_after,
                self.today,
            ) else {
                warn!(proposal = %key, "Price window lies entirely in the future");
                summary.proposals_without_prices += 1;
                continue;
            };

            let series = self
                .collector
                .collect(&key, &dao.token, window, &mut self.checkpoint)
                .await;
            summary.record_series(&series);
            if series.is_empty() {
                summary.proposals_without_prices += 1;
                continue;
            }

            match self.writer.write_proposal(&proposal, &score, &series) {
                Ok(written) => {
                    summary.proposals_written += 1;
                    summary.total_rows += written.rows;
                    if let Err(err) = self.checkpoint.mark_completed(&key) {
                        warn!(proposal = %key, error = ?err, "Failed to persist checkpoint");
                    }
                }
                Err(err) => {
                    warn!(proposal = %key, error = ?err, "Failed to write dataset rows");
                    summary.proposals_failed += 1;
                }
            }
        }

        summary.activist_by_dao.insert(dao.space.clone(), activist);
        info!(activist, "DAO processed");
    }

    async fn with_tally(&self, proposal: Proposal) -> Proposal {
        match self.snapshot.fetch_vote_tally(&proposal).await {
            Ok(tally) => proposal.with_tally(tally),
            Err(err) => {
                warn!(proposal = %proposal.key(), error = %err, "Vote tally unavailable");
                proposal
            }
        }
    }
}
