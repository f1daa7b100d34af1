use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A governance proposal as fetched from the governance endpoint.
///
/// Identity is `(dao, id)`. The vote tally is attached after the fact because
/// it needs a second query and is only fetched for retained proposals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub dao: String,
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: String,
    pub created: DateTime<Utc>,
    pub state: String,
    pub tally: VoteTally,
}

impl Proposal {
    pub fn with_tally(self, tally: VoteTally) -> Self {
        Self { tally, ..self }
    }

    /// Key used for checkpoint entries and log fields.
    pub fn key(&self) -> String {
        format!("{}/{}", self.dao, self.id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VoteTally {
    pub top_voter_pct: f64,
    pub proposer_pct: f64,
    pub top10_concentration_pct: f64,
    pub total_votes: u64,
}

impl VoteTally {
    /// Derives concentration figures from `(voter, voting_power)` pairs.
    ///
    /// `reported_votes` is the proposal's own vote count, which can exceed the
    /// sample fetched; zero falls back to the sample size.
    pub fn from_votes(votes: &[(String, f64)], author: &str, reported_votes: u64) -> Self {
        let total_votes = if reported_votes > 0 {
            reported_votes
        } else {
            votes.len() as u64
        };

        let total_vp: f64 = votes.iter().map(|(_, vp)| vp.max(0.0)).sum();
        if total_vp <= 0.0 {
            return Self {
                total_votes,
                ..Self::default()
            };
        }

        let mut powers: Vec<f64> = votes.iter().map(|(_, vp)| vp.max(0.0)).collect();
        powers.sort_by(|a, b| b.total_cmp(a));

        let top = powers.first().copied().unwrap_or(0.0);
        let top10: f64 = powers.iter().take(10).sum();
        let proposer: f64 = votes
            .iter()
            .filter(|(voter, _)| voter.eq_ignore_ascii_case(author))
            .map(|(_, vp)| vp.max(0.0))
            .sum();

        Self {
            top_voter_pct: round3(top / total_vp * 100.0),
            proposer_pct: round3(proposer / total_vp * 100.0),
            top10_concentration_pct: round3(top10 / total_vp * 100.0),
            total_votes,
        }
    }
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}
