use anyhow::Result;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::SnapshotConfig,
    errors::SourceError,
    http::JsonHttp,
    models::proposals::{Proposal, VoteTally},
    prices::retry::RetryPolicy,
};

/// Attempts per GraphQL request: the first try and a single retry, whatever
/// the failure.
const PAGE_ATTEMPTS: u32 = 2;

const PROPOSALS_QUERY: &str = r#"
query Proposals($space: String!, $first: Int!, $skip: Int!) {
  proposals(
    first: $first,
    skip: $skip,
    where: { space: $space },
    orderBy: "created",
    orderDirection: asc
  ) {
    id
    title
    body
    author
    created
    state
    votes
  }
}"#;

const VOTES_QUERY: &str = r#"
query Votes($proposal: String!, $first: Int!) {
  votes(
    first: $first,
    where: { proposal: $proposal },
    orderBy: "vp",
    orderDirection: desc
  ) {
    voter
    vp
  }
}"#;

#[derive(Debug, Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphQlError>>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct ProposalsData {
    #[serde(default)]
    proposals: Vec<SnapshotProposal>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotProposal {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub author: String,
    pub created: i64,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub votes: Option<u64>,
}

impl SnapshotProposal {
    fn into_proposal(self, dao: &str) -> Option<Proposal> {
        let created = DateTime::from_timestamp(self.created, 0)?;
        Some(Proposal {
            dao: dao.to_string(),
            id: self.id,
            title: self.title.unwrap_or_default(),
            body: self.body.unwrap_or_default(),
            author: self.author,
            created,
            state: self.state,
            tally: VoteTally {
                total_votes: self.votes.unwrap_or(0),
                ..VoteTally::default()
            },
        })
    }
}

#[derive(Debug, Deserialize)]
struct VotesData {
    #[serde(default)]
    votes: Vec<SnapshotVote>,
}

#[derive(Debug, Deserialize)]
struct SnapshotVote {
    voter: String,
    #[serde(default)]
    vp: Option<f64>,
}

/// Proposals fetched for one space. `abandoned` carries the error of the page
/// that could not be fetched, in which case `proposals` is partial.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub proposals: Vec<Proposal>,
    pub abandoned: Option<String>,
}

/// Snapshot hub GraphQL client.
pub struct SnapshotApi {
    http: JsonHttp,
    page_size: usize,
    vote_sample_size: usize,
    retry: RetryPolicy,
}

impl SnapshotApi {
    pub fn new(config: &SnapshotConfig) -> Result<Self> {
        Ok(Self {
            http: JsonHttp::new(&config.endpoint, config.timeout())?,
            page_size: config.page_size.max(1),
            vote_sample_size: config.vote_sample_size,
            retry: RetryPolicy::fixed(PAGE_ATTEMPTS, config.retry_delay())
                .retrying_permanent(),
        })
    }

    /// Pages through every proposal of `space` until an empty page. A page
    /// that still fails after its retry ends the walk with what was fetched.
    #[instrument(skip(self))]
    pub async fn fetch_all_proposals(&self, space: &str) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        let mut skip = 0;

        loop {
            let page = match self.fetch_proposals_page(space, skip).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(space, skip, error = %err, "Proposal page failed, abandoning space");
                    outcome.abandoned = Some(err.to_string());
                    break;
                }
            };
            if page.is_empty() {
                break;
            }

            skip += page.len();
            debug!(space, skip, page = page.len(), "Fetched proposal page");
            for raw in page {
                let id = raw.id.clone();
                match raw.into_proposal(space) {
                    Some(proposal) => outcome.proposals.push(proposal),
                    None => warn!(space, id, "Proposal has an invalid creation time, skipping"),
                }
            }
        }

        info!(
            space,
            proposals = outcome.proposals.len(),
            abandoned = outcome.abandoned.is_some(),
            "Fetched proposals"
        );
        outcome
    }

    async fn fetch_proposals_page(
        &self,
        space: &str,
        skip: usize,
    ) -> Result<Vec<SnapshotProposal>, SourceError> {
        let body = json!({
            "query": PROPOSALS_QUERY,
            "variables": { "space": space, "first": self.page_size, "skip": skip },
        });
        let data: ProposalsData = self.query(&body, space).await?;
        Ok(data.proposals)
    }

    /// Voting-power concentration for `proposal` from its largest voters.
    #[instrument(skip(self, proposal), fields(proposal_id = %proposal.id))]
    pub async fn fetch_vote_tally(&self, proposal: &Proposal) -> Result<VoteTally, SourceError> {
        let body = json!({
            "query": VOTES_QUERY,
            "variables": { "proposal": proposal.id, "first": self.vote_sample_size },
        });
        let data: VotesData = self.query(&body, &proposal.id).await?;

        let votes: Vec<(String, f64)> = data
            .votes
            .into_iter()
            .map(|v| (v.voter, v.vp.unwrap_or(0.0)))
            .collect();
        debug!(votes = votes.len(), "Fetched votes");

        Ok(VoteTally::from_votes(
            &votes,
            &proposal.author,
            proposal.tally.total_votes,
        ))
    }

    async fn query<T>(&self, body: &serde_json::Value, label: &str) -> Result<T, SourceError>
    where
        T: for<'de> Deserialize<'de>,
    {
        let http = &self.http;
        self.retry
            .run(label, move || async move {
                let response: GraphQlResponse<T> = http.post(body).await?;
                match (response.data, response.errors) {
                    (Some(data), _) => Ok(data),
                    (None, Some(errors)) => {
                        let messages: Vec<_> = errors.into_iter().map(|e| e.message).collect();
                        Err(SourceError::Transient(format!(
                            "GraphQL errors: {}",
                            messages.join("; ")
                        )))
                    }
                    (None, None) => Err(SourceError::Permanent("empty GraphQL response".into())),
                }
            })
            .await
    }
}
