use std::{path::PathBuf, time::Duration};
use thiserror::Error;

use crate::{classifier::Category, models::prices::PriceSource};

/// Failure of one request against a price source.
///
/// The retry policy retries `Transient` and `RateLimited`; `Permanent` ends
/// the attempt loop for that source at once.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("permanent failure: {0}")]
    Permanent(String),
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, SourceError::Permanent(_))
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SourceError::Permanent(format!("undecodable body: {e}"))
        } else {
            SourceError::Transient(e.to_string())
        }
    }
}

/// Configuration problems. These are the only errors that abort a run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("no DAOs configured")]
    NoDaos,

    #[error("DAO entry #{0} has an empty space id")]
    BlankSpace(usize),

    #[error("activist threshold {0} is outside [0, 1]")]
    InvalidThreshold(f64),

    #[error("invalid price window: {0}")]
    InvalidWindow(String),

    #[error("invalid snapshot settings: {0}")]
    InvalidSnapshot(String),

    #[error("invalid settings for {price_source}: {reason}")]
    InvalidSource {
        price_source: PriceSource,
        reason: String,
    },

    #[error("invalid source priority: {0}")]
    InvalidPriority(String),

    #[error("jitter range {min_ms}..{max_ms} ms is empty")]
    InvalidJitter { min_ms: u64, max_ms: u64 },

    #[error("invalid weight {weight} for category {category}")]
    InvalidWeight { category: Category, weight: f64 },
}
