use serde::{Deserialize, Deserializer, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{info, warn};

use crate::{
    classifier::{Category, DEFAULT_THRESHOLD},
    errors::ConfigError,
    models::prices::{PriceSource, TokenMapping},
};

pub const CONFIG_PATH_ENV: &str = "ACTIVIST_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "activist.yaml";

const MAX_WINDOW_SIDE_DAYS: u32 = 3650;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub daos: Vec<DaoConfig>,
    pub activist_threshold: f64,
    pub window: WindowConfig,
    pub output: OutputConfig,
    pub snapshot: SnapshotConfig,
    pub sources: SourcesConfig,
    pub jitter: JitterConfig,
    pub classifier: ClassifierConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            daos: Vec::new(),
            activist_threshold: DEFAULT_THRESHOLD,
            window: WindowConfig::default(),
            output: OutputConfig::default(),
            snapshot: SnapshotConfig::default(),
            sources: SourcesConfig::default(),
            jitter: JitterConfig::default(),
            classifier: ClassifierConfig::default(),
        }
    }
}

/// A Snapshot space and its governance token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaoConfig {
    pub space: String,
    #[serde(flatten)]
    pub token: TokenMapping,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub days_before: u32,
    pub days_after: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            days_before: 90,
            days_after: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub master_file: String,
    pub checkpoint_file: String,
    pub summary_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("activist_data"),
            master_file: "master_activist_dataset.csv".to_string(),
            checkpoint_file: "collection_progress.json".to_string(),
            summary_file: "collection_summary.json".to_string(),
        }
    }
}

impl OutputConfig {
    pub fn master_path(&self) -> PathBuf {
        self.dir.join(&self.master_file)
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.dir.join(&self.checkpoint_file)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(&self.summary_file)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub endpoint: String,
    pub page_size: usize,
    pub retry_delay_ms: u64,
    pub vote_sample_size: usize,
    pub timeout_secs: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://hub.snapshot.org/graphql".to_string(),
            page_size: 100,
            retry_delay_ms: 5_000,
            vote_sample_size: 1_000,
            timeout_secs: 30,
        }
    }
}

impl SnapshotConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Request pacing and retry settings for one price source.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub base_url: String,
    pub request_delay_ms: u64,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub rate_limit_backoff_ms: u64,
    pub max_batch_days: usize,
    pub timeout_secs: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_delay_ms: 1_000,
            max_attempts: 3,
            base_backoff_ms: 2_000,
            max_backoff_ms: 60_000,
            rate_limit_backoff_ms: 30_000,
            max_batch_days: 90,
            timeout_secs: 30,
        }
    }
}

impl SourceConfig {
    pub fn coingecko() -> Self {
        Self {
            base_url: "https://api.coingecko.com/api/v3".to_string(),
            request_delay_ms: 15_000,
            max_attempts: 3,
            rate_limit_backoff_ms: 60_000,
            max_batch_days: 90,
            ..Self::default()
        }
    }

    pub fn yahoo() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            request_delay_ms: 1_000,
            max_attempts: 5,
            max_batch_days: 365,
            ..Self::default()
        }
    }

    pub fn binance() -> Self {
        Self {
            base_url: "https://api.binance.com".to_string(),
            request_delay_ms: 2_000,
            max_attempts: 3,
            max_batch_days: 1_000,
            ..Self::default()
        }
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Fields set in a `sources.<name>` section; the rest keep that source's defaults.
#[derive(Debug, Deserialize)]
struct SourceOverrides {
    base_url: Option<String>,
    request_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
    base_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
    rate_limit_backoff_ms: Option<u64>,
    max_batch_days: Option<usize>,
    timeout_secs: Option<u64>,
}

impl SourceOverrides {
    fn apply(self, base: SourceConfig) -> SourceConfig {
        SourceConfig {
            base_url: self.base_url.unwrap_or(base.base_url),
            request_delay_ms: self.request_delay_ms.unwrap_or(base.request_delay_ms),
            max_attempts: self.max_attempts.unwrap_or(base.max_attempts),
            base_backoff_ms: self.base_backoff_ms.unwrap_or(base.base_backoff_ms),
            max_backoff_ms: self.max_backoff_ms.unwrap_or(base.max_backoff_ms),
            rate_limit_backoff_ms: self
                .rate_limit_backoff_ms
                .unwrap_or(base.rate_limit_backoff_ms),
            max_batch_days: self.max_batch_days.unwrap_or(base.max_batch_days),
            timeout_secs: self.timeout_secs.unwrap_or(base.timeout_secs),
        }
    }
}

fn coingecko_source<'de, D: Deserializer<'de>>(d: D) -> Result<SourceConfig, D::Error> {
    Ok(SourceOverrides::deserialize(d)?.apply(SourceConfig::coingecko()))
}

fn yahoo_source<'de, D: Deserializer<'de>>(d: D) -> Result<SourceConfig, D::Error> {
    Ok(SourceOverrides::deserialize(d)?.apply(SourceConfig::yahoo()))
}

fn binance_source<'de, D: Deserializer<'de>>(d: D) -> Result<SourceConfig, D::Error> {
    Ok(SourceOverrides::deserialize(d)?.apply(SourceConfig::binance()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Fallback order; earlier sources win for the days they supply.
    pub priority: Vec<PriceSource>,
    #[serde(deserialize_with = "coingecko_source")]
    pub coingecko: SourceConfig,
    #[serde(deserialize_with = "yahoo_source")]
    pub yahoo: SourceConfig,
    #[serde(deserialize_with = "binance_source")]
    pub binance: SourceConfig,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            priority: vec![PriceSource::CoinGecko, PriceSource::Yahoo, PriceSource::Binance],
            coingecko: SourceConfig::coingecko(),
            yahoo: SourceConfig::yahoo(),
            binance: SourceConfig::binance(),
        }
    }
}

impl SourcesConfig {
    pub fn get(&self, source: PriceSource) -> &SourceConfig {
        match source {
            PriceSource::CoinGecko => &self.coingecko,
            PriceSource::Yahoo => &self.yahoo,
            PriceSource::Binance => &self.binance,
        }
    }
}

/// Random extra delay added to every price request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterConfig {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for JitterConfig {
    fn default() -> Self {
        Self {
            min_ms: 500,
            max_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Per-category weight; absent categories weigh 1.0.
    pub weights: BTreeMap<Category, f64>,
}

impl AppConfig {
    /// First CLI argument, else `ACTIVIST_CONFIG_PATH`, else `activist.yaml`.
    pub fn resolve_path(cli_arg: Option<String>) -> PathBuf {
        cli_arg
            .or_else(|| env::var(CONFIG_PATH_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
            .into()
    }

    /// Reads the YAML file and applies environment overrides.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        config.apply_overrides(|key| env::var(key).ok());

        info!(
            path = %path.display(),
            daos = config.daos.len(),
            threshold = config.activist_threshold,
            output_dir = %config.output.dir.display(),
            "Activist config loaded"
        );

        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// Applies `ACTIVIST_*` overrides read through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(value) = lookup("ACTIVIST_THRESHOLD") {
            match value.trim().parse::<f64>() {
                Ok(threshold) => self.activist_threshold = threshold,
                Err(err) => {
                    warn!(error = %err, value, "Failed to parse ACTIVIST_THRESHOLD override");
                }
            }
        }

        if let Some(value) = lookup("ACTIVIST_OUTPUT_DIR") {
            if !value.trim().is_empty() {
                self.output.dir = PathBuf::from(value);
            }
        }

        if let Some(value) = lookup("ACTIVIST_SNAPSHOT_ENDPOINT") {
            if !value.trim().is_empty() {
                self.snapshot.endpoint = value;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.daos.is_empty() {
            return Err(ConfigError::NoDaos);
        }
        if let Some(index) = self.daos.iter().position(|d| d.space.trim().is_empty()) {
            return Err(ConfigError::BlankSpace(index));
        }

        if !(0.0..=1.0).contains(&self.activist_threshold) {
            return Err(ConfigError::InvalidThreshold(self.activist_threshold));
        }

        if self.window.days_before > MAX_WINDOW_SIDE_DAYS
            || self.window.days_after > MAX_WINDOW_SIDE_DAYS
        {
            return Err(ConfigError::InvalidWindow(format!(
                "each side is limited to {MAX_WINDOW_SIDE_DAYS} days"
            )));
        }

        if self.snapshot.endpoint.trim().is_empty() {
            return Err(ConfigError::InvalidSnapshot("empty endpoint".to_string()));
        }
        if self.snapshot.page_size == 0 {
            return Err(ConfigError::InvalidSnapshot("page_size must be positive".to_string()));
        }

        if self.sources.priority.is_empty() {
            return Err(ConfigError::InvalidPriority("no sources listed".to_string()));
        }
        let mut seen = HashSet::new();
        for source in &self.sources.priority {
            if !seen.insert(*source) {
                return Err(ConfigError::InvalidPriority(format!("{source} listed twice")));
            }
            validate_source(*source, self.sources.get(*source))?;
        }

        if self.jitter.min_ms > self.jitter.max_ms {
            return Err(ConfigError::InvalidJitter {
                min_ms: self.jitter.min_ms,
                max_ms: self.jitter.max_ms,
            });
        }

        for (category, weight) in &self.classifier.weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(ConfigError::InvalidWeight {
                    category: *category,
                    weight: *weight,
                });
            }
        }

        Ok(())
    }
}

fn validate_source(source: PriceSource, config: &SourceConfig) -> Result<(), ConfigError> {
    let reason = if config.base_url.trim().is_empty() {
        Some("empty base_url")
    } else if config.max_attempts == 0 {
        Some("max_attempts must be positive")
    } else if config.max_batch_days == 0 {
        Some("max_batch_days must be positive")
    } else if config.base_backoff_ms > config.max_backoff_ms {
        Some("base_backoff_ms exceeds max_backoff_ms")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ConfigError::InvalidSource {
            price_source: source,
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}
