use anyhow::Result;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::{
    config::{JitterConfig, SourcesConfig},
    models::prices::{PriceRecord, PriceSeries, PriceSource, PriceWindow, TokenMapping},
};

pub mod checkpoint;
pub mod providers;
pub mod retry;

use checkpoint::Checkpoint;
use providers::{PriceProvider, build_provider};
use retry::{RateLimiter, RetryPolicy};

/// A provider with its own pacing and retry schedule.
pub struct SourceSlot {
    pub provider: Box<dyn PriceProvider>,
    pub retry: RetryPolicy,
    pub limiter: RateLimiter,
    pub max_batch_days: usize,
}

impl SourceSlot {
    fn source(&self) -> PriceSource {
        self.provider.source()
    }
}

/// Multi-source daily price collection with per-day fallback.
///
/// Sources are tried in slot order. Each one is asked only for the days still
/// missing, so the resulting series may mix sources. A source that fails a
/// batch after its retries is dropped for the rest of the series.
pub struct PriceCollector {
    slots: Vec<SourceSlot>,
}

impl PriceCollector {
    pub fn new(slots: Vec<SourceSlot>) -> Self {
        Self { slots }
    }

    pub fn from_config(sources: &SourcesConfig, jitter: &JitterConfig) -> Result<Self> {
        let slots = sources
            .priority
            .iter()
            .map(|source| {
                let config = sources.get(*source);
                Ok(SourceSlot {
                    provider: build_provider(*source, config)?,
                    retry: RetryPolicy::from_source(config),
                    limiter: RateLimiter::new(config.request_delay(), jitter),
                    max_batch_days: config.max_batch_days.max(1),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::new(slots))
    }

    /// Best-effort series for `token` over `window`. Progress is recorded in
    /// `checkpoint` under `key` after every successful batch; days already
    /// there are not requested again.
    #[instrument(skip(self, token, checkpoint), fields(symbol = %token.symbol))]
    pub async fn collect(
        &self,
        key: &str,
        token: &TokenMapping,
        window: PriceWindow,
        checkpoint: &mut Checkpoint,
    ) -> PriceSeries {
        let mut days: BTreeMap<NaiveDate, PriceRecord> = checkpoint
            .days_for(key)
            .into_iter()
            .filter(|(date, _)| window.contains(*date))
            .collect();
        if !days.is_empty() {
            info!(key, resumed_days = days.len(), "Resuming from checkpoint");
        }

        for slot in &self.slots {
            let source = slot.source();
            let missing: Vec<NaiveDate> =
                window.days().filter(|d| !days.contains_key(d)).collect();
            if missing.is_empty() {
                break;
            }
            let Some(id) = token.identifier(source) else {
                debug!(key, %source, "No identifier for source, skipping");
                continue;
            };

            for (start, end) in contiguous_batches(&missing, slot.max_batch_days) {
                let label = format!("{source}:{key}");
                let fetched = slot
                    .retry
                    .run(&label, move || async move {
                        slot.limiter.acquire().await;
                        slot.provider.fetch_daily(id, start, end).await
                    })
                    .await;

                let records = match fetched {
                    Ok(records) => records,
                    Err(err) => {
                        warn!(key, %source, %start, %end, error = %err, "Source failed, falling back");
                        break;
                    }
                };

                let new: Vec<PriceRecord> = records
                    .into_iter()
                    .filter(|r| r.date >= start && r.date <= end && !days.contains_key(&r.date))
                    .collect();
                debug!(key, %source, %start, %end, records = new.len(), "Batch fetched");

                if let Err(err) = checkpoint.record_days(key, &new) {
                    warn!(key, error = ?err, "Failed to persist checkpoint");
                }
                for record in new {
                    days.insert(record.date, record);
                }
            }
        }

        let series = PriceSeries::from_days(token.symbol.clone(), window, days);
        if series.is_empty() {
            warn!(key, window_days = window.day_count(), "No price data from any source");
        } else {
            let gaps = series.gaps().len();
            info!(key, records = series.len(), gaps, "Price series collected");
        }
        series
    }
}

/// Splits ascending `days` into contiguous `(start, end)` runs of at most
/// `max_len` days.
pub fn contiguous_batches(days: &[NaiveDate], max_len: usize) -> Vec<(NaiveDate, NaiveDate)> {
    let max_len = max_len.max(1);
    let mut batches = Vec::new();
    let mut iter = days.iter().copied();
    let Some(first) = iter.next() else {
        return batches;
    };

    let (mut start, mut end, mut len) = (first, first, 1);
    for day in iter {
        if end.succ_opt() == Some(day) && len < max_len {
            end = day;
            len += 1;
        } else {
            batches.push((start, end));
            (start, end, len) = (day, day, 1);
        }
    }
    batches.push((start, end));
    batches
}
