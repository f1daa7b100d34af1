use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::{collections::BTreeMap, time::Duration};
use tracing::{debug, instrument};

use crate::{
    config::SourceConfig,
    errors::SourceError,
    http::JsonHttp,
    models::prices::{PriceRecord, PriceSource},
};

const BINANCE_KLINE_LIMIT: usize = 1000;

/// One external market-data API.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    fn source(&self) -> PriceSource;

    /// Daily records for `id` between `start` and `end` inclusive. Days the
    /// source has no data for are absent from the result.
    async fn fetch_daily(
        &self,
        id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, SourceError>;
}

/// Builds the provider for `source` from its config section.
pub fn build_provider(source: PriceSource, config: &SourceConfig) -> Result<Box<dyn PriceProvider>> {
    let http = JsonHttp::new(&config.base_url, config.timeout())?;
    Ok(match source {
        PriceSource::CoinGecko => Box::new(CoinGeckoProvider { http }),
        PriceSource::Yahoo => Box::new(YahooProvider { http }),
        PriceSource::Binance => Box::new(BinanceProvider { http }),
    })
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// First instant after `date`.
fn day_after(date: NaiveDate) -> DateTime<Utc> {
    day_start(date) + ChronoDuration::days(1)
}

fn date_of_millis(ms: f64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ms as i64).map(|dt| dt.date_naive())
}

/// CoinGecko `market_chart/range`.
pub struct CoinGeckoProvider {
    http: JsonHttp,
}

impl CoinGeckoProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: JsonHttp::new(base_url, timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct MarketChart {
    #[serde(default)]
    prices: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    total_volumes: Vec<(f64, Option<f64>)>,
    #[serde(default)]
    market_caps: Vec<(f64, Option<f64>)>,
}

/// Collapses `[ms, value]` samples to one value per UTC day; the last sample
/// of a day wins.
fn last_per_day(samples: &[(f64, Option<f64>)]) -> BTreeMap<NaiveDate, f64> {
    let mut ordered: Vec<_> = samples
        .iter()
        .filter_map(|(ms, v)| v.map(|v| (*ms, v)))
        .collect();
    ordered.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut days = BTreeMap::new();
    for (ms, value) in ordered {
        if let Some(date) = date_of_millis(ms) {
            days.insert(date, value);
        }
    }
    days
}

#[async_trait]
impl PriceProvider for CoinGeckoProvider {
    fn source(&self) -> PriceSource {
        PriceSource::CoinGecko
    }

    #[instrument(skip(self), fields(source = "coingecko"))]
    async fn fetch_daily(
        &self,
        id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, SourceError> {
        let query = [
            ("vs_currency", "usd".to_string()),
            ("from", day_start(start).timestamp().to_string()),
            ("to", (day_after(end).timestamp() - 1).to_string()),
        ];
        let chart: MarketChart = self
            .http
            .get(&format!("/coins/{id}/market_chart/range"), &query)
            .await?;

        let prices = last_per_day(&chart.prices);
        let volumes = last_per_day(&chart.total_volumes);
        let caps = last_per_day(&chart.market_caps);

        let records: Vec<_> = prices
            .range(start..=end)
            .map(|(date, price)| {
                PriceRecord::daily(
                    *date,
                    *price,
                    volumes.get(date).copied().unwrap_or(0.0),
                    caps.get(date).copied().unwrap_or(0.0),
                    PriceSource::CoinGecko,
                )
            })
            .collect();

        debug!(id, records = records.len(), "Fetched market chart");
        Ok(records)
    }
}

/// Yahoo Finance v8 chart API.
pub struct YahooProvider {
    http: JsonHttp,
}

impl YahooProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: JsonHttp::new(base_url, timeout)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    #[serde(default)]
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct YahooQuote {
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[async_trait]
impl PriceProvider for YahooProvider {
    fn source(&self) -> PriceSource {
        PriceSource::Yahoo
    }

    #[instrument(skip(self), fields(source = "yahoo"))]
    async fn fetch_daily(
        &self,
        id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, SourceError> {
        let query = [
            ("period1", day_start(start).timestamp().to_string()),
            ("period2", day_after(end).timestamp().to_string()),
            ("interval", "1d".to_string()),
        ];
        let response: YahooChartResponse =
            self.http.get(&format!("/v8/finance/chart/{id}"), &query).await?;

        if let Some(error) = response.chart.error.filter(|e| !e.is_null()) {
            return Err(SourceError::Permanent(format!("chart error: {error}")));
        }
        let Some(result) = response.chart.result.and_then(|r| r.into_iter().next()) else {
            return Ok(Vec::new());
        };
        let quote = result.indicators.quote.into_iter().next().unwrap_or_default();

        let mut days = BTreeMap::new();
        for (i, ts) in result.timestamp.iter().enumerate() {
            let Some(close) = quote.close.get(i).copied().flatten() else {
                continue;
            };
            let Some(date) = DateTime::from_timestamp(*ts, 0).map(|dt| dt.date_naive()) else {
                continue;
            };
            if date < start || date > end {
                continue;
            }
            let volume = quote.volume.get(i).copied().flatten().unwrap_or(0.0);
            days.insert(
                date,
                PriceRecord::daily(date, close, volume * close, 0.0, PriceSource::Yahoo),
            );
        }

        debug!(id, records = days.len(), "Fetched chart");
        Ok(days.into_values().collect())
    }
}

/// Binance spot klines.
pub struct BinanceProvider {
    http: JsonHttp,
}

impl BinanceProvider {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http: JsonHttp::new(base_url, timeout)?,
        })
    }
}

fn kline_number(row: &[Value], index: usize) -> Option<f64> {
    match row.get(index)? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

#[async_trait]
impl PriceProvider for BinanceProvider {
    fn source(&self) -> PriceSource {
        PriceSource::Binance
    }

    #[instrument(skip(self), fields(source = "binance"))]
    async fn fetch_daily(
        &self,
        id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceRecord>, SourceError> {
        let query = [
            ("symbol", id.to_string()),
            ("interval", "1d".to_string()),
            ("startTime", day_start(start).timestamp_millis().to_string()),
            ("endTime", (day_after(end).timestamp_millis() - 1).to_string()),
            ("limit", BINANCE_KLINE_LIMIT.to_string()),
        ];
        let rows: Vec<Vec<Value>> = self.http.get("/api/v3/klines", &query).await?;

        let mut days = BTreeMap::new();
        for row in &rows {
            let (Some(open_ms), Some(close)) = (kline_number(row, 0), kline_number(row, 4)) else {
                continue;
            };
            let Some(date) = date_of_millis(open_ms) else {
                continue;
            };
            if date < start || date > end {
                continue;
            }
            let volume = kline_number(row, 5).unwrap_or(0.0);
            days.insert(
                date,
                PriceRecord::daily(date, close, volume * close, 0.0, PriceSource::Binance),
            );
        }

        debug!(id, records = days.len(), "Fetched klines");
        Ok(days.into_values().collect())
    }
}
