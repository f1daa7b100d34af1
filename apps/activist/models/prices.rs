use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    CoinGecko,
    Yahoo,
    Binance,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::CoinGecko => "coingecko",
            PriceSource::Yahoo => "yahoo",
            PriceSource::Binance => "binance",
        }
    }
}

impl fmt::Display for PriceSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-source identifiers for a DAO's governance token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenMapping {
    pub symbol: String,
    pub coingecko_id: Option<String>,
    pub yahoo_symbol: Option<String>,
    pub binance_symbol: Option<String>,
}

impl TokenMapping {
    pub fn identifier(&self, source: PriceSource) -> Option<&str> {
        let id = match source {
            PriceSource::CoinGecko => self.coingecko_id.as_deref(),
            PriceSource::Yahoo => self.yahoo_symbol.as_deref(),
            PriceSource::Binance => self.binance_symbol.as_deref(),
        };
        id.filter(|s| !s.trim().is_empty())
    }
}

/// One day of market data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub timestamp_ms: i64,
    pub price_usd: f64,
    pub volume_usd: f64,
    pub market_cap_usd: f64,
    pub source: PriceSource,
}

impl PriceRecord {
    /// Record stamped at UTC midnight of `date`.
    pub fn daily(
        date: NaiveDate,
        price_usd: f64,
        volume_usd: f64,
        market_cap_usd: f64,
        source: PriceSource,
    ) -> Self {
        Self {
            date,
            timestamp_ms: date.and_time(NaiveTime::MIN).and_utc().timestamp_millis(),
            price_usd,
            volume_usd,
            market_cap_usd,
            source,
        }
    }

    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp_ms)
    }
}

/// Inclusive range of UTC dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PriceWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// `days_before`/`days_after` around the creation date, never past `today`.
    pub fn around(
        created: DateTime<Utc>,
        days_before: u32,
        days_after: u32,
        today: NaiveDate,
    ) -> Option<Self> {
        let anchor = created.date_naive();
        let start = anchor - Duration::days(i64::from(days_before));
        let end = (anchor + Duration::days(i64::from(days_after))).min(today);
        Self::new(start, end)
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.start.iter_days().take_while(move |d| *d <= self.end)
    }

    pub fn day_count(&self) -> usize {
        ((self.end - self.start).num_days() + 1) as usize
    }
}

/// Daily records for one token over one window.
///
/// Dates are unique and ascending. Days no source could supply are simply
/// absent; no cross-source consistency is enforced.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    pub token: String,
    pub window: PriceWindow,
    records: Vec<PriceRecord>,
}

impl PriceSeries {
    pub fn from_days(
        token: impl Into<String>,
        window: PriceWindow,
        days: BTreeMap<NaiveDate, PriceRecord>,
    ) -> Self {
        let records = days
            .into_values()
            .filter(|r| window.contains(r.date))
            .collect();
        Self {
            token: token.into(),
            window,
            records,
        }
    }

    pub fn records(&self) -> &[PriceRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn gaps(&self) -> Vec<NaiveDate> {
        let mut present = self.records.iter().map(|r| r.date).peekable();
        self.window
            .days()
            .filter(|day| {
                while present.peek().is_some_and(|d| d < day) {
                    present.next();
                }
                present.peek() != Some(day)
            })
            .collect()
    }

    pub fn source_counts(&self) -> BTreeMap<PriceSource, usize> {
        let mut counts = BTreeMap::new();
        for record in &self.records {
            *counts.entry(record.source).or_insert(0) += 1;
        }
        counts
    }
}
