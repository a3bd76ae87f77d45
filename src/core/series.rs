//! Canonical price series model and the provider contract

use crate::core::error::FetchError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Upstream data sources, in the order new ones tend to get added.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    Yahoo,
    Eodhd,
    AlphaVantage,
}

impl Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ProviderKind::Yahoo => "yahoo",
                ProviderKind::Eodhd => "eodhd",
                ProviderKind::AlphaVantage => "alpha-vantage",
            }
        )
    }
}

/// Whether a provider's price column already embeds distributions.
///
/// Declared once by the adapter that fetched the data; the normalizer treats
/// it as the single source of truth and nothing downstream re-derives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Prices include reinvested dividends/capital gains.
    Embedded,
    /// Prices are raw closes; distributions arrive in separate columns.
    Separate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    OneMonth,
    ThreeMonths,
    SixMonths,
    OneYear,
    TwoYears,
    FiveYears,
    Range(NaiveDate, NaiveDate),
}

impl Period {
    /// Resolves the period into a concrete [start, end] date range.
    pub fn date_range(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = match self {
            Period::OneMonth => today - Duration::days(30),
            Period::ThreeMonths => today - Duration::days(91),
            Period::SixMonths => today - Duration::days(182),
            Period::OneYear => today - Duration::days(365),
            Period::TwoYears => today - Duration::days(365 * 2),
            Period::FiveYears => today - Duration::days(365 * 5),
            Period::Range(start, end) => return (*start, *end),
        };
        (start, today)
    }
}

impl Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Period::OneMonth => write!(f, "1m"),
            Period::ThreeMonths => write!(f, "3m"),
            Period::SixMonths => write!(f, "6m"),
            Period::OneYear => write!(f, "1y"),
            Period::TwoYears => write!(f, "2y"),
            Period::FiveYears => write!(f, "5y"),
            Period::Range(start, end) => write!(f, "{start}:{end}"),
        }
    }
}

impl FromStr for Period {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" => Ok(Period::OneMonth),
            "3m" => Ok(Period::ThreeMonths),
            "6m" => Ok(Period::SixMonths),
            "1y" => Ok(Period::OneYear),
            "2y" => Ok(Period::TwoYears),
            "5y" => Ok(Period::FiveYears),
            other => {
                if let Some((from, to)) = other.split_once(':') {
                    let start = NaiveDate::parse_from_str(from, "%Y-%m-%d")?;
                    let end = NaiveDate::parse_from_str(to, "%Y-%m-%d")?;
                    if start >= end {
                        anyhow::bail!("Period start {start} must be before end {end}");
                    }
                    Ok(Period::Range(start, end))
                } else {
                    Err(anyhow::anyhow!(
                        "Invalid period: {s}. Use 1m, 3m, 6m, 1y, 2y, 5y or YYYY-MM-DD:YYYY-MM-DD"
                    ))
                }
            }
        }
    }
}

/// One daily bar as reported by a provider, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBar {
    pub date: NaiveDate,
    pub price: Option<f64>,
    pub dividend: Option<f64>,
    pub capital_gain: Option<f64>,
}

/// Untrusted provider output handed to the normalizer.
#[derive(Debug, Clone)]
pub struct RawSeries {
    pub source: ProviderKind,
    pub adjustment: Adjustment,
    pub bars: Vec<RawBar>,
}

/// One calendar day of the canonical series.
///
/// When `is_adjusted` is true, `dividend` and `capital_gain` are always 0.0;
/// the distribution is already folded into `price`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub price: f64,
    #[serde(default)]
    pub dividend: f64,
    #[serde(default)]
    pub capital_gain: f64,
    pub is_adjusted: bool,
}

/// Normalized daily history for one instrument over one period.
///
/// Never mutated after construction; a fresher fetch produces a new series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalSeries {
    pub instrument: String,
    pub source: ProviderKind,
    pub is_adjusted: bool,
    pub bars: Vec<PriceBar>,
    pub fetched_at: DateTime<Utc>,
}

impl CanonicalSeries {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}

#[async_trait]
pub trait HistoryProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Fetches raw daily bars for an instrument and period.
    ///
    /// Network I/O only; no caching, no normalization. Network, auth and
    /// empty-result failures surface as `SourceUnavailable`, undecodable
    /// payloads as `MalformedData`; the orchestrator treats both as a cue
    /// to fall back without inspecting provider specifics.
    async fn fetch_history(&self, instrument: &str, period: &Period)
    -> Result<RawSeries, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_roundtrip() {
        for s in ["1m", "3m", "6m", "1y", "2y", "5y"] {
            let period: Period = s.parse().unwrap();
            assert_eq!(period.to_string(), s);
        }
        // Case insensitive
        assert_eq!("1Y".parse::<Period>().unwrap(), Period::OneYear);
    }

    #[test]
    fn test_period_explicit_range() {
        let period: Period = "2023-01-01:2023-06-30".parse().unwrap();
        let Period::Range(start, end) = period else {
            panic!("Expected an explicit range");
        };
        assert_eq!(start, NaiveDate::from_ymd_opt(2023, 1, 1).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2023, 6, 30).unwrap());

        // Inverted range is rejected
        assert!("2023-06-30:2023-01-01".parse::<Period>().is_err());
        assert!("13m".parse::<Period>().is_err());
    }

    #[test]
    fn test_period_date_range() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        let (start, end) = Period::OneYear.date_range(today);
        assert_eq!(end, today);
        assert_eq!(start, today - Duration::days(365));
    }
}
