use crate::core::error::FetchError;
use crate::core::series::{Adjustment, HistoryProvider, Period, ProviderKind, RawBar, RawSeries};
use crate::providers::util::{is_isin, with_retry};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Yahoo Finance chart API adapter.
///
/// Serves two different shapes of data. For US mutual funds the `adjclose`
/// column already embeds distributions, so the series is marked adjusted.
/// Everything else uses the raw `close` column plus the dividend and capital
/// gain events Yahoo reports separately.
pub struct YahooProvider {
    base_url: String,
    client: reqwest::Client,
}

impl YahooProvider {
    pub fn new(base_url: &str) -> Self {
        YahooProvider {
            base_url: base_url.to_string(),
            client: reqwest::Client::builder()
                .user_agent("fundcmp/0.4")
                .build()
                .unwrap_or_default(),
        }
    }
}

/// US mutual funds: a US ISIN, or the classic five-letter ticker ending in X.
fn is_us_mutual_fund(identifier: &str) -> bool {
    (is_isin(identifier) && identifier.starts_with("US"))
        || (identifier.len() == 5
            && identifier.ends_with('X')
            && identifier.chars().all(|c| c.is_ascii_alphabetic()))
}

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Deserialize, Debug)]
struct ChartResult {
    result: Option<Vec<ChartItem>>,
}

#[derive(Deserialize, Debug)]
struct ChartItem {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
    events: Option<Events>,
}

#[derive(Deserialize, Debug)]
struct Indicators {
    quote: Vec<Quote>,
    adjclose: Option<Vec<AdjClose>>,
}

#[derive(Deserialize, Debug)]
struct Quote {
    close: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct AdjClose {
    adjclose: Option<Vec<Option<f64>>>,
}

#[derive(Deserialize, Debug)]
struct Events {
    #[serde(default)]
    dividends: HashMap<String, Distribution>,
    #[serde(default, rename = "capitalGains")]
    capital_gains: HashMap<String, Distribution>,
}

#[derive(Deserialize, Debug)]
struct Distribution {
    date: i64,
    amount: f64,
}

fn timestamp_to_date(ts: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

fn distributions_by_date(events: &HashMap<String, Distribution>) -> HashMap<NaiveDate, f64> {
    events
        .values()
        .filter_map(|d| timestamp_to_date(d.date).map(|date| (date, d.amount)))
        .collect()
}

#[async_trait]
impl HistoryProvider for YahooProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Yahoo
    }

    #[instrument(name = "YahooHistoryFetch", skip(self), fields(instrument = %instrument))]
    async fn fetch_history(
        &self,
        instrument: &str,
        period: &Period,
    ) -> Result<RawSeries, FetchError> {
        let kind = self.kind();
        let (start, end) = period.date_range(Utc::now().date_naive());
        let period1 = start.and_time(NaiveTime::MIN).and_utc().timestamp();
        let period2 = end
            .succ_opt()
            .unwrap_or(end)
            .and_time(NaiveTime::MIN)
            .and_utc()
            .timestamp();

        let url = format!(
            "{}/v8/finance/chart/{}?period1={}&period2={}&interval=1d&events=div%7CcapitalGains",
            self.base_url, instrument, period1, period2
        );
        debug!("Requesting price history from {}", url);

        let response = with_retry(|| self.client.get(&url).send(), 2, 200)
            .await
            .map_err(|e| FetchError::unavailable(kind, format!("request error: {e}")))?;
        if !response.status().is_success() {
            return Err(FetchError::unavailable(
                kind,
                format!("HTTP {} for {instrument}", response.status()),
            ));
        }

        let data = response
            .json::<ChartResponse>()
            .await
            .map_err(|e| FetchError::malformed(kind, format!("undecodable chart payload: {e}")))?;
        let item = data
            .chart
            .result
            .and_then(|mut r| if r.is_empty() { None } else { Some(r.remove(0)) })
            .ok_or_else(|| {
                FetchError::unavailable(kind, format!("no chart data for {instrument}"))
            })?;

        let timestamps = item.timestamp.unwrap_or_default();
        let use_adjclose = is_us_mutual_fund(instrument);
        let prices: Vec<Option<f64>> = if use_adjclose {
            item.indicators
                .adjclose
                .and_then(|mut a| a.first_mut().and_then(|a| a.adjclose.take()))
                .ok_or_else(|| FetchError::malformed(kind, "missing adjclose column"))?
        } else {
            item.indicators
                .quote
                .into_iter()
                .next()
                .and_then(|q| q.close)
                .ok_or_else(|| FetchError::malformed(kind, "missing close column"))?
        };

        let (dividends, capital_gains) = match &item.events {
            Some(events) => (
                distributions_by_date(&events.dividends),
                distributions_by_date(&events.capital_gains),
            ),
            None => (HashMap::new(), HashMap::new()),
        };

        let bars = timestamps
            .iter()
            .zip(prices)
            .filter_map(|(ts, price)| {
                let date = timestamp_to_date(*ts)?;
                Some(RawBar {
                    date,
                    price,
                    dividend: dividends.get(&date).copied(),
                    capital_gain: capital_gains.get(&date).copied(),
                })
            })
            .collect();

        Ok(RawSeries {
            source: kind,
            adjustment: if use_adjclose {
                Adjustment::Embedded
            } else {
                Adjustment::Separate
            },
            bars,
        })
    }
}
