use crate::core::error::FetchError;
use crate::core::series::{Adjustment, HistoryProvider, Period, ProviderKind, RawBar, RawSeries};
use crate::providers::util::with_retry;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// Alpha Vantage TIME_SERIES_DAILY_ADJUSTED adapter. Adjusted closes embed
/// distributions, so the series is always marked adjusted. The API keys
/// every numeric field as a string.
pub struct AlphaVantageProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AlphaVantageProvider {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        AlphaVantageProvider {
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::builder()
                .user_agent("fundcmp/0.4")
                .build()
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct DailyResponse {
    #[serde(rename = "Time Series (Daily)")]
    series: Option<HashMap<NaiveDate, DailyBar>>,
    /// Rate-limit and error payloads come back as 200s with a note
    #[serde(rename = "Note")]
    note: Option<String>,
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Deserialize, Debug)]
struct DailyBar {
    #[serde(rename = "5. adjusted close")]
    adjusted_close: String,
}

#[async_trait]
impl HistoryProvider for AlphaVantageProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AlphaVantage
    }

    #[instrument(name = "AlphaVantageHistoryFetch", skip(self), fields(instrument = %instrument))]
    async fn fetch_history(
        &self,
        instrument: &str,
        period: &Period,
    ) -> Result<RawSeries, FetchError> {
        let kind = self.kind();
        let (start, end) = period.date_range(Utc::now().date_naive());

        let url = format!(
            "{}/query?function=TIME_SERIES_DAILY_ADJUSTED&symbol={}&outputsize=full&apikey={}",
            self.base_url, instrument, self.api_key
        );
        debug!("Requesting daily series for {instrument}");

        let response = with_retry(|| self.client.get(&url).send(), 2, 200)
            .await
            .map_err(|e| FetchError::unavailable(kind, format!("request error: {e}")))?;
        if !response.status().is_success() {
            return Err(FetchError::unavailable(
                kind,
                format!("HTTP {} for {instrument}", response.status()),
            ));
        }

        let data: DailyResponse = response
            .json()
            .await
            .map_err(|e| FetchError::malformed(kind, format!("undecodable payload: {e}")))?;
        if let Some(message) = data.note.or(data.error_message) {
            return Err(FetchError::unavailable(kind, message));
        }
        let series = data
            .series
            .filter(|s| !s.is_empty())
            .ok_or_else(|| FetchError::unavailable(kind, format!("no data for {instrument}")))?;

        // The API ignores date ranges; trim to the requested window here
        let bars = series
            .into_iter()
            .filter(|(date, _)| *date >= start && *date <= end)
            .map(|(date, bar)| {
                let price = bar.adjusted_close.parse::<f64>().map_err(|_| {
                    FetchError::malformed(
                        kind,
                        format!("unparseable adjusted close on {date}: {}", bar.adjusted_close),
                    )
                })?;
                Ok(RawBar {
                    date,
                    price: Some(price),
                    dividend: None,
                    capital_gain: None,
                })
            })
            .collect::<Result<Vec<_>, FetchError>>()?;

        Ok(RawSeries {
            source: kind,
            adjustment: Adjustment::Embedded,
            bars,
        })
    }
}
