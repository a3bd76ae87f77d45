use crate::core::error::FetchError;
use crate::core::series::{Adjustment, HistoryProvider, Period, ProviderKind, RawBar, RawSeries};
use crate::providers::util::with_retry;
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use tracing::{debug, instrument};

/// EOD Historical Data adapter. The `adjusted_close` column already embeds
/// dividends and splits, so the series is always marked adjusted.
pub struct EodhdProvider {
    base_url: String,
    api_token: String,
    client: reqwest::Client,
}

impl EodhdProvider {
    pub fn new(base_url: &str, api_token: &str) -> Self {
        EodhdProvider {
            base_url: base_url.to_string(),
            api_token: api_token.to_string(),
            client: reqwest::Client::builder()
                .user_agent("fundcmp/0.4")
                .build()
                .unwrap_or_default(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct EodBar {
    date: NaiveDate,
    adjusted_close: Option<f64>,
}

#[async_trait]
impl HistoryProvider for EodhdProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Eodhd
    }

    #[instrument(name = "EodhdHistoryFetch", skip(self), fields(instrument = %instrument))]
    async fn fetch_history(
        &self,
        instrument: &str,
        period: &Period,
    ) -> Result<RawSeries, FetchError> {
        let kind = self.kind();
        let (start, end) = period.date_range(Utc::now().date_naive());

        let url = format!(
            "{}/api/eod/{}?api_token={}&fmt=json&period=d&from={}&to={}",
            self.base_url, instrument, self.api_token, start, end
        );
        debug!("Requesting price history from {}/api/eod/{}", self.base_url, instrument);

        let response = with_retry(|| self.client.get(&url).send(), 2, 200)
            .await
            .map_err(|e| FetchError::unavailable(kind, format!("request error: {e}")))?;
        if !response.status().is_success() {
            return Err(FetchError::unavailable(
                kind,
                format!("HTTP {} for {instrument}", response.status()),
            ));
        }

        let bars: Vec<EodBar> = response
            .json()
            .await
            .map_err(|e| FetchError::malformed(kind, format!("undecodable payload: {e}")))?;
        if bars.is_empty() {
            return Err(FetchError::unavailable(
                kind,
                format!("no data for {instrument}"),
            ));
        }

        Ok(RawSeries {
            source: kind,
            adjustment: Adjustment::Embedded,
            bars: bars
                .into_iter()
                .map(|bar| RawBar {
                    date: bar.date,
                    price: bar.adjusted_close,
                    dividend: None,
                    capital_gain: None,
                })
                .collect(),
        })
    }
}
