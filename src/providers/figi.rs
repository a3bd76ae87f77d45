use crate::core::cache::{KeyValueStore, get_record, put_record};
use crate::core::metadata::{InstrumentMeta, MetadataResolver};
use crate::providers::util::{is_isin, with_retry};
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

const META_TTL_DAYS: i64 = 7;

/// OpenFIGI mapping API resolver. Names and categories change rarely, so
/// results are cached for a week. Failures here never fail a command;
/// callers fall back to the raw identifier.
pub struct FigiResolver {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
    store: Arc<dyn KeyValueStore>,
}

impl FigiResolver {
    pub fn new(base_url: &str, api_key: Option<String>, store: Arc<dyn KeyValueStore>) -> Self {
        FigiResolver {
            base_url: base_url.to_string(),
            api_key,
            client: reqwest::Client::builder()
                .user_agent("fundcmp/0.4")
                .build()
                .unwrap_or_default(),
            store,
        }
    }
}

#[derive(Deserialize, Debug)]
struct MappingResult {
    #[serde(default)]
    data: Vec<MappingItem>,
}

#[derive(Deserialize, Debug)]
struct MappingItem {
    name: Option<String>,
    #[serde(rename = "securityType2")]
    security_type: Option<String>,
}

#[async_trait]
impl MetadataResolver for FigiResolver {
    async fn resolve(&self, identifier: &str) -> Result<InstrumentMeta> {
        let cache_key = format!("meta/{identifier}");
        if let Some(meta) = get_record::<InstrumentMeta>(
            self.store.as_ref(),
            cache_key.as_bytes(),
            Duration::days(META_TTL_DAYS),
            Utc::now(),
        )
        .await
        {
            return Ok(meta);
        }

        let id_type = if is_isin(identifier) {
            "ID_ISIN"
        } else {
            "TICKER"
        };
        // Exchange suffixes like ".DE" are Yahoo's convention, not FIGI's
        let id_value = identifier.split('.').next().unwrap_or(identifier);
        let body = json!([{"idType": id_type, "idValue": id_value}]);

        let url = format!("{}/v3/mapping", self.base_url);
        debug!("Resolving {identifier} via {url} as {id_type}");
        let response = with_retry(
            || {
                let mut request = self.client.post(&url).json(&body);
                if let Some(key) = &self.api_key {
                    request = request.header("X-OPENFIGI-APIKEY", key);
                }
                request.send()
            },
            1,
            200,
        )
        .await?;
        if !response.status().is_success() {
            return Err(anyhow!("HTTP error: {} for {}", response.status(), identifier));
        }

        let results: Vec<MappingResult> = response.json().await?;
        let item = results
            .into_iter()
            .next()
            .and_then(|r| r.data.into_iter().next())
            .ok_or_else(|| anyhow!("No mapping found for {}", identifier))?;

        let meta = InstrumentMeta {
            name: item.name.unwrap_or_else(|| identifier.to_string()),
            category: item.security_type,
        };
        put_record(self.store.as_ref(), cache_key.as_bytes(), &meta).await;
        Ok(meta)
    }
}
