//! Time-boxed series cache over a pluggable key-value store.
//!
//! The store is byte-oriented and dumb; typing, keying and the staleness
//! policy live here. Staleness is lazy: an entry past its TTL is ignored on
//! read and silently overwritten by the next successful fetch, never purged.

use crate::core::series::{CanonicalSeries, Period, ProviderKind};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fmt::Display;
use std::sync::Arc;
use tracing::debug;

/// Minimal store contract; writes replace the whole value atomically so a
/// concurrent reader never observes a partially written entry.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    async fn put(&self, key: &[u8], value: Vec<u8>);
}

/// Cache key: the request, not merely the instrument. Different periods and
/// sources are not interchangeable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SeriesKey {
    pub instrument: String,
    pub period: Period,
    pub source: ProviderKind,
}

impl Display for SeriesKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "series/{}/{}/{}", self.instrument, self.period, self.source)
    }
}

impl SeriesKey {
    pub fn new(instrument: &str, period: Period, source: ProviderKind) -> Self {
        Self {
            instrument: instrument.to_string(),
            period,
            source,
        }
    }

    fn bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

/// Stored record: the payload plus its write timestamp.
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheRecord<T> {
    pub value: T,
    pub stored_at: DateTime<Utc>,
}

/// Reads and writes typed records with a TTL check on read. Shared by the
/// series cache and the metadata resolver.
pub async fn get_record<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &[u8],
    ttl: Duration,
    now: DateTime<Utc>,
) -> Option<T> {
    let bytes = store.get(key).await?;
    // An unreadable entry is a miss, not an error
    let record: CacheRecord<T> = match serde_json::from_slice(&bytes) {
        Ok(record) => record,
        Err(e) => {
            debug!("Discarding unreadable cache entry: {e}");
            return None;
        }
    };
    if now - record.stored_at > ttl {
        debug!("Ignoring stale cache entry (stored {})", record.stored_at);
        return None;
    }
    Some(record.value)
}

pub async fn put_record<T: Serialize>(store: &dyn KeyValueStore, key: &[u8], value: &T) {
    let record = CacheRecord {
        value,
        stored_at: Utc::now(),
    };
    match serde_json::to_vec(&record) {
        Ok(bytes) => store.put(key, bytes).await,
        Err(e) => debug!("Failed to serialize cache entry: {e}"),
    }
}

/// The canonical-series cache used by the orchestrator.
#[derive(Clone)]
pub struct SeriesCache {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl SeriesCache {
    pub fn new(store: Arc<dyn KeyValueStore>, ttl_hours: i64) -> Self {
        Self {
            store,
            ttl: Duration::hours(ttl_hours),
        }
    }

    pub async fn get(&self, key: &SeriesKey) -> Option<CanonicalSeries> {
        self.get_at(key, Utc::now()).await
    }

    /// Freshness check against an explicit clock; `get` passes `Utc::now()`.
    pub async fn get_at(&self, key: &SeriesKey, now: DateTime<Utc>) -> Option<CanonicalSeries> {
        let value = get_record(self.store.as_ref(), &key.bytes(), self.ttl, now).await;
        if value.is_some() {
            debug!("Cache HIT for {key}");
        } else {
            debug!("Cache MISS for {key}");
        }
        value
    }

    pub async fn put(&self, key: &SeriesKey, series: &CanonicalSeries) {
        debug!("Cache PUT for {key}");
        put_record(self.store.as_ref(), &key.bytes(), series).await;
    }
}
