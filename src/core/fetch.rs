//! Cache-first fetch with ordered provider fallback.

use crate::core::cache::{SeriesCache, SeriesKey};
use crate::core::error::FetchError;
use crate::core::normalize;
use crate::core::series::{CanonicalSeries, HistoryProvider, Period};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

pub struct FetchOrchestrator {
    providers: Vec<Arc<dyn HistoryProvider>>,
    cache: SeriesCache,
    fetch_timeout: Duration,
}

impl FetchOrchestrator {
    pub fn new(
        providers: Vec<Arc<dyn HistoryProvider>>,
        cache: SeriesCache,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            providers,
            cache,
            fetch_timeout,
        }
    }

    /// Returns the canonical series for an instrument and period.
    ///
    /// Providers are tried strictly in priority order; a second provider is
    /// never contacted before the first has succeeded, failed or timed out.
    /// Adapter and normalizer errors are absorbed here; the only error that
    /// reaches callers is `InstrumentUnavailable`.
    #[instrument(name = "GetSeries", skip(self), fields(instrument = %instrument, period = %period))]
    pub async fn get_series(
        &self,
        instrument: &str,
        period: &Period,
    ) -> Result<CanonicalSeries, FetchError> {
        let instrument = instrument.trim().to_uppercase();

        for provider in &self.providers {
            let key = SeriesKey::new(&instrument, *period, provider.kind());
            if let Some(series) = self.cache.get(&key).await {
                return Ok(series);
            }
        }

        for provider in &self.providers {
            let kind = provider.kind();
            let fetched = tokio::time::timeout(
                self.fetch_timeout,
                provider.fetch_history(&instrument, period),
            )
            .await
            .unwrap_or_else(|_| {
                Err(FetchError::unavailable(
                    kind,
                    format!("timed out after {:?}", self.fetch_timeout),
                ))
            });

            let raw = match fetched {
                Ok(raw) => raw,
                Err(e) => {
                    debug!("{kind} failed for {instrument}: {e}");
                    continue;
                }
            };

            match normalize::normalize(&instrument, raw) {
                Ok(series) => {
                    let key = SeriesKey::new(&instrument, *period, kind);
                    self.cache.put(&key, &series).await;
                    return Ok(series);
                }
                Err(e) => {
                    // Logged distinctly from plain unavailability; for
                    // fallback purposes the two are equivalent.
                    warn!("{kind} data for {instrument} rejected: {e}");
                    continue;
                }
            }
        }

        Err(FetchError::InstrumentUnavailable(instrument))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::{Adjustment, ProviderKind, RawBar, RawSeries};
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Ok(Vec<f64>),
        Malformed,
        Unavailable,
        Hang,
    }

    struct ScriptedProvider {
        kind: ProviderKind,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(kind: ProviderKind, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                kind,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl HistoryProvider for ScriptedProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        async fn fetch_history(
            &self,
            _instrument: &str,
            _period: &Period,
        ) -> Result<RawSeries, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Ok(prices) => Ok(RawSeries {
                    source: self.kind,
                    adjustment: Adjustment::Separate,
                    bars: prices
                        .iter()
                        .enumerate()
                        .map(|(i, p)| RawBar {
                            date: NaiveDate::from_ymd_opt(2024, 1, 1 + i as u32).unwrap(),
                            price: Some(*p),
                            dividend: Some(0.0),
                            capital_gain: Some(0.0),
                        })
                        .collect(),
                }),
                Behavior::Malformed => Ok(RawSeries {
                    source: self.kind,
                    adjustment: Adjustment::Separate,
                    bars: vec![RawBar {
                        date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                        price: Some(-1.0),
                        dividend: None,
                        capital_gain: None,
                    }],
                }),
                Behavior::Unavailable => {
                    Err(FetchError::unavailable(self.kind, "connection refused"))
                }
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    unreachable!()
                }
            }
        }
    }

    fn orchestrator(providers: Vec<Arc<ScriptedProvider>>) -> FetchOrchestrator {
        let cache = SeriesCache::new(Arc::new(MemoryStore::new()), 24);
        FetchOrchestrator::new(
            providers
                .into_iter()
                .map(|p| p as Arc<dyn HistoryProvider>)
                .collect(),
            cache,
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_fallback_chain_reaches_third_provider() {
        let p1 = ScriptedProvider::new(ProviderKind::Yahoo, Behavior::Hang);
        let p2 = ScriptedProvider::new(ProviderKind::Eodhd, Behavior::Malformed);
        let p3 = ScriptedProvider::new(ProviderKind::AlphaVantage, Behavior::Ok(vec![10.0, 11.0]));

        let orch = orchestrator(vec![
            Arc::clone(&p1),
            Arc::clone(&p2),
            Arc::clone(&p3),
        ]);
        let series = orch.get_series("aaa", &Period::OneYear).await.unwrap();

        assert_eq!(series.source, ProviderKind::AlphaVantage);
        assert_eq!(p1.calls.load(Ordering::SeqCst), 1);
        assert_eq!(p2.calls.load(Ordering::SeqCst), 1);
        assert_eq!(p3.calls.load(Ordering::SeqCst), 1);

        // Only the successful attempt was cached, under the winning source
        let hit = orch
            .cache
            .get(&SeriesKey::new(
                "AAA",
                Period::OneYear,
                ProviderKind::AlphaVantage,
            ))
            .await;
        assert!(hit.is_some());
        for kind in [ProviderKind::Yahoo, ProviderKind::Eodhd] {
            let miss = orch
                .cache
                .get(&SeriesKey::new("AAA", Period::OneYear, kind))
                .await;
            assert!(miss.is_none());
        }
    }

    #[tokio::test]
    async fn test_all_providers_exhausted() {
        let p1 = ScriptedProvider::new(ProviderKind::Yahoo, Behavior::Unavailable);
        let p2 = ScriptedProvider::new(ProviderKind::Eodhd, Behavior::Malformed);

        let orch = orchestrator(vec![p1, p2]);
        let err = orch.get_series("AAA", &Period::OneYear).await.unwrap_err();
        assert!(matches!(err, FetchError::InstrumentUnavailable(ref id) if id == "AAA"));
    }

    #[tokio::test]
    async fn test_cache_hit_skips_providers() {
        let p1 = ScriptedProvider::new(ProviderKind::Yahoo, Behavior::Ok(vec![10.0, 11.0]));
        let orch = orchestrator(vec![Arc::clone(&p1)]);

        orch.get_series("AAA", &Period::OneYear).await.unwrap();
        orch.get_series("AAA", &Period::OneYear).await.unwrap();
        assert_eq!(p1.calls.load(Ordering::SeqCst), 1);

        // A different period is a different request and fetches again
        orch.get_series("AAA", &Period::OneMonth).await.unwrap();
        assert_eq!(p1.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_identifier_case_is_insensitive() {
        let p1 = ScriptedProvider::new(ProviderKind::Yahoo, Behavior::Ok(vec![10.0, 11.0]));
        let orch = orchestrator(vec![Arc::clone(&p1)]);

        orch.get_series("vwce.de", &Period::OneYear).await.unwrap();
        let series = orch.get_series("VWCE.DE", &Period::OneYear).await.unwrap();
        assert_eq!(series.instrument, "VWCE.DE");
        assert_eq!(p1.calls.load(Ordering::SeqCst), 1);
    }
}
