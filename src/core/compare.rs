//! Multi-instrument comparison on a common date axis, rebased to 100.

use crate::core::error::FetchError;
use crate::core::fetch::FetchOrchestrator;
use crate::core::metrics;
use crate::core::series::{CanonicalSeries, Period};
use chrono::NaiveDate;
use futures::{StreamExt, stream};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

/// Every comparison index starts here.
pub const BASE_VALUE: f64 = 100.0;

/// Date-axis policy across instruments with different trading calendars.
///
/// `Intersection` keeps only dates every instrument traded on, so reported
/// returns cover the identical date set. `ForwardFill` keeps the union of
/// dates from the latest common start and carries each instrument's last
/// value over its gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Alignment {
    #[default]
    Intersection,
    ForwardFill,
}

/// One date on the common axis: instrument -> rebased index value.
#[derive(Debug, Clone, PartialEq)]
pub struct RebasedPoint {
    pub date: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Clone)]
pub struct InstrumentComparison {
    pub instrument: String,
    pub end_value: f64,
    pub total_return: f64,
    pub annualized_volatility: f64,
}

/// An instrument that could not participate, with the reason. Never silently
/// dropped from the response.
#[derive(Debug, Clone)]
pub struct UnavailableInstrument {
    pub instrument: String,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct ComparisonResult {
    pub points: Vec<RebasedPoint>,
    pub summaries: Vec<InstrumentComparison>,
    pub unavailable: Vec<UnavailableInstrument>,
}

/// Fetches every instrument (bounded concurrency), aligns the series on a
/// common date axis and rebases each to exactly 100 at the first common
/// date. Rebasing runs on the dividend-inclusive total-return path, so the
/// comparison is return-comparable across adjusted and unadjusted sources.
pub async fn compare(
    orchestrator: &FetchOrchestrator,
    instruments: &[String],
    period: &Period,
    alignment: Alignment,
    max_concurrent: usize,
    on_fetched: &(dyn Fn() + Sync),
) -> ComparisonResult {
    let mut ids: Vec<String> = Vec::new();
    for id in instruments {
        let id = id.trim().to_uppercase();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    // Independent instruments fetch in parallel under a global bound;
    // fallback within each instrument stays strictly sequential.
    let fetches: Vec<(String, Result<CanonicalSeries, FetchError>)> =
        stream::iter(ids.iter().map(|id| async {
            let result = orchestrator.get_series(id, period).await;
            on_fetched();
            (id.clone(), result)
        }))
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;
    let mut results: HashMap<String, Result<CanonicalSeries, FetchError>> =
        fetches.into_iter().collect();

    let mut result = ComparisonResult::default();
    let mut paths: Vec<(String, BTreeMap<NaiveDate, f64>)> = Vec::new();
    for id in &ids {
        match results.remove(id.as_str()) {
            Some(Ok(series)) => {
                let path = metrics::total_return_path(&series);
                let by_date: BTreeMap<NaiveDate, f64> = series
                    .bars
                    .iter()
                    .map(|b| b.date)
                    .zip(path)
                    .collect();
                paths.push((id.clone(), by_date));
            }
            Some(Err(e)) => result.unavailable.push(UnavailableInstrument {
                instrument: id.clone(),
                reason: e.to_string(),
            }),
            None => {}
        }
    }

    let (axis, aligned) = match alignment {
        Alignment::Intersection => intersect_axis(paths, &mut result.unavailable),
        Alignment::ForwardFill => forward_fill_axis(paths, &mut result.unavailable),
    };
    let Some(first_date) = axis.iter().next().copied() else {
        return result;
    };

    // Rebase each instrument so the first common date is exactly 100.00
    let mut indexed: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();
    for (id, values) in &aligned {
        let base = values[&first_date];
        for date in &axis {
            let index = if *date == first_date {
                BASE_VALUE
            } else {
                values[date] / base * BASE_VALUE
            };
            indexed.entry(*date).or_default().insert(id.clone(), index);
        }
    }
    result.points = indexed
        .into_iter()
        .map(|(date, values)| RebasedPoint { date, values })
        .collect();

    for (id, values) in &aligned {
        let series: Vec<f64> = axis.iter().map(|d| values[d]).collect();
        let end_value = series.last().unwrap() / values[&first_date] * BASE_VALUE;
        let returns: Vec<f64> = series.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
        result.summaries.push(InstrumentComparison {
            instrument: id.clone(),
            end_value,
            total_return: end_value / BASE_VALUE - 1.0,
            annualized_volatility: metrics::stdev(&returns) * 252.0_f64.sqrt(),
        });
    }

    result
}

type AlignedPaths = Vec<(String, BTreeMap<NaiveDate, f64>)>;

/// Greedy intersection in request order; an instrument whose calendar would
/// empty the running intersection is reported unavailable instead of
/// shrinking the axis for everyone else.
fn intersect_axis(
    paths: AlignedPaths,
    unavailable: &mut Vec<UnavailableInstrument>,
) -> (BTreeSet<NaiveDate>, AlignedPaths) {
    let mut axis: BTreeSet<NaiveDate> = BTreeSet::new();
    let mut aligned: AlignedPaths = Vec::new();

    for (id, values) in paths {
        let dates: BTreeSet<NaiveDate> = values.keys().copied().collect();
        if aligned.is_empty() {
            axis = dates;
            aligned.push((id, values));
            continue;
        }
        let intersection: BTreeSet<NaiveDate> = axis.intersection(&dates).copied().collect();
        if intersection.is_empty() {
            debug!("{id} has no overlapping trading dates, reporting as unavailable");
            unavailable.push(UnavailableInstrument {
                instrument: id,
                reason: "no overlapping trading dates for the requested period".to_string(),
            });
        } else {
            axis = intersection;
            aligned.push((id, values));
        }
    }

    (axis, aligned)
}

/// Union of dates from the latest common start, gaps forward-filled with the
/// instrument's last traded value.
fn forward_fill_axis(
    mut paths: AlignedPaths,
    unavailable: &mut Vec<UnavailableInstrument>,
) -> (BTreeSet<NaiveDate>, AlignedPaths) {
    // Drop instruments that end before another one starts; repeat until the
    // common start is consistent with every survivor.
    loop {
        let Some(common_start) = paths
            .iter()
            .filter_map(|(_, v)| v.keys().next().copied())
            .max()
        else {
            return (BTreeSet::new(), Vec::new());
        };
        let (kept, dropped): (AlignedPaths, AlignedPaths) = paths
            .into_iter()
            .partition(|(_, v)| v.keys().next_back().is_some_and(|last| *last >= common_start));
        for (id, _) in dropped.iter() {
            unavailable.push(UnavailableInstrument {
                instrument: id.clone(),
                reason: "no overlapping trading dates for the requested period".to_string(),
            });
        }
        let stable = dropped.is_empty();
        paths = kept;
        if stable {
            let axis: BTreeSet<NaiveDate> = paths
                .iter()
                .flat_map(|(_, v)| v.keys().copied())
                .filter(|d| *d >= common_start)
                .collect();
            let filled = paths
                .into_iter()
                .map(|(id, values)| {
                    let filled: BTreeMap<NaiveDate, f64> = axis
                        .iter()
                        .map(|d| {
                            let v = values
                                .range(..=*d)
                                .next_back()
                                .map(|(_, v)| *v)
                                .expect("series starts at or before the common start");
                            (*d, v)
                        })
                        .collect();
                    (id, filled)
                })
                .collect();
            return (axis, filled);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::SeriesCache;
    use crate::core::series::{
        Adjustment, HistoryProvider, ProviderKind, RawBar, RawSeries,
    };
    use crate::store::memory::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    /// Serves a fixed set of instruments; everything else is unavailable.
    struct FixtureProvider {
        series: HashMap<String, Vec<(NaiveDate, f64, f64)>>,
        adjustment: Adjustment,
    }

    impl FixtureProvider {
        fn new(adjustment: Adjustment) -> Self {
            Self {
                series: HashMap::new(),
                adjustment,
            }
        }

        fn with(mut self, id: &str, bars: &[(u32, f64, f64)]) -> Self {
            self.series.insert(
                id.to_string(),
                bars.iter().map(|(d, p, v)| (date(*d), *p, *v)).collect(),
            );
            self
        }
    }

    #[async_trait]
    impl HistoryProvider for FixtureProvider {
        fn kind(&self) -> ProviderKind {
            ProviderKind::Yahoo
        }

        async fn fetch_history(
            &self,
            instrument: &str,
            _period: &Period,
        ) -> Result<RawSeries, FetchError> {
            let bars = self
                .series
                .get(instrument)
                .ok_or_else(|| FetchError::unavailable(ProviderKind::Yahoo, "unknown symbol"))?;
            Ok(RawSeries {
                source: ProviderKind::Yahoo,
                adjustment: self.adjustment,
                bars: bars
                    .iter()
                    .map(|(date, price, dividend)| RawBar {
                        date: *date,
                        price: Some(*price),
                        dividend: Some(*dividend),
                        capital_gain: Some(0.0),
                    })
                    .collect(),
            })
        }
    }

    fn orchestrator(provider: FixtureProvider) -> FetchOrchestrator {
        FetchOrchestrator::new(
            vec![Arc::new(provider)],
            SeriesCache::new(Arc::new(MemoryStore::new()), 24),
            Duration::from_secs(5),
        )
    }

    async fn run(orch: &FetchOrchestrator, ids: &[&str], alignment: Alignment) -> ComparisonResult {
        let ids: Vec<String> = ids.iter().map(|s| s.to_string()).collect();
        compare(orch, &ids, &Period::OneYear, alignment, 4, &|| ()).await
    }

    #[tokio::test]
    async fn test_every_series_starts_at_exactly_100() {
        let provider = FixtureProvider::new(Adjustment::Separate)
            .with("AAA", &[(1, 100.0, 0.0), (2, 102.0, 0.0), (3, 101.0, 0.0)])
            .with("BBB", &[(1, 50.0, 0.0), (2, 49.0, 1.0), (3, 52.0, 0.0)]);
        let orch = orchestrator(provider);

        let result = run(&orch, &["AAA", "BBB"], Alignment::Intersection).await;
        assert!(result.unavailable.is_empty());
        assert_eq!(result.points.len(), 3);

        let first = &result.points[0];
        assert_eq!(first.values["AAA"], 100.0);
        assert_eq!(first.values["BBB"], 100.0);

        // BBB's dividend day: price fell 50 -> 49 but 1.0 was paid out, so
        // the rebased index holds at 100 instead of dipping
        let second = &result.points[1];
        assert!((second.values["BBB"] - 100.0).abs() < 1e-9);
        assert!((second.values["AAA"] - 102.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_non_overlapping_instrument_reported_not_dropped() {
        let provider = FixtureProvider::new(Adjustment::Separate)
            .with("AAA", &[(1, 100.0, 0.0), (2, 101.0, 0.0)])
            .with("BBB", &[(1, 10.0, 0.0), (2, 11.0, 0.0)])
            .with("CCC", &[(20, 5.0, 0.0), (21, 6.0, 0.0)]);
        let orch = orchestrator(provider);

        let result = run(&orch, &["AAA", "BBB", "CCC"], Alignment::Intersection).await;
        assert_eq!(result.summaries.len(), 2);
        assert_eq!(result.unavailable.len(), 1);
        assert_eq!(result.unavailable[0].instrument, "CCC");
        for point in &result.points {
            assert!(!point.values.contains_key("CCC"));
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_flagged_individually() {
        let provider = FixtureProvider::new(Adjustment::Separate)
            .with("AAA", &[(1, 100.0, 0.0), (2, 110.0, 0.0)]);
        let orch = orchestrator(provider);

        let result = run(&orch, &["AAA", "ZZZ"], Alignment::Intersection).await;
        assert_eq!(result.summaries.len(), 1);
        assert_eq!(result.summaries[0].instrument, "AAA");
        assert!((result.summaries[0].end_value - 110.0).abs() < 1e-9);
        assert_eq!(result.unavailable.len(), 1);
        assert_eq!(result.unavailable[0].instrument, "ZZZ");
        assert!(result.unavailable[0].reason.contains("ZZZ"));
    }

    #[tokio::test]
    async fn test_intersection_skips_missing_dates() {
        let provider = FixtureProvider::new(Adjustment::Separate)
            .with("AAA", &[(1, 100.0, 0.0), (2, 102.0, 0.0), (3, 104.0, 0.0)])
            .with("BBB", &[(1, 10.0, 0.0), (3, 12.0, 0.0)]);
        let orch = orchestrator(provider);

        let result = run(&orch, &["AAA", "BBB"], Alignment::Intersection).await;
        let dates: Vec<NaiveDate> = result.points.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![date(1), date(3)]);
    }

    #[tokio::test]
    async fn test_forward_fill_carries_last_value() {
        let provider = FixtureProvider::new(Adjustment::Separate)
            .with("AAA", &[(1, 100.0, 0.0), (2, 102.0, 0.0), (3, 104.0, 0.0)])
            .with("BBB", &[(1, 10.0, 0.0), (3, 12.0, 0.0)]);
        let orch = orchestrator(provider);

        let result = run(&orch, &["AAA", "BBB"], Alignment::ForwardFill).await;
        let dates: Vec<NaiveDate> = result.points.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![date(1), date(2), date(3)]);
        // BBB did not trade on day 2; its index holds at the day-1 value
        assert_eq!(result.points[1].values["BBB"], 100.0);
        assert!((result.points[2].values["BBB"] - 120.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_summary_totals_match_rebased_end() {
        let provider = FixtureProvider::new(Adjustment::Separate)
            .with("AAA", &[(1, 100.0, 0.0), (2, 102.0, 0.0), (3, 101.0, 0.0)]);
        let orch = orchestrator(provider);

        let result = run(&orch, &["AAA"], Alignment::Intersection).await;
        let summary = &result.summaries[0];
        assert!((summary.end_value - 101.0).abs() < 1e-9);
        assert!((summary.total_return - 0.01).abs() < 1e-9);
        assert!(summary.annualized_volatility > 0.0);
    }

    #[tokio::test]
    async fn test_all_instruments_unavailable() {
        let provider = FixtureProvider::new(Adjustment::Separate);
        let orch = orchestrator(provider);

        let result = run(&orch, &["AAA", "BBB"], Alignment::Intersection).await;
        assert!(result.points.is_empty());
        assert!(result.summaries.is_empty());
        assert_eq!(result.unavailable.len(), 2);
    }
}
