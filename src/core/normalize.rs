//! Reconciles raw provider output into the canonical schema.
//!
//! This is the only place where the adjusted/unadjusted ambiguity is
//! resolved. Sources whose prices already embed distributions get their
//! dividend/capital-gain columns forced to zero no matter what the raw
//! response carried; counting a distribution both inside the price and as a
//! separate cash flow would inflate every downstream return.

use crate::core::error::FetchError;
use crate::core::series::{Adjustment, CanonicalSeries, PriceBar, RawSeries};
use chrono::Utc;
use tracing::{debug, warn};

fn scrub(value: Option<f64>) -> f64 {
    value.filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// Converts a raw provider response into a `CanonicalSeries`.
///
/// Bars without a usable price are dropped. Non-positive prices and negative
/// distributions reject the whole response as `MalformedData` so the
/// orchestrator falls back to the next source.
pub fn normalize(instrument: &str, raw: RawSeries) -> Result<CanonicalSeries, FetchError> {
    let source = raw.source;
    let is_adjusted = raw.adjustment == Adjustment::Embedded;

    let mut bars = Vec::with_capacity(raw.bars.len());
    for bar in raw.bars {
        let Some(price) = bar.price.filter(|p| p.is_finite()) else {
            debug!("Dropping bar without price for {} on {}", instrument, bar.date);
            continue;
        };
        if price <= 0.0 {
            return Err(FetchError::malformed(
                source,
                format!("non-positive price {price} on {}", bar.date),
            ));
        }

        let (dividend, capital_gain) = if is_adjusted {
            // Distributions are already inside the price; whatever raw
            // columns the provider also returned must not survive.
            (0.0, 0.0)
        } else {
            (scrub(bar.dividend), scrub(bar.capital_gain))
        };
        if dividend < 0.0 || capital_gain < 0.0 {
            return Err(FetchError::malformed(
                source,
                format!("negative distribution on {}", bar.date),
            ));
        }

        bars.push(PriceBar {
            date: bar.date,
            price,
            dividend,
            capital_gain,
            is_adjusted,
        });
    }

    // Strictly increasing dates within the series
    bars.sort_by_key(|b| b.date);
    bars.dedup_by_key(|b| b.date);

    if bars.is_empty() {
        warn!("{source} returned no usable bars for {instrument}");
        return Err(FetchError::malformed(source, "no usable bars"));
    }

    Ok(CanonicalSeries {
        instrument: instrument.to_string(),
        source,
        is_adjusted,
        bars,
        fetched_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::series::{ProviderKind, RawBar};
    use chrono::NaiveDate;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn bar(day: u32, price: f64, dividend: f64, capital_gain: f64) -> RawBar {
        RawBar {
            date: date(day),
            price: Some(price),
            dividend: Some(dividend),
            capital_gain: Some(capital_gain),
        }
    }

    #[test]
    fn test_embedded_source_zeroes_distribution_columns() {
        // The raw response carries non-zero dividend and capital gain
        // columns even though the prices are already adjusted.
        let raw = RawSeries {
            source: ProviderKind::Eodhd,
            adjustment: Adjustment::Embedded,
            bars: vec![bar(1, 50.0, 0.0, 0.0), bar(2, 49.0, 1.0, 0.5)],
        };

        let series = normalize("BBB", raw).unwrap();
        assert!(series.is_adjusted);
        for b in &series.bars {
            assert!(b.is_adjusted);
            assert_eq!(b.dividend, 0.0);
            assert_eq!(b.capital_gain, 0.0);
        }
    }

    #[test]
    fn test_separate_source_keeps_distributions() {
        let raw = RawSeries {
            source: ProviderKind::Yahoo,
            adjustment: Adjustment::Separate,
            bars: vec![bar(1, 50.0, 0.0, 0.0), bar(2, 49.0, 1.0, 0.0)],
        };

        let series = normalize("BBB", raw).unwrap();
        assert!(!series.is_adjusted);
        assert_eq!(series.bars[1].dividend, 1.0);
    }

    #[test]
    fn test_nan_distributions_default_to_zero() {
        let raw = RawSeries {
            source: ProviderKind::Yahoo,
            adjustment: Adjustment::Separate,
            bars: vec![
                RawBar {
                    date: date(1),
                    price: Some(100.0),
                    dividend: Some(f64::NAN),
                    capital_gain: None,
                },
                bar(2, 101.0, 0.0, 0.0),
            ],
        };

        let series = normalize("AAA", raw).unwrap();
        assert_eq!(series.bars[0].dividend, 0.0);
        assert_eq!(series.bars[0].capital_gain, 0.0);
    }

    #[test]
    fn test_bars_without_price_are_dropped() {
        let raw = RawSeries {
            source: ProviderKind::Yahoo,
            adjustment: Adjustment::Separate,
            bars: vec![
                bar(1, 100.0, 0.0, 0.0),
                RawBar {
                    date: date(2),
                    price: None,
                    dividend: None,
                    capital_gain: None,
                },
                bar(3, 102.0, 0.0, 0.0),
            ],
        };

        let series = normalize("AAA", raw).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series.bars[1].date, date(3));
    }

    #[test]
    fn test_negative_price_is_malformed() {
        let raw = RawSeries {
            source: ProviderKind::Yahoo,
            adjustment: Adjustment::Separate,
            bars: vec![bar(1, 100.0, 0.0, 0.0), bar(2, -5.0, 0.0, 0.0)],
        };

        let err = normalize("AAA", raw).unwrap_err();
        assert!(matches!(err, FetchError::MalformedData { .. }));
    }

    #[test]
    fn test_unsorted_bars_are_sorted_and_deduped() {
        let raw = RawSeries {
            source: ProviderKind::Yahoo,
            adjustment: Adjustment::Separate,
            bars: vec![
                bar(3, 102.0, 0.0, 0.0),
                bar(1, 100.0, 0.0, 0.0),
                bar(3, 102.0, 0.0, 0.0),
                bar(2, 101.0, 0.0, 0.0),
            ],
        };

        let series = normalize("AAA", raw).unwrap();
        let dates: Vec<_> = series.bars.iter().map(|b| b.date).collect();
        assert_eq!(dates, vec![date(1), date(2), date(3)]);
    }

    #[test]
    fn test_empty_response_is_malformed() {
        let raw = RawSeries {
            source: ProviderKind::Yahoo,
            adjustment: Adjustment::Separate,
            bars: vec![],
        };
        assert!(matches!(
            normalize("AAA", raw),
            Err(FetchError::MalformedData { .. })
        ));
    }
}
