//! Return and risk statistics for a single canonical series.

use crate::core::series::CanonicalSeries;
use serde::{Deserialize, Serialize};

/// Trading days per year, the usual annualization convention.
const TRADING_DAYS: f64 = 252.0;

/// Derived performance statistics; recomputed on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub instrument: String,
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    /// `None` when volatility is zero; the ratio is undefined there.
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: f64,
}

/// Daily total returns.
///
/// For adjusted series a simple price ratio already reflects distributions;
/// for unadjusted series the day's dividend and capital gain are treated as
/// reinvested on the ex-date.
pub fn daily_returns(series: &CanonicalSeries) -> Vec<f64> {
    series
        .bars
        .windows(2)
        .map(|pair| {
            let (prev, curr) = (&pair[0], &pair[1]);
            if series.is_adjusted {
                curr.price / prev.price - 1.0
            } else {
                (curr.price + curr.dividend + curr.capital_gain) / prev.price - 1.0
            }
        })
        .collect()
}

/// Dividend-inclusive price path, one value per bar.
///
/// Starts at the first price and compounds daily total returns, so adjusted
/// and unadjusted sources become comparable. Drawdown and base-100 rebasing
/// both run on this path.
pub fn total_return_path(series: &CanonicalSeries) -> Vec<f64> {
    let Some(first) = series.bars.first() else {
        return Vec::new();
    };
    let mut path = Vec::with_capacity(series.len());
    path.push(first.price);
    for (i, r) in daily_returns(series).iter().enumerate() {
        path.push(path[i] * (1.0 + r));
    }
    path
}

pub fn compute(series: &CanonicalSeries) -> PerformanceRecord {
    let returns = daily_returns(series);
    let n = returns.len();

    let total_return = returns.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;

    let annualized_return = if n > 0 {
        (1.0 + total_return).powf(TRADING_DAYS / n as f64) - 1.0
    } else {
        0.0
    };

    let annualized_volatility = stdev(&returns) * TRADING_DAYS.sqrt();

    let sharpe_ratio = if annualized_volatility > 0.0 {
        Some(annualized_return / annualized_volatility)
    } else {
        None
    };

    PerformanceRecord {
        instrument: series.instrument.clone(),
        total_return,
        annualized_return,
        annualized_volatility,
        sharpe_ratio,
        max_drawdown: max_drawdown(&total_return_path(series)),
    }
}

/// Largest peak-to-trough decline along a price path, in [-1, 0].
pub fn max_drawdown(path: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0f64;
    for value in path {
        peak = peak.max(*value);
        worst = worst.min(value / peak - 1.0);
    }
    worst
}

/// Population standard deviation, matching the usual volatility estimator.
pub(crate) fn stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
