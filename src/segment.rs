//! Changepoint detection and run-length segmentation of labelled years.

use crate::error::{InsightError, Result};
use crate::models::{ChangeBand, Period, TrendDirection, VolatilityTier};

/// Indices `i` where `|(values[i] - values[i-1]) / values[i-1]|` exceeds `threshold`.
///
/// A zero previous value is reported as [`InsightError::DivisionByZero`]; upstream
/// zero filtering is expected to keep such values out.
pub fn detect_changepoints(values: &[f64], threshold: f64) -> Result<Vec<usize>> {
    let mut changepoints = Vec::new();
    for i in 1..values.len() {
        let previous = values[i - 1];
        if previous == 0.0 {
            return Err(InsightError::DivisionByZero { index: i });
        }
        let relative = ((values[i] - previous) / previous).abs();
        if relative > threshold {
            changepoints.push(i);
        }
    }
    Ok(changepoints)
}

/// Collapse consecutive equal labels into periods.
///
/// `labels` must be ordered by year. Each period spans the first and last year of
/// its run, so adjacent periods never share a label.
pub fn segment<L: Clone + PartialEq>(labels: &[(i32, L)]) -> Vec<Period<L>> {
    let mut periods: Vec<Period<L>> = Vec::new();
    for (year, label) in labels {
        match periods.last_mut() {
            Some(current) if current.label == *label => current.end = *year,
            _ => periods.push(Period {
                start: *year,
                end: *year,
                label: label.clone(),
            }),
        }
    }
    periods
}

/// Trailing sample standard deviation over up to `window` observations.
///
/// Missing observations are skipped. A window holding fewer than two values has no
/// standard deviation and yields `None`.
pub fn rolling_std(values: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window.max(1));
            let observed: Vec<f64> = values[start..=i].iter().flatten().copied().collect();
            if observed.len() < 2 {
                return None;
            }
            let n = observed.len() as f64;
            let mean = observed.iter().sum::<f64>() / n;
            let variance = observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            Some(variance.sqrt())
        })
        .collect()
}

/// Quantile with linear interpolation between closest ranks. `None` for an empty slice.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Label each year by how volatile its residual is relative to the whole range.
///
/// Thresholds are the `low_q` / `high_q` quantiles of the rolling standard deviation,
/// computed once over all years that have one. Years without a rolling value are Medium.
pub fn volatility_tiers(
    values: &[f64],
    trend: &[Option<f64>],
    window: usize,
    low_q: f64,
    high_q: f64,
) -> Vec<VolatilityTier> {
    let residuals: Vec<Option<f64>> = values
        .iter()
        .zip(trend)
        .map(|(v, t)| t.map(|t| v - t))
        .collect();
    let rolling = rolling_std(&residuals, window);

    let observed: Vec<f64> = rolling.iter().flatten().copied().collect();
    let (low, high) = match (quantile(&observed, low_q), quantile(&observed, high_q)) {
        (Some(low), Some(high)) => (low, high),
        _ => return vec![VolatilityTier::Medium; rolling.len()],
    };

    rolling
        .iter()
        .map(|std| match std {
            Some(s) if *s > high => VolatilityTier::High,
            Some(s) if *s < low => VolatilityTier::Low,
            _ => VolatilityTier::Medium,
        })
        .collect()
}

/// Direction of the first difference of the trend component.
pub fn trend_directions(trend: &[Option<f64>]) -> Vec<TrendDirection> {
    (0..trend.len())
        .map(|i| {
            if i == 0 {
                return TrendDirection::NoChange;
            }
            match (trend[i - 1], trend[i]) {
                (Some(prev), Some(cur)) if cur > prev => TrendDirection::Increase,
                (Some(prev), Some(cur)) if cur < prev => TrendDirection::Decrease,
                _ => TrendDirection::NoChange,
            }
        })
        .collect()
}

pub fn decade_label(year: i32) -> String {
    format!("{}s", year - year.rem_euclid(10))
}

pub fn decade_labels(years: &[i32]) -> Vec<String> {
    years.iter().map(|&y| decade_label(y)).collect()
}

/// Classify each year-over-year relative change against `threshold`.
///
/// The first year, a zero previous value and a change of exactly `±threshold`
/// are left unlabelled.
pub fn change_bands(values: &[f64], threshold: f64) -> Vec<Option<ChangeBand>> {
    (0..values.len())
        .map(|i| {
            if i == 0 || values[i - 1] == 0.0 {
                return None;
            }
            let change = (values[i] - values[i - 1]) / values[i - 1];
            if change.abs() < threshold {
                Some(ChangeBand::Consistent)
            } else if change > threshold {
                Some(ChangeBand::Increasing)
            } else if change < -threshold {
                Some(ChangeBand::Decreasing)
            } else {
                None
            }
        })
        .collect()
}

/// Pair year-aligned labels with their years for [`segment`].
pub fn label_years<L: Clone>(years: &[i32], labels: &[L]) -> Vec<(i32, L)> {
    years.iter().copied().zip(labels.iter().cloned()).collect()
}
