//! Year-over-year drop-offs.

use crate::models::{DropOffPoint, DropOffSeries, ExportRow, ExportSeries};
use std::collections::HashMap;

/// Compute previous value, drop-off and percentage change for every row.
///
/// Rows must be ascending by year. The previous value is looked up within the same
/// (commodity, country) group only, so the first row of each group has no deltas.
pub fn compute_dropoffs(rows: &[ExportRow]) -> DropOffSeries {
    let mut last_seen: HashMap<(&str, Option<&str>), f64> = HashMap::new();

    rows.iter()
        .map(|row| {
            let key = (row.commodity.as_str(), row.country.as_deref());
            let previous_value = last_seen.insert(key, row.value);
            let drop_off = previous_value.map(|prev| prev - row.value);
            let pct_change = match (previous_value, drop_off) {
                (Some(prev), Some(drop)) if prev != 0.0 => Some(drop / prev * 100.0),
                _ => None,
            };

            DropOffPoint {
                commodity: row.commodity.clone(),
                country: row.country.clone(),
                year: row.year,
                value: row.value,
                previous_value,
                drop_off,
                pct_change,
            }
        })
        .collect()
}

pub fn compute_series_dropoffs(series: &ExportSeries, origin: &str) -> DropOffSeries {
    compute_dropoffs(&series.to_rows(origin))
}

/// The `n` largest signed drop-offs; ties keep input order.
pub fn top_dropoffs(series: &[DropOffPoint], n: usize) -> Vec<DropOffPoint> {
    let mut with_drop: Vec<&DropOffPoint> =
        series.iter().filter(|p| p.drop_off.is_some()).collect();
    with_drop.sort_by(|a, b| {
        b.drop_off
            .partial_cmp(&a.drop_off)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    with_drop.into_iter().take(n).cloned().collect()
}

/// Trailing mean over `window` observations; `None` until the window is full.
pub fn moving_average(values: &[f64], window: usize) -> Vec<Option<f64>> {
    if window == 0 {
        return vec![None; values.len()];
    }
    (0..values.len())
        .map(|i| {
            if i + 1 < window {
                None
            } else {
                let slice = &values[i + 1 - window..=i];
                Some(slice.iter().sum::<f64>() / window as f64)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(commodity: &str, year: i32, value: f64) -> ExportRow {
        ExportRow {
            commodity: commodity.to_string(),
            country: None,
            year,
            value,
            origin: "United States, America".to_string(),
        }
    }

    #[test]
    fn test_dropoffs_basic_scenario() {
        let rows = vec![
            row("Cattle", 2018, 50.0),
            row("Cattle", 2019, 40.0),
            row("Cattle", 2020, 70.0),
            row("Cattle", 2021, 65.0),
        ];
        let result = compute_dropoffs(&rows);
        let drops: Vec<Option<f64>> = result.iter().map(|p| p.drop_off).collect();
        assert_eq!(drops, vec![None, Some(10.0), Some(-30.0), Some(5.0)]);

        assert!(result[0].previous_value.is_none());
        assert!(result[0].pct_change.is_none());
        assert_eq!(result[1].previous_value, Some(50.0));
        assert!((result[1].pct_change.unwrap() - 20.0).abs() < 1e-9);
        assert_eq!(result.len(), rows.len());
    }

    #[test]
    fn test_dropoffs_never_cross_commodity_groups() {
        let rows = vec![
            row("Beef", 2019, 10.0),
            row("Pork", 2019, 100.0),
            row("Beef", 2020, 12.0),
            row("Pork", 2020, 90.0),
        ];
        let result = compute_dropoffs(&rows);
        assert!(result[0].drop_off.is_none());
        assert!(result[1].drop_off.is_none());
        assert_eq!(result[2].drop_off, Some(-2.0));
        assert_eq!(result[3].drop_off, Some(10.0));
    }

    #[test]
    fn test_zero_previous_value_gives_null_pct() {
        let rows = vec![row("Tea", 2019, 0.0), row("Tea", 2020, 5.0)];
        let result = compute_dropoffs(&rows);
        assert_eq!(result[1].drop_off, Some(-5.0));
        assert!(result[1].pct_change.is_none());
    }

    #[test]
    fn test_empty_input() {
        assert!(compute_dropoffs(&[]).is_empty());
        assert!(top_dropoffs(&[], 3).is_empty());
        assert!(moving_average(&[], 3).is_empty());
    }

    #[test]
    fn test_top_dropoffs_orders_by_signed_value() {
        let rows = vec![
            row("Cattle", 2018, 50.0),
            row("Cattle", 2019, 40.0),
            row("Cattle", 2020, 70.0),
            row("Cattle", 2021, 65.0),
        ];
        let top = top_dropoffs(&compute_dropoffs(&rows), 2);
        let years: Vec<i32> = top.iter().map(|p| p.year).collect();
        assert_eq!(years, vec![2019, 2021]);
    }

    #[test]
    fn test_moving_average_needs_full_window() {
        let avg = moving_average(&[3.0, 6.0, 9.0, 12.0], 3);
        assert_eq!(avg, vec![None, None, Some(6.0), Some(9.0)]);
    }
}
