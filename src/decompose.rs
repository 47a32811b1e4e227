//! Trend extraction collaborators.
//!
//! [`Decomposer`] splits a value series into trend, seasonal and residual parts.
//! [`TrendFitter`] stands in for a forecasting model that returns one fitted trend
//! value per observed year. Both are traits so an external statistics backend can be
//! plugged in; the built-in implementations are plain moving-average and
//! least-squares fits. [`MovingAverageTrend`] follows turns in the series, so it is
//! the fitter the pipeline uses by default.

use crate::error::{InsightError, Result};
use crate::models::{ExportSeries, TrendDecomposition, TrendPoint};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Components {
    pub trend: Vec<Option<f64>>,
    pub seasonal: Vec<Option<f64>>,
    pub residual: Vec<Option<f64>>,
}

pub trait Decomposer: Send + Sync {
    fn decompose(&self, values: &[f64]) -> Result<Components>;
}

pub trait TrendFitter: Send + Sync {
    /// One fitted trend value per input year.
    fn fit(&self, years: &[i32], values: &[f64]) -> Result<Vec<f64>>;
}

/// Classical additive decomposition with a centred moving-average trend.
#[derive(Debug, Clone)]
pub struct AdditiveDecomposer {
    pub period: usize,
}

impl Default for AdditiveDecomposer {
    fn default() -> Self {
        Self { period: 1 }
    }
}

impl AdditiveDecomposer {
    pub fn new(period: usize) -> Self {
        Self { period }
    }

    /// Centred moving average. Even periods use the 2×p filter with half weights at the ends.
    fn centred_trend(&self, values: &[f64]) -> Vec<Option<f64>> {
        let n = values.len();
        let half = self.period / 2;
        let weights: Vec<f64> = if self.period % 2 == 1 {
            vec![1.0 / self.period as f64; self.period]
        } else {
            let mut w = vec![1.0 / self.period as f64; self.period + 1];
            w[0] /= 2.0;
            w[self.period] /= 2.0;
            w
        };

        (0..n)
            .map(|i| {
                if i < half || i + half >= n {
                    return None;
                }
                let start = i - half;
                Some(
                    weights
                        .iter()
                        .enumerate()
                        .map(|(k, w)| w * values[start + k])
                        .sum(),
                )
            })
            .collect()
    }
}

impl Decomposer for AdditiveDecomposer {
    fn decompose(&self, values: &[f64]) -> Result<Components> {
        if values.is_empty() {
            return Ok(Components::default());
        }
        if self.period == 0 {
            return Err(InsightError::Decomposition(
                "period must be at least 1".to_string(),
            ));
        }
        if values.len() < 2 * self.period {
            return Err(InsightError::Decomposition(format!(
                "need at least {} observations for period {}, got {}",
                2 * self.period,
                self.period,
                values.len()
            )));
        }

        let trend = self.centred_trend(values);
        let detrended: Vec<Option<f64>> = values
            .iter()
            .zip(&trend)
            .map(|(v, t)| t.map(|t| v - t))
            .collect();

        // mean detrended value per phase, then centred so the phases sum to zero
        let mut phase_means: Vec<Option<f64>> = (0..self.period)
            .map(|phase| {
                let observed: Vec<f64> = detrended
                    .iter()
                    .skip(phase)
                    .step_by(self.period)
                    .flatten()
                    .copied()
                    .collect();
                if observed.is_empty() {
                    None
                } else {
                    Some(observed.iter().sum::<f64>() / observed.len() as f64)
                }
            })
            .collect();
        let known: Vec<f64> = phase_means.iter().flatten().copied().collect();
        if !known.is_empty() {
            let centre = known.iter().sum::<f64>() / known.len() as f64;
            for mean in phase_means.iter_mut().flatten() {
                *mean -= centre;
            }
        }

        let seasonal: Vec<Option<f64>> = (0..values.len())
            .map(|i| phase_means[i % self.period])
            .collect();
        let residual = detrended
            .iter()
            .zip(&seasonal)
            .map(|(d, s)| match (d, s) {
                (Some(d), Some(s)) => Some(d - s),
                _ => None,
            })
            .collect();

        Ok(Components {
            trend,
            seasonal,
            residual,
        })
    }
}

/// Centred moving average that shrinks its window at the edges.
///
/// Every year gets a fitted value, so a series that rises and then falls yields a trend
/// that rises and then falls.
#[derive(Debug, Clone)]
pub struct MovingAverageTrend {
    pub window: usize,
}

impl Default for MovingAverageTrend {
    fn default() -> Self {
        Self { window: 3 }
    }
}

impl MovingAverageTrend {
    pub fn new(window: usize) -> Self {
        Self { window }
    }
}

impl TrendFitter for MovingAverageTrend {
    fn fit(&self, years: &[i32], values: &[f64]) -> Result<Vec<f64>> {
        if years.len() != values.len() {
            return Err(InsightError::Decomposition(format!(
                "years ({}) and values ({}) differ in length",
                years.len(),
                values.len()
            )));
        }
        if self.window == 0 {
            return Err(InsightError::Decomposition(
                "trend window must be at least 1".to_string(),
            ));
        }

        let n = values.len();
        let before = (self.window - 1) / 2;
        let after = self.window / 2;
        Ok((0..n)
            .map(|i| {
                let lo = i.saturating_sub(before);
                let hi = (i + after + 1).min(n);
                let slice = &values[lo..hi];
                slice.iter().sum::<f64>() / slice.len() as f64
            })
            .collect())
    }
}

/// Least-squares straight line over calendar year.
#[derive(Debug, Clone, Default)]
pub struct LinearTrend;

impl TrendFitter for LinearTrend {
    fn fit(&self, years: &[i32], values: &[f64]) -> Result<Vec<f64>> {
        if years.len() != values.len() {
            return Err(InsightError::Decomposition(format!(
                "years ({}) and values ({}) differ in length",
                years.len(),
                values.len()
            )));
        }
        let n = values.len();
        if n == 0 {
            return Ok(Vec::new());
        }

        let xs: Vec<f64> = years.iter().map(|&y| y as f64).collect();
        let x_mean = xs.iter().sum::<f64>() / n as f64;
        let y_mean = values.iter().sum::<f64>() / n as f64;
        let sxx: f64 = xs.iter().map(|x| (x - x_mean).powi(2)).sum();
        if sxx == 0.0 {
            return Ok(vec![y_mean; n]);
        }
        let sxy: f64 = xs
            .iter()
            .zip(values)
            .map(|(x, y)| (x - x_mean) * (y - y_mean))
            .sum();
        let slope = sxy / sxx;
        let intercept = y_mean - slope * x_mean;

        Ok(xs.iter().map(|x| intercept + slope * x).collect())
    }
}

/// Run `decomposer` over a series and attach the components year by year.
pub fn decompose_series(
    series: &ExportSeries,
    decomposer: &dyn Decomposer,
) -> Result<TrendDecomposition> {
    let values = series.values();
    let components = decomposer.decompose(&values)?;
    if components.trend.len() != values.len()
        || components.seasonal.len() != values.len()
        || components.residual.len() != values.len()
    {
        return Err(InsightError::Decomposition(
            "decomposer returned components of the wrong length".to_string(),
        ));
    }

    Ok(series
        .points
        .iter()
        .enumerate()
        .map(|(i, p)| TrendPoint {
            year: p.year,
            value: p.value,
            trend: components.trend[i],
            seasonal: components.seasonal[i],
            residual: components.residual[i],
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeriesPoint;

    fn assert_close(a: Option<f64>, b: f64) {
        let a = a.expect("expected a value");
        assert!((a - b).abs() < 1e-9, "{} != {}", a, b);
    }

    #[test]
    fn test_period_one_is_identity_trend() {
        let values = [5.0, 7.0, 6.0, 9.0];
        let c = AdditiveDecomposer::default().decompose(&values).unwrap();
        for (i, v) in values.iter().enumerate() {
            assert_close(c.trend[i], *v);
            assert_close(c.seasonal[i], 0.0);
            assert_close(c.residual[i], 0.0);
        }
    }

    #[test]
    fn test_odd_period_has_null_boundaries() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let c = AdditiveDecomposer::new(3).decompose(&values).unwrap();
        assert!(c.trend[0].is_none());
        assert!(c.trend[5].is_none());
        assert_close(c.trend[1], 2.0);
        assert_close(c.trend[4], 5.0);
        assert!(c.residual[0].is_none());
    }

    #[test]
    fn test_even_period_uses_half_weights() {
        let values = [1.0, 3.0, 1.0, 3.0, 1.0, 3.0];
        let c = AdditiveDecomposer::new(2).decompose(&values).unwrap();
        assert!(c.trend[0].is_none());
        assert_close(c.trend[1], 2.0);
        assert_close(c.trend[2], 2.0);
        assert_close(c.seasonal[0], -1.0);
        assert_close(c.seasonal[1], 1.0);
        assert_close(c.residual[2], 0.0);
    }

    #[test]
    fn test_too_short_series_errors_but_empty_is_fine() {
        assert!(AdditiveDecomposer::new(3).decompose(&[1.0, 2.0]).is_err());
        assert_eq!(
            AdditiveDecomposer::new(3).decompose(&[]).unwrap(),
            Components::default()
        );
    }

    #[test]
    fn test_linear_trend_recovers_line() {
        let years = [2000, 2001, 2002, 2003];
        let values = [10.0, 12.0, 14.0, 16.0];
        let fitted = LinearTrend.fit(&years, &values).unwrap();
        for (f, v) in fitted.iter().zip(values) {
            assert!((f - v).abs() < 1e-6);
        }
        assert!(LinearTrend.fit(&[], &[]).unwrap().is_empty());
        assert_eq!(LinearTrend.fit(&[2000], &[4.0]).unwrap(), vec![4.0]);
    }

    #[test]
    fn test_moving_average_trend_follows_turns() {
        let years: Vec<i32> = (2000..=2011).collect();
        let values = [
            10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 50.0, 40.0, 30.0, 20.0, 10.0, 5.0,
        ];
        let fitted = MovingAverageTrend::default().fit(&years, &values).unwrap();
        assert_eq!(fitted.len(), 12);
        assert_close(Some(fitted[0]), 15.0);
        assert_close(Some(fitted[1]), 20.0);
        assert_close(Some(fitted[5]), 160.0 / 3.0);
        assert_close(Some(fitted[6]), 50.0);
        assert_close(Some(fitted[11]), 7.5);

        assert!(MovingAverageTrend::default().fit(&[], &[]).unwrap().is_empty());
        assert_eq!(
            MovingAverageTrend::new(1).fit(&[2000, 2001], &[3.0, 4.0]).unwrap(),
            vec![3.0, 4.0]
        );
        assert!(MovingAverageTrend::new(0).fit(&[2000], &[1.0]).is_err());
    }

    #[test]
    fn test_decompose_series_keeps_years() {
        let series = ExportSeries {
            commodity: "Coffee, Green".to_string(),
            country: None,
            points: vec![
                SeriesPoint { year: 2001, value: 3.0 },
                SeriesPoint { year: 2002, value: 4.0 },
            ],
        };
        let result = decompose_series(&series, &AdditiveDecomposer::default()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result[1].year, 2002);
        assert_close(result[1].trend, 4.0);
    }
}
