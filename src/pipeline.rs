use crate::aggregate::{by_country_export, by_export, by_year_country_export, AggregateOptions};
use crate::config::AnalysisConfig;
use crate::decompose::{
    decompose_series, AdditiveDecomposer, Decomposer, MovingAverageTrend, TrendFitter,
};
use crate::dropoff::{compute_series_dropoffs, moving_average, top_dropoffs};
use crate::error::{InsightError, Result};
use crate::models::{
    DropOffSeries, ExportRow, ExportSeries, Period, Summary, TrendDecomposition, TrendDirection,
    TrendPoint, VolatilityTier,
};
use crate::segment::{
    change_bands, decade_labels, detect_changepoints, label_years, segment, trend_directions,
    volatility_tiers,
};
use crate::source::{DataSource, Dataset};
use crate::summary::{dropoff_context, summarize, summary_notes, PeriodSets};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use tracing::{debug, info, warn};

/// What the user picked: a dataset, a commodity and optionally a country and year range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub dataset: Dataset,
    pub commodity: String,
    pub country: Option<String>,
    /// Inclusive `(min_year, max_year)`.
    pub year_range: Option<(i32, i32)>,
}

impl Selection {
    pub fn new(dataset: Dataset, commodity: impl Into<String>) -> Self {
        Self {
            dataset,
            commodity: commodity.into(),
            country: None,
            year_range: None,
        }
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_year_range(mut self, min_year: i32, max_year: i32) -> Self {
        self.year_range = Some((min_year, max_year));
        self
    }
}

/// One row of the chart table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    pub year: i32,
    pub value: f64,
    pub moving_average: Option<f64>,
    pub trend: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub selection: Selection,
    pub no_data: bool,
    pub message: Option<String>,
    pub series: Vec<SeriesRow>,
    pub dropoffs: DropOffSeries,
    pub decomposition: TrendDecomposition,
    pub changepoint_years: Vec<i32>,
    pub volatility_periods: Vec<Period<VolatilityTier>>,
    pub trend_periods: Vec<Period<TrendDirection>>,
    pub decade_periods: Vec<Period<String>>,
    pub top_dropoffs: DropOffSeries,
    pub context: Option<String>,
    pub summary: Summary,
    /// One explanatory note per summary line.
    pub notes: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl AnalysisReport {
    fn no_data(selection: Selection) -> Self {
        let message = match selection.year_range {
            Some((min, max)) => format!(
                "No export data for {} between {} and {}",
                selection.commodity, min, max
            ),
            None => format!("No export data for {}", selection.commodity),
        };
        Self {
            selection,
            no_data: true,
            message: Some(message),
            series: Vec::new(),
            dropoffs: Vec::new(),
            decomposition: Vec::new(),
            changepoint_years: Vec::new(),
            volatility_periods: Vec::new(),
            trend_periods: Vec::new(),
            decade_periods: Vec::new(),
            top_dropoffs: Vec::new(),
            context: None,
            summary: Vec::new(),
            notes: Vec::new(),
            generated_at: Utc::now(),
        }
    }

    /// Year span of the series, if any.
    pub fn year_span(&self) -> Option<(i32, i32)> {
        Some((self.series.first()?.year, self.series.last()?.year))
    }

    /// Write the chart table as CSV: year, value, moving average, trend.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        for row in &self.series {
            csv_writer.serialize(row)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

impl std::fmt::Display for AnalysisReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Export analysis for: {}", self.selection.commodity)?;
        if let Some(country) = &self.selection.country {
            write!(f, " ({})", country)?;
        }
        writeln!(f, " [{}]", self.selection.dataset)?;

        if self.no_data {
            if let Some(message) = &self.message {
                writeln!(f, "{}", message)?;
            }
            return Ok(());
        }

        writeln!(f, "\n=== Series ===")?;
        for row in &self.series {
            write!(f, "{}: {}", row.year, row.value)?;
            if let Some(avg) = row.moving_average {
                write!(f, " | avg {:.2}", avg)?;
            }
            if let Some(trend) = row.trend {
                write!(f, " | trend {:.2}", trend)?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n=== Volatility ===")?;
        for period in &self.volatility_periods {
            writeln!(f, "{} - {}: {}", period.start, period.end, period.label)?;
        }

        writeln!(f, "\n=== Trend ===")?;
        for period in &self.trend_periods {
            writeln!(f, "{} - {}: {}", period.start, period.end, period.label)?;
        }

        writeln!(f, "\n=== Summary ===")?;
        for line in &self.summary {
            writeln!(f, "- {}", line)?;
        }

        if !self.notes.is_empty() {
            writeln!(f, "\n{}", self.notes.join(" "))?;
        }

        if let Some(context) = &self.context {
            writeln!(f, "\n{}", context)?;
        }

        Ok(())
    }
}

/// Runs the full analysis for one selection over cached source tables.
pub struct AnalysisEngine {
    source: DataSource,
    config: AnalysisConfig,
    decomposer: Box<dyn Decomposer>,
    trend_fitter: Box<dyn TrendFitter>,
}

impl AnalysisEngine {
    pub fn new(source: DataSource, config: AnalysisConfig) -> Self {
        let decomposer = Box::new(AdditiveDecomposer::new(config.decomposition_period));
        let trend_fitter = Box::new(MovingAverageTrend::new(config.trend_window));
        Self {
            source,
            config,
            decomposer,
            trend_fitter,
        }
    }

    pub fn with_decomposer(mut self, decomposer: Box<dyn Decomposer>) -> Self {
        self.decomposer = decomposer;
        self
    }

    pub fn with_trend_fitter(mut self, trend_fitter: Box<dyn TrendFitter>) -> Self {
        self.trend_fitter = trend_fitter;
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn source(&self) -> &DataSource {
        &self.source
    }

    fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            drop_zero: self.config.drop_zero,
            origin: self.config.origin.clone(),
        }
    }

    /// Commodity names for populating a selector.
    pub fn commodities(&self, dataset: Dataset) -> Result<Vec<String>> {
        self.source.table(dataset)?.commodities()
    }

    pub fn countries(&self, dataset: Dataset) -> Result<Vec<String>> {
        self.source.table(dataset)?.countries()
    }

    /// Export totals by destination country for one commodity in one year.
    pub fn destinations(
        &self,
        dataset: Dataset,
        commodity: &str,
        year: i32,
    ) -> Result<Vec<ExportRow>> {
        let table = self.source.table(dataset)?;
        let mut rows =
            by_year_country_export(table.frame(), commodity, year, &self.aggregate_options())?;
        rows.sort_by(|a, b| {
            b.value
                .partial_cmp(&a.value)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rows)
    }

    /// Export series for a selection, restricted to its year range.
    pub fn series(&self, selection: &Selection) -> Result<ExportSeries> {
        let table = self.source.table(selection.dataset)?;
        let options = self.aggregate_options();
        let rows = match &selection.country {
            Some(_) => by_country_export(table.frame(), &options)?,
            None => by_export(table.frame(), &options)?,
        };

        let series = ExportSeries::from_rows(
            &rows,
            &selection.commodity,
            selection.country.as_deref(),
        );
        Ok(match selection.year_range {
            Some((min, max)) => series.within(min, max),
            None => series,
        })
    }

    pub fn run(&self, selection: &Selection) -> Result<AnalysisReport> {
        info!(
            "📊 Analyzing {} exports ({})",
            selection.commodity, selection.dataset
        );

        let series = self.series(selection)?;
        if series.is_empty() {
            info!("No rows for {:?}", selection);
            return Ok(AnalysisReport::no_data(selection.clone()));
        }

        let years = series.years();
        let values = series.values();
        debug!("Series has {} years", years.len());

        let dropoffs = compute_series_dropoffs(&series, &self.config.origin);
        let averages = moving_average(&values, self.config.moving_average_window);
        let decomposition = self.decompose(&series)?;
        let fitted: Vec<Option<f64>> = self
            .trend_fitter
            .fit(&years, &values)?
            .into_iter()
            .map(Some)
            .collect();

        let changepoint_years = self.changepoint_years(&years, &values)?;

        let tiers = volatility_tiers(
            &values,
            &fitted,
            self.config.volatility_window,
            self.config.volatility_low_quantile,
            self.config.volatility_high_quantile,
        );
        let volatility_periods = segment(&label_years(&years, &tiers));
        let trend_periods = segment(&label_years(&years, &trend_directions(&fitted)));
        let decade_periods = segment(&label_years(&years, &decade_labels(&years)));
        let bands = label_years(
            &years,
            &change_bands(&values, self.config.consistent_threshold),
        );
        debug!(
            "{} changepoints, {} volatility periods, {} trend periods",
            changepoint_years.len(),
            volatility_periods.len(),
            trend_periods.len()
        );

        let summary = summarize(
            &dropoffs,
            &PeriodSets {
                changepoint_years: Some(changepoint_years.clone()),
                decades: Some(decade_periods.clone()),
                change_bands: Some(bands),
            },
        );
        let top = top_dropoffs(&dropoffs, self.config.top_dropoffs);
        let notes = summary_notes(&summary);
        let context = dropoff_context(
            &selection.commodity,
            &self.config.origin_label,
            &dropoffs,
            &top,
        );

        let rows = series
            .points
            .iter()
            .zip(averages)
            .zip(&fitted)
            .map(|((point, moving_average), trend)| SeriesRow {
                year: point.year,
                value: point.value,
                moving_average,
                trend: *trend,
            })
            .collect();

        info!("✅ Analysis complete: {} summary lines", summary.len());
        Ok(AnalysisReport {
            selection: selection.clone(),
            no_data: false,
            message: None,
            series: rows,
            dropoffs,
            decomposition,
            changepoint_years,
            volatility_periods,
            trend_periods,
            decade_periods,
            top_dropoffs: top,
            context,
            summary,
            notes,
            generated_at: Utc::now(),
        })
    }

    /// Changepoint years over the non-zero years of the series.
    ///
    /// Zero years only survive aggregation when `drop_zero` is off; they are skipped
    /// here so a neighbour is never measured against a zero base.
    fn changepoint_years(&self, years: &[i32], values: &[f64]) -> Result<Vec<i32>> {
        let observed: Vec<(i32, f64)> = years
            .iter()
            .copied()
            .zip(values.iter().copied())
            .filter(|(_, value)| *value != 0.0)
            .collect();
        if observed.len() < values.len() {
            warn!(
                "Skipping {} zero-valued years in changepoint detection",
                values.len() - observed.len()
            );
        }

        let nonzero: Vec<f64> = observed.iter().map(|(_, value)| *value).collect();
        Ok(
            detect_changepoints(&nonzero, self.config.changepoint_threshold)?
                .into_iter()
                .map(|i| observed[i].0)
                .collect(),
        )
    }

    /// Short series cannot be decomposed; they keep their values with empty components.
    fn decompose(&self, series: &ExportSeries) -> Result<TrendDecomposition> {
        match decompose_series(series, self.decomposer.as_ref()) {
            Ok(decomposition) => Ok(decomposition),
            Err(InsightError::Decomposition(reason)) => {
                warn!("Skipping decomposition: {}", reason);
                Ok(series
                    .points
                    .iter()
                    .map(|p| TrendPoint {
                        year: p.year,
                        value: p.value,
                        trend: None,
                        seasonal: None,
                        residual: None,
                    })
                    .collect())
            }
            Err(e) => Err(e),
        }
    }
}
