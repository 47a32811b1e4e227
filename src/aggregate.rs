//! Export aggregation: raw PSD tables to per-group export totals.

use crate::config::DEFAULT_ORIGIN;
use crate::error::Result;
use crate::models::{ExportRow, ExportSeries, SeriesPoint, EXPORTS_ATTRIBUTE};
use crate::source::{ATTRIBUTE_COL, COMMODITY_COL, COUNTRY_COL, VALUE_COL, YEAR_COL};
use polars::prelude::*;
use tracing::debug;

/// Grouping granularity. Year is always part of the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Granularity {
    /// (commodity, year), all destination countries summed
    Commodity,
    /// (commodity, country, year)
    CommodityCountry,
    /// (commodity, country, year) restricted to one commodity and one year
    CommodityCountryYear { commodity: String, year: i32 },
}

impl Granularity {
    fn has_country(&self) -> bool {
        !matches!(self, Granularity::Commodity)
    }

    fn group_keys(&self) -> Vec<Expr> {
        if self.has_country() {
            vec![col(COMMODITY_COL), col(COUNTRY_COL), col(YEAR_COL)]
        } else {
            vec![col(COMMODITY_COL), col(YEAR_COL)]
        }
    }
}

#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Drop groups whose sum is exactly `0.0`.
    pub drop_zero: bool,
    pub origin: String,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            drop_zero: true,
            origin: DEFAULT_ORIGIN.to_string(),
        }
    }
}

/// Sum export values per group and return the grouped frame ascending by year.
///
/// `frame` must carry the typed layout of [`crate::source::CommodityTable`].
pub fn aggregate_frame(
    frame: &DataFrame,
    granularity: &Granularity,
    options: &AggregateOptions,
) -> Result<DataFrame> {
    let mut lazy = frame
        .clone()
        .lazy()
        .filter(col(ATTRIBUTE_COL).eq(lit(EXPORTS_ATTRIBUTE)));

    if let Granularity::CommodityCountryYear { commodity, year } = granularity {
        lazy = lazy.filter(
            col(COMMODITY_COL)
                .eq(lit(commodity.as_str()))
                .and(col(YEAR_COL).eq(lit(*year))),
        );
    }

    let mut grouped = lazy
        .group_by(granularity.group_keys())
        .agg([col(VALUE_COL).sum()]);
    if options.drop_zero {
        grouped = grouped.filter(col(VALUE_COL).neq(lit(0.0)));
    }

    // year first; the remaining keys only break ties
    let mut order = vec![col(YEAR_COL), col(COMMODITY_COL)];
    if granularity.has_country() {
        order.push(col(COUNTRY_COL));
    }
    let result = grouped
        .sort_by_exprs(order, SortMultipleOptions::default())
        .collect()?;
    Ok(result)
}

/// Sum export values per group and return typed rows ascending by year.
///
/// Non-export attributes never reach the output. An empty input, or a filter that
/// matches nothing, yields an empty vector.
pub fn aggregate(
    frame: &DataFrame,
    granularity: &Granularity,
    options: &AggregateOptions,
) -> Result<Vec<ExportRow>> {
    let grouped = aggregate_frame(frame, granularity, options)?;

    let commodities = grouped.column(COMMODITY_COL)?.str()?;
    let countries = if granularity.has_country() {
        Some(grouped.column(COUNTRY_COL)?.str()?)
    } else {
        None
    };
    let years = grouped.column(YEAR_COL)?.i32()?;
    let values = grouped.column(VALUE_COL)?.f64()?;

    let mut rows = Vec::with_capacity(grouped.height());
    for idx in 0..grouped.height() {
        let (Some(commodity), Some(year)) = (commodities.get(idx), years.get(idx)) else {
            continue;
        };
        rows.push(ExportRow {
            commodity: commodity.to_string(),
            country: countries
                .and_then(|c| c.get(idx))
                .map(str::to_string),
            year,
            value: values.get(idx).unwrap_or(0.0),
            origin: options.origin.clone(),
        });
    }

    debug!(
        "Aggregated {} rows into {} groups ({:?})",
        frame.height(),
        rows.len(),
        granularity
    );
    Ok(rows)
}

/// Export totals per (commodity, year).
pub fn by_export(frame: &DataFrame, options: &AggregateOptions) -> Result<Vec<ExportRow>> {
    aggregate(frame, &Granularity::Commodity, options)
}

/// Export totals per (commodity, country, year).
pub fn by_country_export(frame: &DataFrame, options: &AggregateOptions) -> Result<Vec<ExportRow>> {
    aggregate(frame, &Granularity::CommodityCountry, options)
}

/// Export totals per destination country for one commodity in one year.
pub fn by_year_country_export(
    frame: &DataFrame,
    commodity: &str,
    year: i32,
    options: &AggregateOptions,
) -> Result<Vec<ExportRow>> {
    aggregate(
        frame,
        &Granularity::CommodityCountryYear {
            commodity: commodity.to_string(),
            year,
        },
        options,
    )
}

impl ExportSeries {
    /// Pick the rows of one commodity (and country, if given) out of aggregated rows.
    ///
    /// Rows must come from a single aggregation, so each year appears at most once per key.
    pub fn from_rows(rows: &[ExportRow], commodity: &str, country: Option<&str>) -> ExportSeries {
        let mut points: Vec<SeriesPoint> = rows
            .iter()
            .filter(|r| r.commodity == commodity && r.country.as_deref() == country)
            .map(|r| SeriesPoint {
                year: r.year,
                value: r.value,
            })
            .collect();
        points.sort_by_key(|p| p.year);
        points.dedup_by_key(|p| p.year);

        ExportSeries {
            commodity: commodity.to_string(),
            country: country.map(str::to_string),
            points,
        }
    }
}
