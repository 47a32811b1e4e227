//! Typed rows and series passed between pipeline stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute value that marks an export row in the PSD tables.
pub const EXPORTS_ATTRIBUTE: &str = "Exports";

/// One raw line of a PSD commodity table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommodityRecord {
    pub commodity: String,
    pub country: String,
    pub year: i32,
    pub attribute: String,
    pub value: f64,
}

impl CommodityRecord {
    pub fn new(
        commodity: impl Into<String>,
        country: impl Into<String>,
        year: i32,
        attribute: impl Into<String>,
        value: f64,
    ) -> Self {
        Self {
            commodity: commodity.into(),
            country: country.into(),
            year,
            attribute: attribute.into(),
            value,
        }
    }
}

/// One aggregated export total. `country` is `None` when countries were summed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub commodity: String,
    pub country: Option<String>,
    pub year: i32,
    pub value: f64,
    pub origin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub year: i32,
    pub value: f64,
}

/// Export totals for a single commodity (and optionally a single country),
/// strictly ascending by year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportSeries {
    pub commodity: String,
    pub country: Option<String>,
    pub points: Vec<SeriesPoint>,
}

impl ExportSeries {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn years(&self) -> Vec<i32> {
        self.points.iter().map(|p| p.year).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// Copy of the series restricted to `min..=max`.
    pub fn within(&self, min_year: i32, max_year: i32) -> ExportSeries {
        ExportSeries {
            commodity: self.commodity.clone(),
            country: self.country.clone(),
            points: self
                .points
                .iter()
                .filter(|p| p.year >= min_year && p.year <= max_year)
                .copied()
                .collect(),
        }
    }

    /// The series as aggregated rows, for stages that work over grouped rows.
    pub fn to_rows(&self, origin: &str) -> Vec<ExportRow> {
        self.points
            .iter()
            .map(|p| ExportRow {
                commodity: self.commodity.clone(),
                country: self.country.clone(),
                year: p.year,
                value: p.value,
                origin: origin.to_string(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropOffPoint {
    pub commodity: String,
    pub country: Option<String>,
    pub year: i32,
    pub value: f64,
    pub previous_value: Option<f64>,
    /// `previous_value - value`; positive means exports fell.
    pub drop_off: Option<f64>,
    /// `drop_off / previous_value * 100`; `None` when the previous value is zero.
    pub pct_change: Option<f64>,
}

pub type DropOffSeries = Vec<DropOffPoint>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub year: i32,
    pub value: f64,
    pub trend: Option<f64>,
    pub seasonal: Option<f64>,
    pub residual: Option<f64>,
}

pub type TrendDecomposition = Vec<TrendPoint>;

/// A maximal run of consecutive years sharing one label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Period<L> {
    pub start: i32,
    pub end: i32,
    pub label: L,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VolatilityTier {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrendDirection {
    Increase,
    Decrease,
    NoChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeBand {
    Consistent,
    Increasing,
    Decreasing,
}

impl fmt::Display for VolatilityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolatilityTier::Low => write!(f, "Low"),
            VolatilityTier::Medium => write!(f, "Medium"),
            VolatilityTier::High => write!(f, "High"),
        }
    }
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Increase => write!(f, "Increase"),
            TrendDirection::Decrease => write!(f, "Decrease"),
            TrendDirection::NoChange => write!(f, "No Change"),
        }
    }
}

impl fmt::Display for ChangeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeBand::Consistent => write!(f, "Consistent"),
            ChangeBand::Increasing => write!(f, "Increasing"),
            ChangeBand::Decreasing => write!(f, "Decreasing"),
        }
    }
}

pub type Summary = Vec<String>;
