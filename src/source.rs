//! Tabular data source for the PSD commodity tables.
//!
//! Each dataset is read once, on first use, and cached for the lifetime of the
//! [`DataSource`]. Cached tables are immutable and handed out as `Arc`s.

use crate::config::DataConfig;
use crate::error::{InsightError, Result};
use crate::models::CommodityRecord;
use itertools::Itertools;
use once_cell::sync::OnceCell;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const COMMODITY_COL: &str = "Commodity_Description";
pub const COUNTRY_COL: &str = "Country_Name";
pub const YEAR_COL: &str = "Calendar_Year";
pub const ATTRIBUTE_COL: &str = "Attribute_Description";
pub const VALUE_COL: &str = "Value";

pub const REQUIRED_COLUMNS: [&str; 5] = [
    COMMODITY_COL,
    COUNTRY_COL,
    YEAR_COL,
    ATTRIBUTE_COL,
    VALUE_COL,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Dataset {
    Livestock,
    Coffee,
    Fruits,
    Grains,
}

impl Dataset {
    pub const ALL: [Dataset; 4] = [
        Dataset::Livestock,
        Dataset::Coffee,
        Dataset::Fruits,
        Dataset::Grains,
    ];

    /// File location relative to the data directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Dataset::Livestock => "livestock/psd_livestock.csv",
            Dataset::Coffee => "coffee/psd_coffee.csv",
            Dataset::Fruits => "fruits/psd_fruits_vegetables.csv",
            Dataset::Grains => "grains/psd_grains_pulses.csv",
        }
    }

    fn index(&self) -> usize {
        match self {
            Dataset::Livestock => 0,
            Dataset::Coffee => 1,
            Dataset::Fruits => 2,
            Dataset::Grains => 3,
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dataset::Livestock => write!(f, "Livestock"),
            Dataset::Coffee => write!(f, "Coffee"),
            Dataset::Fruits => write!(f, "Fruits"),
            Dataset::Grains => write!(f, "Grains"),
        }
    }
}

impl FromStr for Dataset {
    type Err = InsightError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "livestock" => Ok(Dataset::Livestock),
            "coffee" => Ok(Dataset::Coffee),
            "fruits" => Ok(Dataset::Fruits),
            "grains" => Ok(Dataset::Grains),
            other => Err(InsightError::Config(format!(
                "Unknown dataset '{}' (expected one of: {})",
                other,
                Dataset::ALL.iter().join(", ")
            ))),
        }
    }
}

/// Typed, schema-checked view of one PSD table.
///
/// The frame always holds the five required columns as String, String, Int32,
/// String and Float64, with no null keys and no null values.
#[derive(Debug, Clone)]
pub struct CommodityTable {
    frame: DataFrame,
}

impl CommodityTable {
    /// Build a table from in-memory records.
    pub fn from_records(records: &[CommodityRecord]) -> Result<Self> {
        let df = df! [
            COMMODITY_COL => records.iter().map(|r| r.commodity.as_str()).collect::<Vec<_>>(),
            COUNTRY_COL => records.iter().map(|r| r.country.as_str()).collect::<Vec<_>>(),
            YEAR_COL => records.iter().map(|r| r.year).collect::<Vec<i32>>(),
            ATTRIBUTE_COL => records.iter().map(|r| r.attribute.as_str()).collect::<Vec<_>>(),
            VALUE_COL => records.iter().map(|r| r.value).collect::<Vec<f64>>()
        ]?;
        Self::from_frame(&df)
    }

    pub fn from_csv(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(InsightError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("CSV file not found: {}", path.display()),
            )));
        }

        info!("📂 Loading CSV: {}", path.display());
        let df = LazyCsvReader::new(path)
            .with_has_header(true)
            .finish()?
            .collect()?;

        let table = Self::from_frame(&df)?;
        info!("✅ Loaded {} rows from {}", table.len(), path.display());
        Ok(table)
    }

    /// Validate the schema and cast a frame to the typed layout.
    ///
    /// Missing columns fail immediately. Null values are read as `0.0` so they
    /// behave like an empty contribution to a sum; rows with a null key are skipped.
    pub fn from_frame(df: &DataFrame) -> Result<Self> {
        let present = df.get_column_names();
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|required| !present.contains(required))
            .collect();
        if !missing.is_empty() {
            return Err(InsightError::MalformedInput(format!(
                "missing columns: {}",
                missing.join(", ")
            )));
        }

        let frame = df
            .clone()
            .lazy()
            .select([
                col(COMMODITY_COL).cast(DataType::String),
                col(COUNTRY_COL).cast(DataType::String),
                col(YEAR_COL).cast(DataType::Int32),
                col(ATTRIBUTE_COL).cast(DataType::String),
                col(VALUE_COL).cast(DataType::Float64).fill_null(lit(0.0)),
            ])
            .filter(
                col(COMMODITY_COL)
                    .is_not_null()
                    .and(col(COUNTRY_COL).is_not_null())
                    .and(col(YEAR_COL).is_not_null())
                    .and(col(ATTRIBUTE_COL).is_not_null()),
            )
            .collect()?;

        let skipped = df.height() - frame.height();
        if skipped > 0 {
            warn!("Skipped {} rows with null key columns", skipped);
        }

        Ok(Self { frame })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Materialize the rows as typed records.
    pub fn records(&self) -> Result<Vec<CommodityRecord>> {
        let commodities = self.frame.column(COMMODITY_COL)?.str()?;
        let countries = self.frame.column(COUNTRY_COL)?.str()?;
        let years = self.frame.column(YEAR_COL)?.i32()?;
        let attributes = self.frame.column(ATTRIBUTE_COL)?.str()?;
        let values = self.frame.column(VALUE_COL)?.f64()?;

        let mut records = Vec::with_capacity(self.frame.height());
        for idx in 0..self.frame.height() {
            if let (Some(commodity), Some(country), Some(year), Some(attribute), Some(value)) = (
                commodities.get(idx),
                countries.get(idx),
                years.get(idx),
                attributes.get(idx),
                values.get(idx),
            ) {
                records.push(CommodityRecord::new(commodity, country, year, attribute, value));
            }
        }
        Ok(records)
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    /// Distinct commodity descriptions in first-appearance order.
    pub fn commodities(&self) -> Result<Vec<String>> {
        self.distinct(COMMODITY_COL)
    }

    /// Distinct country names in first-appearance order.
    pub fn countries(&self) -> Result<Vec<String>> {
        self.distinct(COUNTRY_COL)
    }

    fn distinct(&self, column: &str) -> Result<Vec<String>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .frame
            .column(column)?
            .str()?
            .into_iter()
            .flatten()
            .unique()
            .map(str::to_string)
            .collect())
    }
}

/// Lazily loads and caches the four PSD datasets.
pub struct DataSource {
    config: DataConfig,
    tables: [OnceCell<Arc<CommodityTable>>; 4],
}

impl DataSource {
    pub fn new(config: DataConfig) -> Self {
        Self {
            config,
            tables: Default::default(),
        }
    }

    /// Seed the cache with an in-memory table. Has no effect if the dataset was already loaded.
    pub fn preload(&self, dataset: Dataset, table: CommodityTable) {
        if self.tables[dataset.index()].set(Arc::new(table)).is_err() {
            debug!("{} already cached, ignoring preload", dataset);
        }
    }

    pub fn table(&self, dataset: Dataset) -> Result<Arc<CommodityTable>> {
        let table = self.tables[dataset.index()].get_or_try_init(|| {
            let path = self.config.data_dir.join(dataset.file_name());
            info!("Loading dataset {} from {}", dataset, path.display());
            CommodityTable::from_csv(&path).map(Arc::new)
        })?;
        Ok(Arc::clone(table))
    }

    pub fn is_loaded(&self, dataset: Dataset) -> bool {
        self.tables[dataset.index()].get().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CSV: &str = "\
Commodity_Description,Country_Name,Calendar_Year,Attribute_Description,Value
\"Meat, Chicken\",Brazil,2019,Exports,10.5
\"Meat, Chicken\",Brazil,2019,Imports,3
\"Meat, Chicken\",Mexico,2020,Exports,
\"Meat, Beef\",Brazil,2020,Exports,7
";

    #[test]
    fn test_dataset_parse_case_insensitive() {
        assert_eq!("coffee".parse::<Dataset>().unwrap(), Dataset::Coffee);
        assert_eq!("GRAINS".parse::<Dataset>().unwrap(), Dataset::Grains);
        assert!(matches!(
            "cotton".parse::<Dataset>(),
            Err(InsightError::Config(_))
        ));
    }

    #[test]
    fn test_from_frame_rejects_missing_columns() {
        let df = df! [
            "Commodity_Description" => ["Meat, Chicken"],
            "Calendar_Year" => [2020],
            "Value" => [1.0]
        ]
        .unwrap();

        match CommodityTable::from_frame(&df) {
            Err(InsightError::MalformedInput(msg)) => {
                assert!(msg.contains("Country_Name"));
                assert!(msg.contains("Attribute_Description"));
            }
            other => panic!("expected MalformedInput, got {:?}", other),
        }
    }

    #[test]
    fn test_from_frame_types_rows() {
        let df = df! [
            "Commodity_Description" => ["Coffee, Green", "Coffee, Green"],
            "Country_Name" => ["Brazil", "Vietnam"],
            "Calendar_Year" => [2019i64, 2020],
            "Attribute_Description" => ["Exports", "Exports"],
            "Value" => [100i64, 200]
        ]
        .unwrap();

        let table = CommodityTable::from_frame(&df).unwrap();
        assert_eq!(table.len(), 2);
        let records = table.records().unwrap();
        assert_eq!(records[1].year, 2020);
        assert_eq!(records[1].value, 200.0);
        assert_eq!(table.countries().unwrap(), vec!["Brazil", "Vietnam"]);
    }

    #[test]
    fn test_from_frame_skips_null_keys() {
        let df = df! [
            "Commodity_Description" => ["Rice", "Rice"],
            "Country_Name" => [Some("Thailand"), None],
            "Calendar_Year" => [2020, 2020],
            "Attribute_Description" => ["Exports", "Exports"],
            "Value" => [Some(3.0), Some(4.0)]
        ]
        .unwrap();

        let table = CommodityTable::from_frame(&df).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.frame().column(YEAR_COL).unwrap().dtype(), &DataType::Int32);
        assert_eq!(table.countries().unwrap(), vec!["Thailand"]);
    }

    #[test]
    fn test_from_csv_reads_quoted_commodities_and_null_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("psd.csv");
        std::fs::write(&path, SAMPLE_CSV).unwrap();

        let table = CommodityTable::from_csv(&path).unwrap();
        assert_eq!(table.len(), 4);
        assert_eq!(table.commodities().unwrap(), vec!["Meat, Chicken", "Meat, Beef"]);
        assert_eq!(table.records().unwrap()[2].value, 0.0);
    }

    #[test]
    fn test_data_source_caches_per_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(Dataset::Coffee.file_name());
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, SAMPLE_CSV).unwrap();

        let source = DataSource::new(DataConfig::new(dir.path()));
        assert!(!source.is_loaded(Dataset::Coffee));

        let first = source.table(Dataset::Coffee).unwrap();
        std::fs::remove_file(&file).unwrap();
        let second = source.table(Dataset::Coffee).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!source.is_loaded(Dataset::Livestock));
        assert!(source.table(Dataset::Livestock).is_err());
    }

    #[test]
    fn test_preload_seeds_cache() {
        let source = DataSource::new(DataConfig::default());
        source.preload(
            Dataset::Grains,
            CommodityTable::from_records(&[CommodityRecord::new(
                "Wheat", "India", 2021, "Exports", 4.0,
            )])
            .unwrap(),
        );
        assert_eq!(source.table(Dataset::Grains).unwrap().len(), 1);
    }
}
