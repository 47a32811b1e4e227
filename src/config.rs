//! Analysis and client configuration
//!
//! Every threshold used by the pipeline lives in [`AnalysisConfig`] so callers can
//! tune them from a JSON file instead of editing literals.

use crate::error::{InsightError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_ORIGIN: &str = "United States, America";
pub const DEFAULT_MODEL: &str = "gpt-4";
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DUMMY_API_KEY: &str = "dummy-api-key";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Year-over-year change below this fraction counts as "consistent".
    pub consistent_threshold: f64,

    /// Relative change above this fraction marks a changepoint.
    pub changepoint_threshold: f64,

    /// Trailing window (observations) for the residual rolling std.
    pub volatility_window: usize,

    pub volatility_low_quantile: f64,
    pub volatility_high_quantile: f64,

    /// Window of the moving-average overlay.
    pub moving_average_window: usize,

    /// How many drop-off years to report in the context line.
    pub top_dropoffs: usize,

    /// Period passed to the additive decomposition.
    pub decomposition_period: usize,

    /// Centred window of the fitted trend that drives trend-direction and volatility labels.
    pub trend_window: usize,

    /// Constant origin tag attached to aggregated rows.
    pub origin: String,

    /// Short origin name used in prompts and context lines.
    pub origin_label: String,

    /// Drop aggregated rows whose summed value is exactly zero.
    pub drop_zero: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            consistent_threshold: 0.05,
            changepoint_threshold: 0.10,
            volatility_window: 3,
            volatility_low_quantile: 0.25,
            volatility_high_quantile: 0.75,
            moving_average_window: 3,
            top_dropoffs: 3,
            decomposition_period: 1,
            trend_window: 3,
            origin: DEFAULT_ORIGIN.to_string(),
            origin_label: "USA".to_string(),
            drop_zero: true,
        }
    }
}

impl AnalysisConfig {
    /// Load from a JSON file; missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.volatility_window == 0 || self.moving_average_window == 0 || self.trend_window == 0
        {
            return Err(InsightError::Config(
                "rolling windows must be at least 1".to_string(),
            ));
        }
        if self.decomposition_period == 0 {
            return Err(InsightError::Config(
                "decomposition_period must be at least 1".to_string(),
            ));
        }
        let quantiles = [self.volatility_low_quantile, self.volatility_high_quantile];
        if quantiles.iter().any(|q| !(0.0..=1.0).contains(q))
            || self.volatility_low_quantile > self.volatility_high_quantile
        {
            return Err(InsightError::Config(format!(
                "invalid volatility quantiles: {} / {}",
                self.volatility_low_quantile, self.volatility_high_quantile
            )));
        }
        if self.consistent_threshold < 0.0 || self.changepoint_threshold < 0.0 {
            return Err(InsightError::Config(
                "thresholds must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    /// Resolve from an explicit key or `OPENAI_API_KEY`, `OPENAI_MODEL`, `OPENAI_BASE_URL`.
    /// Without any key the client runs in dummy mode.
    pub fn from_env(api_key: Option<String>) -> Self {
        let api_key = api_key
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| DUMMY_API_KEY.to_string());
        let model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let base_url =
            std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        Self {
            api_key,
            model,
            base_url,
        }
    }

    pub fn is_dummy(&self) -> bool {
        self.api_key == DUMMY_API_KEY
    }
}

#[derive(Debug, Clone)]
pub struct DataConfig {
    pub data_dir: PathBuf,
}

impl DataConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self::new(".")
    }
}
