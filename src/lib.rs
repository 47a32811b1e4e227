pub mod aggregate;
pub mod config;
pub mod decompose;
pub mod dropoff;
pub mod error;
pub mod insights;
pub mod llm;
pub mod models;
pub mod pipeline;
pub mod segment;
pub mod source;
pub mod summary;

pub use config::{AnalysisConfig, DataConfig, LlmConfig};
pub use error::{InsightError, Result};
pub use insights::{InsightBuffer, InsightOrchestrator};
pub use llm::{LlmClient, TextGenerator};
pub use pipeline::{AnalysisEngine, AnalysisReport, Selection};
pub use source::{DataSource, Dataset};
