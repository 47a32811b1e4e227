use thiserror::Error;

#[derive(Error, Debug)]
pub enum InsightError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Division by zero: previous value is zero at index {index}")]
    DivisionByZero { index: usize },

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decomposition error: {0}")]
    Decomposition(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),
}

pub type Result<T> = std::result::Result<T, InsightError>;
