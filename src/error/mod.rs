//! Error handling for the record aggregation pipeline.

use std::path::PathBuf;

/// Errors that can occur while reading the record container or running the
/// aggregation pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Error opening or reading a file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Error processing Parquet data
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Error processing Arrow data
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Error reading or writing CSV data
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Error serializing the metadata document
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A named table is missing from the record container
    #[error("table '{table}' not found in record container at {path}")]
    MissingTable { table: &'static str, path: PathBuf },

    /// A required column is missing from a table
    #[error("column '{column}' missing from table '{table}'")]
    MissingColumn {
        table: &'static str,
        column: String,
    },

    /// A column value could not be decoded into the expected type
    #[error("table '{table}', column '{column}': {detail}")]
    Decode {
        table: &'static str,
        column: String,
        detail: String,
    },

    /// A timestamp value could not be parsed as a date
    #[error("could not parse '{value}' as a date")]
    DateParse { value: String },

    /// Invalid pipeline configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A consistency check failed for one metric. The orchestrator treats
    /// this as fatal for the whole run; callers driving a single metric can
    /// catch it and skip that metric alone.
    #[error("consistency check failed for metric '{metric}': {detail}")]
    Validation { metric: String, detail: String },
}

impl PipelineError {
    /// Create a decode error for a table column
    pub fn decode(table: &'static str, column: &str, detail: impl Into<String>) -> Self {
        Self::Decode {
            table,
            column: column.to_string(),
            detail: detail.into(),
        }
    }

    /// Create a validation error scoped to a metric
    pub fn validation(metric: &str, detail: impl Into<String>) -> Self {
        Self::Validation {
            metric: metric.to_string(),
            detail: detail.into(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
