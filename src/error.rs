// src/error.rs

use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use thiserror::Error;

/// Fatal pipeline failures. Any of these aborts the run before the sink is touched.
///
/// Unparseable numeric values are *not* errors; the coercer zero-fills them.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The raw record stream could not be read or a line is not a flat JSON object.
    #[error("malformed raw record at line {line}: {reason}")]
    DataFormat { line: usize, reason: String },

    /// A stage received a column of the wrong kind, or no such column at all.
    #[error("column `{column}` must be {expected}, found {found}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        found: String,
    },

    /// The store could not be opened, written or read.
    #[error("persisting table `{table}` failed: {source}")]
    Persistence {
        table: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Building an Arrow batch failed after all preconditions held.
    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),
}

impl PipelineError {
    pub(crate) fn data_format(line: usize, reason: impl Into<String>) -> Self {
        PipelineError::DataFormat {
            line,
            reason: reason.into(),
        }
    }

    pub(crate) fn type_mismatch(column: &str, expected: &'static str, found: &DataType) -> Self {
        PipelineError::TypeMismatch {
            column: column.to_string(),
            expected,
            found: found.to_string(),
        }
    }

    pub(crate) fn missing_column(column: &str, expected: &'static str) -> Self {
        PipelineError::TypeMismatch {
            column: column.to_string(),
            expected,
            found: "no such column".to_string(),
        }
    }

    pub(crate) fn persistence<E>(table: &str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        PipelineError::Persistence {
            table: table.to_string(),
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
