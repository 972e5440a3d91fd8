//! Error types for flattening, schema inference and rendering.

use crate::schema::SchemaState;
use crate::types::TypeTag;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Two different JSON paths flatten to the same name within one table
    #[error("shape conflict in table `{table}`: `{column}` is produced by more than one JSON path")]
    ShapeConflict { table: String, column: String },

    /// A flat record holds an array or object where only scalars are allowed
    #[error("column `{column}` holds a non-scalar {found} value")]
    InvalidScalar { column: String, found: &'static str },

    /// An operation was called in the wrong schema lifecycle phase
    #[error("`{operation}` is not allowed while the schema is {state}")]
    StateViolation {
        operation: &'static str,
        state: SchemaState,
    },

    /// The active dialect cannot render a type
    #[error("dialect `{dialect}` has no native type for `{tag}`")]
    DialectGap { dialect: &'static str, tag: TypeTag },

    #[error("unknown dialect `{0}`")]
    UnknownDialect(String),

    /// I/O error from a sink or source, passed through unchanged
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JSON parse error: {0}")]
    Simd(#[from] simd_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub(crate) fn shape_conflict(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ShapeConflict {
            table: table.into(),
            column: column.into(),
        }
    }

    pub(crate) fn state(operation: &'static str, state: SchemaState) -> Self {
        Self::StateViolation { operation, state }
    }
}
