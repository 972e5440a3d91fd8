//! SQL dialects
//!
//! A dialect maps the semantic [`TypeTag`] of a finalized column to a native
//! column type and knows how the target engine quotes identifiers and literals.
//! Dialects are stateless; a [`Schema`](crate::schema::Schema) holds one for its
//! whole lifetime.

pub mod mssql;
pub mod postgres;

pub use mssql::MssqlDialect;
pub use postgres::PostgresDialect;

use crate::error::{Error, Result};
use crate::types::TypeTag;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Capabilities every target database provides.
pub trait Dialect: fmt::Debug + Send + Sync {
    /// Registry name, e.g. `"postgres"`.
    fn name(&self) -> &'static str;

    /// Native type name for a tag, or `None` when the dialect has no mapping.
    fn native_type(&self, tag: TypeTag) -> Option<String>;

    fn quote_identifier(&self, name: &str) -> String;

    /// Longest identifier the engine accepts without truncation.
    fn max_identifier_length(&self) -> usize;

    fn null_constraint(&self, nullable: bool) -> &'static str {
        if nullable {
            "NULL"
        } else {
            "NOT NULL"
        }
    }

    /// Full column type, e.g. `BIGINT NOT NULL`.
    fn column_type(&self, tag: TypeTag, nullable: bool) -> Result<String> {
        let native = self.native_type(tag).ok_or(Error::DialectGap {
            dialect: self.name(),
            tag,
        })?;
        Ok(format!("{} {}", native, self.null_constraint(nullable)))
    }

    fn quote_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    /// Text for one delimited-file field. `None` means SQL NULL and is written as
    /// an empty unquoted field.
    fn csv_field(&self, value: &Value) -> Option<String> {
        match value {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Registered dialects, selectable by name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    #[default]
    Postgres,
    Mssql,
}

impl DialectKind {
    pub const ALL: [DialectKind; 2] = [DialectKind::Postgres, DialectKind::Mssql];

    pub fn as_str(self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgres",
            DialectKind::Mssql => "mssql",
        }
    }

    pub fn dialect(self) -> Arc<dyn Dialect> {
        match self {
            DialectKind::Postgres => Arc::new(PostgresDialect),
            DialectKind::Mssql => Arc::new(MssqlDialect),
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DialectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(DialectKind::Postgres),
            "mssql" | "sqlserver" | "tsql" => Ok(DialectKind::Mssql),
            _ => Err(Error::UnknownDialect(s.to_string())),
        }
    }
}

/// Look up a registered dialect by name.
pub fn dialect_by_name(name: &str) -> Result<Arc<dyn Dialect>> {
    Ok(name.parse::<DialectKind>()?.dialect())
}
