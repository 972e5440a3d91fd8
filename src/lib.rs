//! # Relationalize - JSON to relational tables
//!
//! Flattens nested, heterogeneous JSON records into flat tables linked by
//! synthetic id columns, infers a SQL schema for every table from the flat
//! records, and renders DDL, CSV rows, or catalog table definitions for a
//! chosen SQL dialect.
//!
//! ## Modules
//!
//! - **melt**: flatten JSON into one flat-record stream per table
//! - **schema**: per-table type profiles, finalization, conversion and DDL
//! - **dialect**: native types and quoting for each target database
//! - **source** / **output**: reading JSON input and writing CSV
//!
//! ## Quick Start
//!
//! ```rust
//! use relationalize::dialect::DialectKind;
//! use relationalize::melt::MeltConfig;
//! use serde_json::json;
//!
//! # fn main() -> relationalize::Result<()> {
//! let records = vec![
//!     json!({"id": 1, "tags": [{"k": "x"}]}),
//!     json!({"id": "two", "tags": []}),
//! ];
//!
//! let streams = relationalize::relationalize_records("root", records, MeltConfig::default())?;
//! let schemas = relationalize::infer_schemas(&streams, DialectKind::Postgres)?;
//!
//! // `root.id` was seen as integer and string, so it is rendered as text
//! let ddl = schemas.get("root").unwrap().generate_ddl("root", "public")?;
//! assert!(ddl.contains("\"id\" TEXT NOT NULL"));
//! # Ok(())
//! # }
//! ```

pub mod dialect;
pub mod error;
pub mod melt;
pub mod output;
pub mod schema;
pub mod source;
pub mod types;

pub use dialect::{Dialect, DialectKind, MssqlDialect, PostgresDialect};
pub use error::{Error, Result};
pub use melt::{MeltConfig, ObjectStream, Relationalizer, ScalarArrayPolicy, TableWriter};
pub use schema::{Schema, SchemaSet, SchemaState};
pub use types::{FlatRecord, TypeSet, TypeTag};

use serde_json::Value;

/// Flatten `records` into memory, one [`ObjectStream`] per table in the
/// order tables were first written.
pub fn relationalize_records<I>(
    object_name: &str,
    records: I,
    config: MeltConfig,
) -> Result<Vec<ObjectStream>>
where
    I: IntoIterator<Item = Value>,
{
    melt::relationalize_to_memory(object_name, records, config)
}

/// Read every stream into its own schema and finalize them all.
///
/// Linkage columns are taken to have their default names; build a
/// [`SchemaSet`] with [`SchemaSet::with_linkage_columns`] for custom ones.
pub fn infer_schemas(streams: &[ObjectStream], dialect: DialectKind) -> Result<SchemaSet> {
    let mut schemas = SchemaSet::new(dialect.dialect());
    for stream in streams {
        for record in &stream.records {
            schemas.observe(&stream.name, record)?;
        }
    }
    schemas.finalize_all()?;
    Ok(schemas)
}
