//! Schema inference for flat record streams
//!
//! One [`Schema`] per table accumulates column type profiles, is finalized once
//! the stream is read, and then converts records and renders table definitions
//! through its [`Dialect`](crate::dialect::Dialect).

pub mod inference;
pub mod profile;
pub mod table;

pub use inference::{Schema, SchemaSet, SchemaState};
pub use profile::{ColumnProfile, TagCount};
pub use table::{Catalog, ColumnDef, MetaData, TableDef};
