//! JSON melting - flatten nested JSON into relational tables
//!
//! Objects widen the current row; arrays spawn child tables linked to their
//! parent through synthetic id columns. Rows go to one sink per table through
//! a [`TableWriter`].

pub mod config;
pub mod extractor;
pub mod writer;

pub use config::{MeltConfig, ScalarArrayPolicy};
pub use extractor::{relationalize_to_memory, FlatRow, Relationalizer, RunStats};
pub use writer::{
    JsonLinesDir, JsonLinesSink, MemorySinks, ObjectStream, RecordSink, SinkFactory, TableWriter,
};
