//! Structural table descriptions
//!
//! The same information [`Schema::generate_ddl`](super::Schema::generate_ddl)
//! renders as text, expressed as data so a catalog can create, drop or compare
//! tables without parsing SQL.

use crate::dialect::Dialect;
use crate::error::Result;
use crate::types::TypeTag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: TypeTag,
    /// Native type in the dialect the table was described with
    pub native_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Database schema (namespace) the table lives in, if any
    pub schema: Option<String>,
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn qualified_name(&self, dialect: &dyn Dialect) -> String {
        match &self.schema {
            Some(schema) => format!(
                "{}.{}",
                dialect.quote_identifier(schema),
                dialect.quote_identifier(&self.name)
            ),
            None => dialect.quote_identifier(&self.name),
        }
    }

    pub fn create_statement(&self, dialect: &dyn Dialect) -> String {
        let columns: Vec<String> = self
            .columns
            .iter()
            .map(|column| {
                format!(
                    "    {} {} {}",
                    dialect.quote_identifier(&column.name),
                    column.native_type,
                    dialect.null_constraint(column.nullable)
                )
            })
            .collect();

        format!(
            "CREATE TABLE {} (\n{}\n);\n",
            self.qualified_name(dialect),
            columns.join(",\n")
        )
    }

    pub fn drop_statement(&self, dialect: &dyn Dialect, if_exists: bool) -> String {
        if if_exists {
            format!("DROP TABLE IF EXISTS {};\n", self.qualified_name(dialect))
        } else {
            format!("DROP TABLE {};\n", self.qualified_name(dialect))
        }
    }
}

/// A caller-owned catalog that table descriptions are registered into.
pub trait Catalog {
    type Handle;

    /// Namespace applied to tables that are defined without one.
    fn default_schema(&self) -> Option<&str> {
        None
    }

    fn define_table(&mut self, table: TableDef) -> Result<Self::Handle>;
}

/// In-memory catalog of table descriptions, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct MetaData {
    schema: Option<String>,
    tables: BTreeMap<String, TableDef>,
}

impl MetaData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schema(schema: impl Into<String>) -> Self {
        MetaData {
            schema: Some(schema.into()),
            tables: BTreeMap::new(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableDef> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.tables.values()
    }

    pub fn remove(&mut self, name: &str) -> Option<TableDef> {
        self.tables.remove(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl Catalog for MetaData {
    type Handle = TableDef;

    fn default_schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    fn define_table(&mut self, table: TableDef) -> Result<TableDef> {
        if self.tables.contains_key(&table.name) {
            debug!(table = %table.name, "Replacing existing table definition");
        }
        self.tables.insert(table.name.clone(), table.clone());
        Ok(table)
    }
}
