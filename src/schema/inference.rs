//! Incremental schema inference over a stream of flat records
//!
//! A [`Schema`] is built in two phases. While reading, every record widens the
//! per-column [`ColumnProfile`]s. Finalization then removes structurally
//! duplicate columns and collapses multi-choice columns onto one type; only
//! after both steps can the schema convert records or render tables.

use super::profile::{ColumnProfile, EMPTY_FINGERPRINT};
use super::table::{Catalog, ColumnDef, TableDef};
use crate::dialect::{dialect_by_name, Dialect, DialectKind};
use crate::error::{Error, Result};
use crate::melt::MeltConfig;
use crate::types::{self, FlatRecord, TypeTag};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lifecycle phase of a [`Schema`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaState {
    Created,
    Reading,
    Finalizing,
    Finalized,
}

impl fmt::Display for SchemaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaState::Created => "created",
            SchemaState::Reading => "reading",
            SchemaState::Finalizing => "finalizing",
            SchemaState::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

/// Serialized form of a schema
#[derive(Serialize, Deserialize)]
struct SchemaSnapshot {
    dialect: String,
    rows: u64,
    #[serde(default)]
    duplicates_dropped: bool,
    #[serde(default)]
    choices_merged: bool,
    #[serde(default = "default_linkage")]
    linkage: Vec<String>,
    columns: Vec<ColumnProfile>,
}

fn default_linkage() -> Vec<String> {
    MeltConfig::default().linkage_columns()
}

/// Inferred schema of one flat table.
#[derive(Debug, Clone)]
pub struct Schema {
    dialect: Arc<dyn Dialect>,
    columns: Vec<ColumnProfile>,
    index: HashMap<String, usize>,
    rows: u64,
    duplicates_dropped: bool,
    choices_merged: bool,
    /// Synthetic linkage columns, never dropped as duplicates
    linkage: Vec<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self::with_dialect(DialectKind::default())
    }
}

impl Schema {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        Schema {
            dialect,
            columns: Vec::new(),
            index: HashMap::new(),
            rows: 0,
            duplicates_dropped: false,
            choices_merged: false,
            linkage: default_linkage(),
        }
    }

    pub fn with_dialect(kind: DialectKind) -> Self {
        Self::new(kind.dialect())
    }

    /// Replace the synthetic linkage column names (by default those of
    /// [`MeltConfig::default`]).
    pub fn with_linkage_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.linkage = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn linkage_columns(&self) -> &[String] {
        &self.linkage
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    pub fn state(&self) -> SchemaState {
        match (self.duplicates_dropped, self.choices_merged) {
            (true, true) => SchemaState::Finalized,
            (true, false) | (false, true) => SchemaState::Finalizing,
            (false, false) if self.rows > 0 => SchemaState::Reading,
            (false, false) => SchemaState::Created,
        }
    }

    /// Number of records read.
    pub fn row_count(&self) -> u64 {
        self.rows
    }

    /// Column profiles in discovery order.
    pub fn columns(&self) -> &[ColumnProfile] {
        &self.columns
    }

    pub fn profile(&self, column: &str) -> Option<&ColumnProfile> {
        self.index.get(column).map(|&i| &self.columns[i])
    }

    fn ensure_reading(&self, operation: &'static str) -> Result<()> {
        match self.state() {
            SchemaState::Created | SchemaState::Reading => Ok(()),
            state => Err(Error::state(operation, state)),
        }
    }

    fn ensure_finalized(&self, operation: &'static str) -> Result<()> {
        match self.state() {
            SchemaState::Finalized => Ok(()),
            state => Err(Error::state(operation, state)),
        }
    }

    fn rebuild_index(&mut self) {
        self.index = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, profile)| (profile.name().to_string(), i))
            .collect();
    }

    /// Fold one flat record into the column profiles.
    pub fn read_object(&mut self, record: &FlatRecord) -> Result<()> {
        self.ensure_reading("read_object")?;

        // Validate first so a bad record leaves the profiles untouched
        let mut tags = Vec::with_capacity(record.len());
        for (column, value) in record {
            let tag = types::classify(value).ok_or_else(|| Error::InvalidScalar {
                column: column.clone(),
                found: types::json_kind(value),
            })?;
            tags.push(tag);
        }

        let row = self.rows;
        for profile in &mut self.columns {
            if !record.contains_key(profile.name()) {
                profile.observe_absent(1);
            }
        }

        for ((column, value), tag) in record.iter().zip(tags) {
            let idx = match self.index.get(column) {
                Some(&idx) => idx,
                None => {
                    debug!(column = %column, row, "Discovered column");
                    self.columns.push(ColumnProfile::new(column.clone(), row));
                    self.index.insert(column.clone(), self.columns.len() - 1);
                    self.columns.len() - 1
                }
            };
            self.columns[idx].observe(row, tag, value);
        }

        self.rows += 1;
        Ok(())
    }

    /// Remove columns whose values match an earlier column in every row read.
    ///
    /// The first-discovered column of each duplicate group is kept. Linkage
    /// columns are always kept and take no part in grouping. Returns the names
    /// of the removed columns.
    pub fn drop_duplicate_columns(&mut self) -> Result<Vec<String>> {
        let linkage = &self.linkage;
        let mut seen = HashSet::new();
        let mut dropped = Vec::new();
        self.columns.retain(|profile| {
            if linkage.iter().any(|name| name == profile.name()) {
                true
            } else if seen.insert(*profile.fingerprint()) {
                true
            } else {
                dropped.push(profile.name().to_string());
                false
            }
        });

        if !dropped.is_empty() {
            self.rebuild_index();
            info!(columns = ?dropped, "Dropped duplicate columns");
        }
        self.duplicates_dropped = true;
        Ok(dropped)
    }

    /// Resolve every multi-choice column to a single type. Returns the names of
    /// the columns that now need value coercion.
    pub fn merge_multi_choice_columns(&mut self) -> Result<Vec<String>> {
        let mut merged = Vec::new();
        for profile in &mut self.columns {
            let observed = profile.types();
            if profile.resolve() {
                warn!(
                    column = profile.name(),
                    observed = %observed,
                    resolved = %profile.data_type(),
                    "Merged multi-choice column"
                );
                merged.push(profile.name().to_string());
            }
        }

        if !merged.is_empty() {
            info!(count = merged.len(), "Merged multi-choice columns");
        }
        self.choices_merged = true;
        Ok(merged)
    }

    /// Run both finalization steps.
    pub fn finalize(&mut self) -> Result<()> {
        self.drop_duplicate_columns()?;
        self.merge_multi_choice_columns()?;
        Ok(())
    }

    /// Output column order: discovery order minus dropped duplicates.
    pub fn generate_output_columns(&self) -> Result<Vec<String>> {
        self.ensure_finalized("generate_output_columns")?;
        Ok(self
            .columns
            .iter()
            .map(|profile| profile.name().to_string())
            .collect())
    }

    /// Project a flat record onto the output columns, filling absent columns
    /// with null and coercing values of resolved multi-choice columns.
    pub fn convert_object(&self, record: &FlatRecord) -> Result<FlatRecord> {
        self.ensure_finalized("convert_object")?;

        let mut converted = FlatRecord::with_capacity(self.columns.len());
        for profile in &self.columns {
            let value = self.converted_value(profile, record)?;
            converted.insert(profile.name().to_string(), value);
        }
        Ok(converted)
    }

    /// Like [`convert_object`](Self::convert_object) but positional.
    pub fn convert_row(&self, record: &FlatRecord) -> Result<Vec<Value>> {
        self.ensure_finalized("convert_row")?;
        self.columns
            .iter()
            .map(|profile| self.converted_value(profile, record))
            .collect()
    }

    fn converted_value(&self, profile: &ColumnProfile, record: &FlatRecord) -> Result<Value> {
        let value = record.get(profile.name()).cloned().unwrap_or(Value::Null);
        if types::classify(&value).is_none() {
            return Err(Error::InvalidScalar {
                column: profile.name().to_string(),
                found: types::json_kind(&value),
            });
        }
        Ok(profile.coerce(value))
    }

    /// Describe this schema as a table named `table` in database schema `schema`.
    pub fn table_def(&self, table: &str, schema: Option<&str>) -> Result<TableDef> {
        self.describe("table_def", table, schema)
    }

    fn describe(
        &self,
        operation: &'static str,
        table: &str,
        schema: Option<&str>,
    ) -> Result<TableDef> {
        self.ensure_finalized(operation)?;

        let limit = self.dialect.max_identifier_length();
        if table.chars().count() > limit {
            warn!(table, limit, dialect = self.dialect.name(), "Table name exceeds identifier limit");
        }

        let mut columns = Vec::with_capacity(self.columns.len());
        for profile in &self.columns {
            if profile.name().chars().count() > limit {
                warn!(
                    table,
                    column = profile.name(),
                    limit,
                    dialect = self.dialect.name(),
                    "Column name exceeds identifier limit"
                );
            }

            let data_type = profile.data_type();
            let native_type = self.dialect.native_type(data_type).ok_or(Error::DialectGap {
                dialect: self.dialect.name(),
                tag: data_type,
            })?;
            columns.push(ColumnDef {
                name: profile.name().to_string(),
                data_type,
                native_type,
                nullable: profile.nullable(),
            });
        }

        Ok(TableDef {
            schema: schema.map(str::to_string),
            name: table.to_string(),
            columns,
        })
    }

    /// Render a `CREATE TABLE` statement. An empty `schema` leaves the table
    /// name unqualified.
    pub fn generate_ddl(&self, table: &str, schema: &str) -> Result<String> {
        let schema = (!schema.is_empty()).then_some(schema);
        let def = self.describe("generate_ddl", table, schema)?;
        Ok(def.create_statement(self.dialect.as_ref()))
    }

    /// Register this schema as table `object_name` in a caller-owned catalog.
    pub fn create_table<C: Catalog>(&self, object_name: &str, catalog: &mut C) -> Result<C::Handle> {
        let schema = catalog.default_schema().map(str::to_string);
        let def = self.describe("create_table", object_name, schema.as_deref())?;
        catalog.define_table(def)
    }

    pub fn serialize(&self) -> Result<String> {
        let snapshot = SchemaSnapshot {
            dialect: self.dialect.name().to_string(),
            rows: self.rows,
            duplicates_dropped: self.duplicates_dropped,
            choices_merged: self.choices_merged,
            linkage: self.linkage.clone(),
            columns: self.columns.clone(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }

    pub fn deserialize(text: &str) -> Result<Schema> {
        let snapshot: SchemaSnapshot = serde_json::from_str(text)?;
        let mut schema = Schema::new(dialect_by_name(&snapshot.dialect)?);
        schema.rows = snapshot.rows;
        schema.duplicates_dropped = snapshot.duplicates_dropped;
        schema.choices_merged = snapshot.choices_merged;
        schema.linkage = snapshot.linkage;
        schema.columns = snapshot.columns;
        schema.rebuild_index();
        Ok(schema)
    }

    /// Combine schemas read from separate shards of the same table.
    ///
    /// Profiles are unioned; a column missing from a shard counts as null for
    /// each of that shard's rows. Duplicate-column fingerprints are chained in
    /// argument order. Every input must still be in its read phase; the result
    /// uses the first input's dialect.
    pub fn merge<I: IntoIterator<Item = Schema>>(schemas: I) -> Result<Schema> {
        let mut shards = schemas.into_iter().peekable();
        let mut merged = match shards.peek() {
            Some(first) => {
                Schema::new(first.dialect.clone()).with_linkage_columns(first.linkage.clone())
            }
            None => return Ok(Schema::default()),
        };

        for (shards_before, shard) in shards.enumerate() {
            shard.ensure_reading("merge")?;
            merged.absorb(&shard, shards_before);
        }
        debug!(columns = merged.columns.len(), rows = merged.rows, "Merged schema shards");
        Ok(merged)
    }

    fn absorb(&mut self, shard: &Schema, shards_before: usize) {
        for profile in &mut self.columns {
            match shard.profile(profile.name()) {
                Some(other) => {
                    profile.absorb_counts(other);
                    profile.chain_fingerprint(other.fingerprint());
                }
                None => {
                    profile.observe_absent(shard.rows);
                    profile.chain_fingerprint(&EMPTY_FINGERPRINT);
                }
            }
        }

        for other in &shard.columns {
            if self.index.contains_key(other.name()) {
                continue;
            }
            let mut profile = ColumnProfile::new(other.name(), self.rows);
            for _ in 0..shards_before {
                profile.chain_fingerprint(&EMPTY_FINGERPRINT);
            }
            profile.absorb_counts(other);
            profile.chain_fingerprint(other.fingerprint());
            self.index.insert(other.name().to_string(), self.columns.len());
            self.columns.push(profile);
        }

        self.rows += shard.rows;
    }
}

/// One schema per table name, created on the first record written to a table.
#[derive(Debug, Clone)]
pub struct SchemaSet {
    dialect: Arc<dyn Dialect>,
    linkage: Vec<String>,
    schemas: BTreeMap<String, Schema>,
}

impl Default for SchemaSet {
    fn default() -> Self {
        Self::new(DialectKind::default().dialect())
    }
}

impl SchemaSet {
    pub fn new(dialect: Arc<dyn Dialect>) -> Self {
        SchemaSet {
            dialect,
            linkage: default_linkage(),
            schemas: BTreeMap::new(),
        }
    }

    /// Linkage column names given to every schema this set creates.
    pub fn with_linkage_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.linkage = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Read one record of `table`.
    pub fn observe(&mut self, table: &str, record: &FlatRecord) -> Result<()> {
        if let Some(schema) = self.schemas.get_mut(table) {
            return schema.read_object(record);
        }
        debug!(table, "Creating schema");
        let mut schema =
            Schema::new(self.dialect.clone()).with_linkage_columns(self.linkage.clone());
        schema.read_object(record)?;
        self.schemas.insert(table.to_string(), schema);
        Ok(())
    }

    pub fn finalize_all(&mut self) -> Result<()> {
        for schema in self.schemas.values_mut() {
            schema.finalize()?;
        }
        Ok(())
    }

    pub fn get(&self, table: &str) -> Option<&Schema> {
        self.schemas.get(table)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Schema)> {
        self.schemas.iter().map(|(name, schema)| (name.as_str(), schema))
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, Schema> {
        self.schemas
    }
}
