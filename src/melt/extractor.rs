use crate::error::{Error, Result};
use crate::melt::config::{MeltConfig, ScalarArrayPolicy};
use crate::melt::writer::{SinkFactory, TableWriter};
use crate::types::FlatRecord;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, info};

/// One step of a JSON path
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Element,
}

/// A flat record together with the table it belongs to
#[derive(Debug, Clone, PartialEq)]
pub struct FlatRow {
    pub table: String,
    pub record: FlatRecord,
}

/// Counts processed by one relationalize run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub records: u64,
    pub rows: u64,
}

/// Monotonic row identifiers, unique within one run
#[derive(Debug, Default)]
struct IdSequence {
    last: u64,
}

impl IdSequence {
    fn next(&mut self) -> u64 {
        self.last += 1;
        self.last
    }
}

enum Claim {
    Table(String),
    Column(String, String),
}

/// Remembers which JSON path produced every table and column name
#[derive(Debug, Default)]
struct PathRegistry {
    tables: HashMap<String, Vec<Segment>>,
    columns: HashMap<String, HashMap<String, Vec<Segment>>>,
}

impl PathRegistry {
    /// Claim `table` for `path`. A clash is reported against the column of
    /// `parent` that spawned the table.
    fn claim_table(
        &mut self,
        table: &str,
        path: &[Segment],
        parent: &str,
        column: &str,
        journal: &mut Vec<Claim>,
    ) -> Result<()> {
        match self.tables.get(table) {
            Some(existing) if existing.as_slice() == path => Ok(()),
            Some(_) => Err(Error::shape_conflict(parent, column)),
            None => {
                self.tables.insert(table.to_string(), path.to_vec());
                journal.push(Claim::Table(table.to_string()));
                Ok(())
            }
        }
    }

    fn claim_column(
        &mut self,
        table: &str,
        column: &str,
        path: &[Segment],
        journal: &mut Vec<Claim>,
    ) -> Result<()> {
        let columns = self.columns.entry(table.to_string()).or_default();
        match columns.get(column) {
            Some(existing) if existing.as_slice() == path => Ok(()),
            Some(_) => Err(Error::shape_conflict(table, column)),
            None => {
                columns.insert(column.to_string(), path.to_vec());
                journal.push(Claim::Column(table.to_string(), column.to_string()));
                Ok(())
            }
        }
    }

    fn rollback(&mut self, journal: Vec<Claim>) {
        for claim in journal.into_iter().rev() {
            match claim {
                Claim::Table(table) => {
                    self.tables.remove(&table);
                }
                Claim::Column(table, column) => {
                    if let Some(columns) = self.columns.get_mut(&table) {
                        columns.remove(&column);
                    }
                }
            }
        }
    }
}

/// An array found while building a row, expanded once the row is complete
struct PendingArray {
    table: String,
    path: Vec<Segment>,
    items: Vec<Value>,
    depth: usize,
}

/// A row under construction
struct RowBuilder<'t> {
    table: &'t str,
    record: FlatRecord,
    children: Vec<PendingArray>,
}

/// Depth-first walk over one input record
struct Walker<'a> {
    config: &'a MeltConfig,
    paths: &'a mut PathRegistry,
    ids: &'a mut IdSequence,
    journal: Vec<Claim>,
    rows: Vec<FlatRow>,
}

impl<'a> Walker<'a> {
    /// Emit one row of `table` for `value`, followed by the rows of its child tables.
    fn element(
        &mut self,
        value: Value,
        table: &str,
        table_path: &[Segment],
        parent: Option<(u64, usize)>,
        depth: usize,
    ) -> Result<()> {
        let id = self.ids.next();
        let mut row = RowBuilder {
            table,
            record: Map::new(),
            children: Vec::new(),
        };

        row.record
            .insert(self.config.id_column.clone(), Value::from(id));
        if let Some((parent_id, index)) = parent {
            row.record
                .insert(self.config.parent_id_column.clone(), Value::from(parent_id));
            row.record
                .insert(self.config.index_column.clone(), Value::from(index as u64));
        }

        match value {
            Value::Object(obj) => {
                for (key, value) in obj {
                    let segments = vec![Segment::Key(key.clone())];
                    self.field(&mut row, table_path, &segments, key, value, depth + 1)?;
                }
            }
            other => {
                let name = self.config.value_column.clone();
                self.field(&mut row, table_path, &[Segment::Element], name, other, depth + 1)?;
            }
        }

        let RowBuilder {
            record, children, ..
        } = row;
        self.rows.push(FlatRow {
            table: table.to_string(),
            record,
        });

        for child in children {
            for (index, item) in child.items.into_iter().enumerate() {
                self.element(item, &child.table, &child.path, Some((id, index)), child.depth)?;
            }
        }

        Ok(())
    }

    fn field(
        &mut self,
        row: &mut RowBuilder<'_>,
        table_path: &[Segment],
        segments: &[Segment],
        name: String,
        value: Value,
        depth: usize,
    ) -> Result<()> {
        let structural = matches!(value, Value::Object(_) | Value::Array(_));
        if structural
            && (depth > self.config.max_depth || self.config.scalar_fields.contains(&name))
        {
            let text = Value::String(value.to_string());
            return self.put(row, segments, name, text);
        }

        match value {
            Value::Object(obj) => {
                for (key, value) in obj {
                    let mut nested = segments.to_vec();
                    nested.push(Segment::Key(key.clone()));
                    let nested_name = format!("{}{}{}", name, self.config.separator, key);
                    self.field(row, table_path, &nested, nested_name, value, depth + 1)?;
                }
                Ok(())
            }
            Value::Array(items) => self.array(row, table_path, segments, name, items, depth),
            scalar => self.put(row, segments, name, scalar),
        }
    }

    fn put(
        &mut self,
        row: &mut RowBuilder<'_>,
        segments: &[Segment],
        name: String,
        value: Value,
    ) -> Result<()> {
        if row.record.contains_key(&name) {
            return Err(Error::shape_conflict(row.table, name));
        }
        self.paths
            .claim_column(row.table, &name, segments, &mut self.journal)?;
        row.record.insert(name, value);
        Ok(())
    }

    fn array(
        &mut self,
        row: &mut RowBuilder<'_>,
        table_path: &[Segment],
        segments: &[Segment],
        name: String,
        items: Vec<Value>,
        depth: usize,
    ) -> Result<()> {
        if let ScalarArrayPolicy::Join { delimiter } = &self.config.scalar_arrays {
            let all_scalar = items
                .iter()
                .all(|item| !matches!(item, Value::Object(_) | Value::Array(_)));
            if all_scalar {
                if items.is_empty() {
                    return Ok(());
                }
                let joined = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(delimiter);
                return self.put(row, segments, name, Value::String(joined));
            }
        }

        if row.record.contains_key(&name) {
            return Err(Error::shape_conflict(row.table, name));
        }
        self.paths
            .claim_column(row.table, &name, segments, &mut self.journal)?;

        let child_table = format!("{}{}{}", row.table, self.config.separator, name);
        let mut child_path = table_path.to_vec();
        child_path.extend_from_slice(segments);
        self.paths
            .claim_table(&child_table, &child_path, row.table, &name, &mut self.journal)?;

        row.children.push(PendingArray {
            table: child_table,
            path: child_path,
            items,
            depth: depth + 1,
        });
        Ok(())
    }
}

/// The flattening engine: turns nested JSON records into flat rows spread
/// over a root table and one child table per array path.
///
/// Row identifiers come from one counter per `Relationalizer`, starting at 1,
/// shared by every table. Every row carries the id column; child rows also
/// carry the parent id and the element index.
pub struct Relationalizer {
    object_name: String,
    config: MeltConfig,
    ids: IdSequence,
    paths: PathRegistry,
}

impl Relationalizer {
    pub fn new(object_name: impl Into<String>, config: MeltConfig) -> Self {
        Relationalizer {
            object_name: object_name.into(),
            config,
            ids: IdSequence::default(),
            paths: PathRegistry::default(),
        }
    }

    /// Name of the root table
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn config(&self) -> &MeltConfig {
        &self.config
    }

    /// Flatten one record. Parent rows precede their children.
    ///
    /// On a shape conflict nothing of this record is kept: the identifier
    /// sequence and the path registry are restored to their previous state.
    pub fn flatten(&mut self, record: Value) -> Result<Vec<FlatRow>> {
        let checkpoint = self.ids.last;
        let mut walker = Walker {
            config: &self.config,
            paths: &mut self.paths,
            ids: &mut self.ids,
            journal: Vec::new(),
            rows: Vec::new(),
        };

        let outcome = walker
            .paths
            .claim_table(&self.object_name, &[], &self.object_name, "", &mut walker.journal)
            .and_then(|_| walker.element(record, &self.object_name, &[], None, 0));

        match outcome {
            Ok(()) => Ok(walker.rows),
            Err(err) => {
                let journal = std::mem::take(&mut walker.journal);
                self.paths.rollback(journal);
                self.ids.last = checkpoint;
                Err(err)
            }
        }
    }

    /// Flatten every record into `writer`, one sink per table.
    pub fn relationalize<I, F>(&mut self, records: I, writer: &mut TableWriter<F>) -> Result<RunStats>
    where
        I: IntoIterator<Item = Value>,
        F: SinkFactory,
    {
        self.relationalize_observed(records, writer, |_, _| Ok(()))
    }

    /// Like [`relationalize`](Self::relationalize), calling `on_write` with
    /// every flat record after it reached its sink.
    pub fn relationalize_observed<I, F, O>(
        &mut self,
        records: I,
        writer: &mut TableWriter<F>,
        mut on_write: O,
    ) -> Result<RunStats>
    where
        I: IntoIterator<Item = Value>,
        F: SinkFactory,
        O: FnMut(&str, &FlatRecord) -> Result<()>,
    {
        let mut stats = RunStats::default();
        for record in records {
            let rows = self.flatten(record)?;
            stats.records += 1;
            for row in rows {
                writer.write(&row.table, &row.record)?;
                on_write(&row.table, &row.record)?;
                stats.rows += 1;
            }
        }
        writer.flush()?;

        info!(
            object = %self.object_name,
            records = stats.records,
            rows = stats.rows,
            tables = writer.tables().len(),
            "Relationalized records"
        );
        Ok(stats)
    }
}

impl std::fmt::Debug for Relationalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relationalizer")
            .field("object_name", &self.object_name)
            .field("config", &self.config)
            .field("last_id", &self.ids.last)
            .finish()
    }
}

/// Flatten records into memory, one [`ObjectStream`](crate::melt::ObjectStream) per table.
pub fn relationalize_to_memory<I>(
    object_name: &str,
    records: I,
    config: MeltConfig,
) -> Result<Vec<crate::melt::ObjectStream>>
where
    I: IntoIterator<Item = Value>,
{
    let mut relationalizer = Relationalizer::new(object_name, config);
    let mut writer = TableWriter::new(crate::melt::MemorySinks);
    relationalizer.relationalize(records, &mut writer)?;
    debug!(tables = writer.tables().len(), "Collected tables in memory");
    Ok(writer.into_sinks().into_iter().map(|(_, stream)| stream).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::melt::MemorySinks;
    use serde_json::json;

    fn rows_of<'r>(rows: &'r [FlatRow], table: &str) -> Vec<&'r FlatRecord> {
        rows.iter()
            .filter(|row| row.table == table)
            .map(|row| &row.record)
            .collect()
    }

    #[test]
    fn test_objects_widen_the_row() {
        let mut relationalizer = Relationalizer::new("root", MeltConfig::default());
        let rows = relationalizer
            .flatten(json!({
                "id": 1,
                "user": {"name": "Alice", "address": {"city": "Oslo", "zip": null}},
                "active": true
            }))
            .unwrap();

        assert_eq!(rows.len(), 1);
        let columns: Vec<&str> = rows[0].record.keys().map(String::as_str).collect();
        assert_eq!(
            columns,
            vec!["_rid_", "id", "user_name", "user_address_city", "user_address_zip", "active"]
        );
        assert_eq!(rows[0].record["user_address_zip"], json!(null));
    }

    #[test]
    fn test_array_of_objects_spawns_child_rows() {
        let mut relationalizer = Relationalizer::new("users", MeltConfig::default());
        let rows = relationalizer
            .flatten(json!({
                "name": "Alice",
                "posts": [{"title": "a"}, {"title": "b"}, {"title": "c"}]
            }))
            .unwrap();

        let root = rows_of(&rows, "users");
        assert_eq!(root.len(), 1);
        assert_eq!(root[0].len(), 2);

        let posts = rows_of(&rows, "users_posts");
        assert_eq!(posts.len(), 3);
        for (index, post) in posts.iter().enumerate() {
            assert_eq!(post["_parent_rid_"], root[0]["_rid_"]);
            assert_eq!(post["_index_"], json!(index));
        }
        assert_eq!(posts[2]["title"], json!("c"));
    }

    #[test]
    fn test_empty_array_emits_no_child_rows() {
        let streams = relationalize_to_memory(
            "root",
            vec![
                json!({"id": 1, "tags": [{"k": "x"}]}),
                json!({"id": 2, "tags": []}),
            ],
            MeltConfig::default(),
        )
        .unwrap();

        assert_eq!(streams.len(), 2);
        assert_eq!(streams[0].name, "root");
        assert_eq!(streams[0].len(), 2);
        assert_eq!(streams[1].name, "root_tags");
        assert_eq!(streams[1].len(), 1);
        assert_eq!(streams[1].records[0]["_parent_rid_"], json!(1));
        assert_eq!(streams[1].records[0]["k"], json!("x"));
    }

    #[test]
    fn test_ids_are_unique_and_parents_come_first() {
        let mut relationalizer = Relationalizer::new("root", MeltConfig::default());
        let first = relationalizer
            .flatten(json!({"a": [{"b": [1, 2]}]}))
            .unwrap();
        let second = relationalizer.flatten(json!({"a": []})).unwrap();

        let tables: Vec<&str> = first.iter().map(|row| row.table.as_str()).collect();
        assert_eq!(tables, vec!["root", "root_a", "root_a_b", "root_a_b"]);
        let ids: Vec<u64> = first
            .iter()
            .chain(second.iter())
            .map(|row| row.record["_rid_"].as_u64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(first[2].record["_val_"], json!(1));
        assert_eq!(first[3].record["_parent_rid_"], json!(2));
    }

    #[test]
    fn test_scalar_root_goes_to_value_column() {
        let mut relationalizer = Relationalizer::new("root", MeltConfig::default());
        let rows = relationalizer.flatten(json!("plain")).unwrap();
        assert_eq!(rows[0].record["_val_"], json!("plain"));
    }

    #[test]
    fn test_nested_arrays_use_value_column_tables() {
        let mut relationalizer = Relationalizer::new("root", MeltConfig::default());
        let rows = relationalizer
            .flatten(json!({"tags": [["x", "y"]]}))
            .unwrap();

        assert_eq!(rows_of(&rows, "root_tags").len(), 1);
        let inner = rows_of(&rows, "root_tags__val_");
        assert_eq!(inner.len(), 2);
        assert_eq!(inner[1]["_val_"], json!("y"));
    }

    #[test]
    fn test_colliding_names_in_one_record_fail() {
        let mut relationalizer = Relationalizer::new("root", MeltConfig::default());
        let err = relationalizer
            .flatten(json!({"a_b": 1, "a": {"b": 2}}))
            .unwrap_err();

        match err {
            Error::ShapeConflict { table, column } => {
                assert_eq!(table, "root");
                assert_eq!(column, "a_b");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_data_key_cannot_shadow_id_column() {
        let mut relationalizer = Relationalizer::new("root", MeltConfig::default());
        assert!(matches!(
            relationalizer.flatten(json!({"_rid_": 7})),
            Err(Error::ShapeConflict { .. })
        ));
    }

    #[test]
    fn test_colliding_names_across_records_fail() {
        let mut relationalizer = Relationalizer::new("root", MeltConfig::default());
        relationalizer.flatten(json!({"a_b": 1})).unwrap();
        assert!(relationalizer.flatten(json!({"a": {"b": 2}})).is_err());

        // Same path with a different shape is fine
        relationalizer.flatten(json!({"a_b": "text"})).unwrap();
    }

    #[test]
    fn test_colliding_child_tables_fail() {
        let mut relationalizer = Relationalizer::new("root", MeltConfig::default());
        relationalizer.flatten(json!({"a_b": [{"x": 1}]})).unwrap();
        assert!(relationalizer.flatten(json!({"a": {"b": [{"x": 1}]}})).is_err());
    }

    #[test]
    fn test_failed_record_is_rolled_back() {
        let mut relationalizer = Relationalizer::new("root", MeltConfig::default());
        relationalizer.flatten(json!({"x": 1})).unwrap();
        relationalizer
            .flatten(json!({"c": 1, "a_b": 1, "a": {"b": 2}}))
            .unwrap_err();

        // The failed record claimed neither ids nor `a_b`
        let rows = relationalizer.flatten(json!({"a": {"b": 2}})).unwrap();
        assert_eq!(rows[0].record["_rid_"], json!(2));
        assert_eq!(rows[0].record["a_b"], json!(2));
    }

    #[test]
    fn test_join_policy_collapses_scalar_arrays() {
        let config = MeltConfig::default().with_scalar_arrays(ScalarArrayPolicy::Join {
            delimiter: ",".to_string(),
        });
        let mut relationalizer = Relationalizer::new("root", config);
        let rows = relationalizer
            .flatten(json!({
                "tags": ["a", 1, null, true],
                "empty": [],
                "items": [{"k": 1}]
            }))
            .unwrap();

        let root = rows_of(&rows, "root");
        assert_eq!(root[0]["tags"], json!("a,1,,true"));
        assert!(!root[0].contains_key("empty"));
        assert_eq!(rows_of(&rows, "root_items").len(), 1);
    }

    #[test]
    fn test_max_depth_stores_json_text() {
        let config = MeltConfig::default().with_max_depth(1);
        let mut relationalizer = Relationalizer::new("root", config);
        let rows = relationalizer
            .flatten(json!({"a": {"b": {"c": 1}, "d": 2}, "e": [1]}))
            .unwrap();

        let root = &rows[0].record;
        assert_eq!(root["a_b"], json!("{\"c\":1}"));
        assert_eq!(root["a_d"], json!(2));
        assert_eq!(rows_of(&rows, "root_e").len(), 1);
    }

    #[test]
    fn test_scalar_fields_are_not_expanded() {
        let config = MeltConfig::default().with_scalar_fields(["meta"]);
        let mut relationalizer = Relationalizer::new("root", config);
        let rows = relationalizer
            .flatten(json!({"meta": {"k": [1, 2]}, "id": 3}))
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record["meta"], json!("{\"k\":[1,2]}"));
    }

    #[test]
    fn test_observer_sees_every_row() {
        let mut relationalizer = Relationalizer::new("root", MeltConfig::default());
        let mut writer = TableWriter::new(MemorySinks);
        let mut seen = Vec::new();
        let stats = relationalizer
            .relationalize_observed(
                vec![json!({"a": [1, 2]}), json!({"a": [3]})],
                &mut writer,
                |table, _| {
                    seen.push(table.to_string());
                    Ok(())
                },
            )
            .unwrap();

        assert_eq!(stats, RunStats { records: 2, rows: 5 });
        assert_eq!(seen, vec!["root", "root_a", "root_a", "root", "root_a"]);
    }
}
