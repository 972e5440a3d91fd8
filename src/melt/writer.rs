use crate::types::FlatRecord;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Append-only destination for the flat records of one table
pub trait RecordSink {
    fn write_record(&mut self, record: &FlatRecord) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens one sink per table name
pub trait SinkFactory {
    type Sink: RecordSink;

    fn open(&mut self, table: &str) -> io::Result<Self::Sink>;
}

/// Routes flat records to one lazily opened sink per table
pub struct TableWriter<F: SinkFactory> {
    factory: F,
    sinks: HashMap<String, F::Sink>,
    order: Vec<String>,
}

impl<F: SinkFactory> TableWriter<F> {
    pub fn new(factory: F) -> Self {
        TableWriter {
            factory,
            sinks: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Write a record to its table's sink, opening the sink on first use
    pub fn write(&mut self, table: &str, record: &FlatRecord) -> io::Result<()> {
        if !self.sinks.contains_key(table) {
            debug!(table, "Opening sink");
            let sink = self.factory.open(table)?;
            self.sinks.insert(table.to_string(), sink);
            self.order.push(table.to_string());
        }

        match self.sinks.get_mut(table) {
            Some(sink) => sink.write_record(record),
            None => Ok(()),
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        for sink in self.sinks.values_mut() {
            sink.flush()?;
        }
        Ok(())
    }

    /// Table names in the order their sinks were opened
    pub fn tables(&self) -> &[String] {
        &self.order
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Sinks in the order they were opened
    pub fn into_sinks(mut self) -> Vec<(String, F::Sink)> {
        self.order
            .into_iter()
            .filter_map(|table| self.sinks.remove(&table).map(|sink| (table, sink)))
            .collect()
    }
}

/// Writes one JSON object per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn write_record(&mut self, record: &FlatRecord) -> io::Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Writes each table to `<dir>/<table>.jsonl`
#[derive(Debug, Clone)]
pub struct JsonLinesDir {
    dir: PathBuf,
}

impl JsonLinesDir {
    pub fn new<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(JsonLinesDir {
            dir: dir.as_ref().to_path_buf(),
        })
    }

    pub fn path_for(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", table))
    }
}

impl SinkFactory for JsonLinesDir {
    type Sink = JsonLinesSink<BufWriter<File>>;

    fn open(&mut self, table: &str) -> io::Result<Self::Sink> {
        // Table names come from JSON keys
        if table.is_empty() || table.contains(['/', '\\']) || table == ".." {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("table name `{}` is not a valid file name", table),
            ));
        }
        let file = File::create(self.path_for(table))?;
        Ok(JsonLinesSink::new(BufWriter::new(file)))
    }
}

/// One table's flat records held in memory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectStream {
    pub name: String,
    pub records: Vec<FlatRecord>,
}

impl ObjectStream {
    pub fn new(name: impl Into<String>) -> Self {
        ObjectStream {
            name: name.into(),
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSink for ObjectStream {
    fn write_record(&mut self, record: &FlatRecord) -> io::Result<()> {
        self.records.push(record.clone());
        Ok(())
    }
}

/// Collects every table into an [`ObjectStream`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MemorySinks;

impl SinkFactory for MemorySinks {
    type Sink = ObjectStream;

    fn open(&mut self, table: &str) -> io::Result<ObjectStream> {
        Ok(ObjectStream::new(table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn record(value: Value) -> FlatRecord {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_memory_sinks_keep_open_order() {
        let mut writer = TableWriter::new(MemorySinks);
        writer.write("users", &record(json!({"_rid_": 1}))).unwrap();
        writer.write("users_posts", &record(json!({"_rid_": 2}))).unwrap();
        writer.write("users", &record(json!({"_rid_": 3}))).unwrap();

        assert_eq!(writer.tables(), &["users".to_string(), "users_posts".to_string()]);
        let sinks = writer.into_sinks();
        assert_eq!(sinks[0].1.len(), 2);
        assert_eq!(sinks[1].1.records[0]["_rid_"], json!(2));
    }

    #[test]
    fn test_json_lines_sink() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.write_record(&record(json!({"b": 1, "a": "x"}))).unwrap();
        sink.write_record(&record(json!({"b": null}))).unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(output, "{\"b\":1,\"a\":\"x\"}\n{\"b\":null}\n");
    }

    #[test]
    fn test_json_lines_dir_writes_one_file_per_table() {
        let dir = tempfile::tempdir().unwrap();
        let factory = JsonLinesDir::new(dir.path().join("flat")).unwrap();
        let mut writer = TableWriter::new(factory);
        writer.write("users", &record(json!({"_rid_": 1}))).unwrap();
        writer.write("users_tags", &record(json!({"_rid_": 2}))).unwrap();
        writer.flush().unwrap();

        let path = writer.factory().path_for("users_tags");
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "{\"_rid_\":2}\n");
    }

    #[test]
    fn test_json_lines_dir_rejects_path_like_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut factory = JsonLinesDir::new(dir.path()).unwrap();
        let err = factory.open("../escape").err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }
}
