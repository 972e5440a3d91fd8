//! Delimited-text output of converted records

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::types::FlatRecord;
use std::io::Write;

/// Writes the records of one finalized table as CSV.
///
/// The header is the schema's output column order. Each row holds the
/// converted values rendered by the schema's dialect; nulls become empty fields.
pub struct CsvRowWriter<'s, W: Write> {
    schema: &'s Schema,
    writer: csv::Writer<W>,
    rows: u64,
}

impl<'s, W: Write> CsvRowWriter<'s, W> {
    /// Create the writer and emit the header row.
    pub fn new(schema: &'s Schema, inner: W) -> Result<Self> {
        Self::with_delimiter(schema, inner, b',')
    }

    pub fn with_delimiter(schema: &'s Schema, inner: W, delimiter: u8) -> Result<Self> {
        let columns = schema.generate_output_columns()?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter)
            .from_writer(inner);
        writer.write_record(&columns)?;
        Ok(CsvRowWriter {
            schema,
            writer,
            rows: 0,
        })
    }

    pub fn write(&mut self, record: &FlatRecord) -> Result<()> {
        let dialect = self.schema.dialect();
        let fields: Vec<String> = self
            .schema
            .convert_row(record)?
            .iter()
            .map(|value| dialect.csv_field(value).unwrap_or_default())
            .collect();
        self.writer.write_record(&fields)?;
        self.rows += 1;
        Ok(())
    }

    /// Data rows written so far, excluding the header.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|err| Error::Io(err.into_error()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::DialectKind;
    use serde_json::{json, Value};

    fn finalized(kind: DialectKind, records: &[Value]) -> Schema {
        let mut schema = Schema::with_dialect(kind);
        for record in records {
            schema.read_object(record.as_object().unwrap()).unwrap();
        }
        schema.finalize().unwrap();
        schema
    }

    fn render(schema: &Schema, records: &[Value]) -> String {
        let mut writer = CsvRowWriter::new(schema, Vec::new()).unwrap();
        for record in records {
            writer.write(record.as_object().unwrap()).unwrap();
        }
        assert_eq!(writer.rows(), records.len() as u64);
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn test_header_nulls_and_coercion() {
        let records = [
            json!({"id": 1, "flag": true, "v": 1}),
            json!({"id": 2, "v": "x, y"}),
        ];
        let schema = finalized(DialectKind::Postgres, &records);

        assert_eq!(
            render(&schema, &records),
            "id,flag,v\n1,true,1\n2,,\"x, y\"\n"
        );
    }

    #[test]
    fn test_mssql_booleans_are_bits() {
        let records = [json!({"id": 1, "flag": false}), json!({"id": 2, "flag": true})];
        let schema = finalized(DialectKind::Mssql, &records);

        assert_eq!(render(&schema, &records), "id,flag\n1,0\n2,1\n");
    }

    #[test]
    fn test_requires_finalized_schema() {
        let mut schema = Schema::default();
        schema.read_object(json!({"a": 1}).as_object().unwrap()).unwrap();
        assert!(CsvRowWriter::new(&schema, Vec::new()).is_err());
    }
}
