//! Input adapters: whole JSON documents, NDJSON, and replay of persisted flat streams

use crate::error::{Error, Result};
use crate::types::{self, FlatRecord};
use serde_json::Value;
use std::io::{BufRead, Read};

/// Read every record from `reader`.
///
/// Input starting with `[` is one JSON array whose elements are the records.
/// Anything else is a sequence of whitespace-separated JSON documents, which
/// covers a single (possibly pretty-printed) object as well as NDJSON.
pub fn read_records<R: Read>(mut reader: R) -> Result<Vec<Value>> {
    let mut content = Vec::new();
    reader.read_to_end(&mut content)?;

    let first = content.iter().find(|b| !b.is_ascii_whitespace());
    if first == Some(&b'[') {
        return match simd_json::serde::from_slice::<Value>(&mut content)? {
            Value::Array(items) => Ok(items),
            value => Ok(vec![value]),
        };
    }

    serde_json::Deserializer::from_slice(&content)
        .into_iter::<Value>()
        .map(|value| value.map_err(Error::from))
        .collect()
}

/// Lazily parse one JSON value per non-blank line.
pub fn ndjson_records<R: BufRead>(reader: R) -> impl Iterator<Item = Result<Value>> {
    reader.lines().filter_map(|line| match line {
        Ok(line) if line.trim().is_empty() => None,
        Ok(line) => Some(serde_json::from_str(&line).map_err(Error::from)),
        Err(err) => Some(Err(Error::from(err))),
    })
}

/// Replay a persisted flat stream, one flat record per line.
pub fn read_flat_records<R: BufRead>(reader: R) -> impl Iterator<Item = Result<FlatRecord>> {
    ndjson_records(reader).map(|value| match value? {
        Value::Object(record) => Ok(record),
        other => Err(Error::InvalidScalar {
            column: String::new(),
            found: types::json_kind(&other),
        }),
    })
}
