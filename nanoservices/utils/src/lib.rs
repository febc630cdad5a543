pub mod error;

use error::Error;
use serde_json::{Map, Value};
use std::sync::Arc;

pub type SyncResult<T> = Result<T, Error>;

/// One flattened warehouse row.
pub type Row = Map<String, Value>;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowBatch(pub Arc<Vec<Row>>);

impl RowBatch {
    pub fn new(rows: Vec<Row>) -> Self {
        RowBatch(Arc::new(rows))
    }

    pub fn rows(&self) -> &Vec<Row> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Serialize as newline-delimited JSON, one object per line.
    pub fn to_ndjson(&self) -> SyncResult<Vec<u8>> {
        let mut buf = Vec::new();
        for row in self.0.iter() {
            serde_json::to_writer(&mut buf, row)?;
            buf.push(b'\n');
        }
        Ok(buf)
    }
}

impl From<Vec<Row>> for RowBatch {
    fn from(rows: Vec<Row>) -> Self {
        RowBatch::new(rows)
    }
}
