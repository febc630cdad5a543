use async_trait::async_trait;
use rapidflow_utils::{RowBatch, SyncResult};

use crate::watermark::Watermarks;

/// Rows extracted for one warehouse table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBatch {
    pub table: String,
    pub rows: RowBatch,
}

impl TableBatch {
    pub fn new(table: impl Into<String>, rows: impl Into<RowBatch>) -> Self {
        Self { table: table.into(), rows: rows.into() }
    }
}

/// An extractor for one source entity.
#[async_trait]
pub trait Source: Send + Sync {
    /// Human-readable name for logging
    fn name(&self) -> &str;

    /// Tables this source produces rows for
    fn produces(&self) -> Vec<&str>;

    /// Extract rows newer than the relevant watermark
    async fn extract(&self, watermarks: &Watermarks) -> SyncResult<Vec<TableBatch>>;
}
