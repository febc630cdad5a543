use async_trait::async_trait;
use chrono::NaiveDateTime;
use rapidflow_utils::{RowBatch, SyncResult};

use crate::tables::TableSpec;

/// Outcome of one table load. Row-level rejections do not fail the load.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub table: String,
    pub rows: usize,
    pub errors: Vec<String>,
}

impl LoadReport {
    pub fn ok(table: &str, rows: usize) -> Self {
        Self { table: table.to_string(), rows, errors: Vec::new() }
    }
}

/// A warehouse that holds the synced tables.
#[async_trait]
pub trait Destination: Send + Sync {
    fn name(&self) -> &str;

    /// Latest loaded value of `column` in `table`, `None` when empty.
    async fn last_loaded(&self, table: &str, column: &str) -> SyncResult<Option<NaiveDateTime>>;

    /// Load a batch, truncating or appending per the table's write mode
    async fn load(&self, table: &TableSpec, rows: RowBatch) -> SyncResult<LoadReport>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::Catalog;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDestination {
        count: AtomicUsize,
    }

    #[async_trait]
    impl Destination for CountingDestination {
        fn name(&self) -> &str { "counter" }
        async fn last_loaded(&self, _: &str, _: &str) -> SyncResult<Option<NaiveDateTime>> { Ok(None) }
        async fn load(&self, table: &TableSpec, rows: RowBatch) -> SyncResult<LoadReport> {
            self.count.fetch_add(rows.len(), Ordering::SeqCst);
            Ok(LoadReport::ok(table.name, rows.len()))
        }
    }

    #[tokio::test]
    async fn destination_trait_works() {
        let dest = CountingDestination { count: AtomicUsize::new(0) };
        assert_eq!(dest.name(), "counter");
        assert!(dest.last_loaded("groups", "uuid").await.unwrap().is_none());

        let catalog = Catalog::default();
        let spec = catalog.get("groups").unwrap();
        let row = serde_json::json!({"uuid": "g-1", "name": "All"}).as_object().cloned().unwrap();
        let report = dest.load(spec, RowBatch::new(vec![row.clone(), row])).await.unwrap();

        assert_eq!(report, LoadReport::ok("groups", 2));
        assert_eq!(dest.count.load(Ordering::SeqCst), 2);
    }
}
