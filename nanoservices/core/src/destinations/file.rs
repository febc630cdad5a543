use std::path::PathBuf;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use rapidflow_utils::{RowBatch, SyncResult};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::tables::{TableSpec, WriteMode};
use super::traits::{Destination, LoadReport};

/// Writes `<dir>/<table>.ndjson`. Holds no watermarks, so every run is a full extract.
#[derive(Debug)]
pub struct FileDestination(pub PathBuf);

impl FileDestination {
    pub fn path_for(&self, table: &str) -> PathBuf {
        self.0.join(format!("{table}.ndjson"))
    }
}

#[async_trait]
impl Destination for FileDestination {
    fn name(&self) -> &str { "file" }

    async fn last_loaded(&self, _: &str, _: &str) -> SyncResult<Option<NaiveDateTime>> {
        Ok(None)
    }

    async fn load(&self, table: &TableSpec, rows: RowBatch) -> SyncResult<LoadReport> {
        fs::create_dir_all(&self.0).await?;
        let mut options = OpenOptions::new();
        options.create(true);
        match table.mode {
            WriteMode::Truncate => options.write(true).truncate(true),
            WriteMode::Append => options.append(true),
        };
        let mut file = options.open(self.path_for(table.name)).await?;
        file.write_all(&rows.to_ndjson()?).await?;
        file.flush().await?;
        file.shutdown().await?;
        Ok(LoadReport::ok(table.name, rows.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::Catalog;
    use serde_json::json;

    fn batch(ids: &[&str]) -> RowBatch {
        RowBatch::new(
            ids.iter()
                .map(|id| json!({ "uuid": id }).as_object().cloned().unwrap())
                .collect(),
        )
    }

    #[tokio::test]
    async fn truncate_overwrites_and_append_appends() {
        let dir = tempfile::tempdir().unwrap();
        let dest = FileDestination(dir.path().join("out"));
        let catalog = Catalog::default();

        let groups = catalog.get("groups").unwrap();
        dest.load(groups, batch(&["a", "b"])).await.unwrap();
        dest.load(groups, batch(&["c"])).await.unwrap();
        let text = std::fs::read_to_string(dest.path_for("groups")).unwrap();
        assert_eq!(text.lines().count(), 1);

        let members = catalog.get("group_contacts").unwrap();
        dest.load(members, batch(&["a", "b"])).await.unwrap();
        let report = dest.load(members, batch(&["c"])).await.unwrap();
        assert_eq!(report.rows, 1);
        let text = std::fs::read_to_string(dest.path_for("group_contacts")).unwrap();
        assert_eq!(text.lines().count(), 3);

        assert!(dest.last_loaded("group_contacts", "uuid").await.unwrap().is_none());
    }
}
