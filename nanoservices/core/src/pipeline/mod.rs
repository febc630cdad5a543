//! The single-run sync: watermarks, extraction, then loading.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rapidflow_utils::{RowBatch, SyncResult};

use crate::destinations::traits::Destination;
use crate::metrics;
use crate::sources::traits::Source;
use crate::tables::Catalog;
use crate::watermark::{Watermark, Watermarks};

/// A row-level error reported by the warehouse for one table.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadError {
    pub table: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub extracted: BTreeMap<String, usize>,
    pub loaded: BTreeMap<String, usize>,
    pub errors: Vec<LoadError>,
    pub duration_ms: u64,
}

pub struct SyncPipeline {
    pub(crate) sources: Vec<Arc<dyn Source>>,
    pub(crate) destination: Arc<dyn Destination>,
    pub(crate) catalog: Catalog,
    pub(crate) watermark_offset: Duration,
}

impl SyncPipeline {
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Read the latest loaded timestamp of every incrementally synced table.
    pub async fn read_watermarks(&self) -> SyncResult<Watermarks> {
        let mut marks = Watermarks::new();
        for (table, column) in self.catalog.watermarked() {
            let loaded = self.destination.last_loaded(table, column).await?;
            match Watermark::from_loaded(loaded, self.watermark_offset)? {
                Some(mark) => {
                    tracing::info!(table, after = %mark, "incremental sync");
                    marks.insert(table, mark);
                }
                None => tracing::info!(table, "no watermark, full sync"),
            }
        }
        Ok(marks)
    }

    /// Run every source in order and collect its batches by table.
    pub async fn extract(&self, watermarks: &Watermarks) -> SyncResult<HashMap<String, RowBatch>> {
        let mut batches = HashMap::new();
        for source in &self.sources {
            tracing::info!(source = source.name(), "Fetching {}", source.name());
            for batch in source.extract(watermarks).await? {
                tracing::info!(table = %batch.table, rows = batch.rows.len(), "fetched");
                metrics::add_extracted(&batch.table, batch.rows.len());
                batches.insert(batch.table, batch.rows);
            }
        }
        Ok(batches)
    }

    /// Load batches in catalog order, collecting row-level errors.
    pub async fn load(
        &self,
        mut batches: HashMap<String, RowBatch>,
        summary: &mut RunSummary,
    ) -> SyncResult<()> {
        for spec in self.catalog.tables() {
            let Some(rows) = batches.remove(spec.name) else {
                continue;
            };
            tracing::info!(table = spec.name, rows = rows.len(), "Uploading {} {}", rows.len(), spec.name);
            if rows.is_empty() {
                tracing::debug!(table = spec.name, "nothing to upload");
                continue;
            }

            let report = self.destination.load(spec, rows).await?;
            metrics::add_loaded(&report.table, report.rows);
            metrics::add_load_errors(&report.table, report.errors.len());
            for message in report.errors {
                tracing::error!(table = %report.table, "ERROR: {}", message);
                summary.errors.push(LoadError { table: report.table.clone(), message });
            }
            summary.loaded.insert(report.table, report.rows);
        }

        for table in batches.keys() {
            tracing::warn!(table = %table, "extracted rows for a table with no schema, skipped");
        }
        Ok(())
    }

    pub async fn run(&self) -> SyncResult<RunSummary> {
        let started = Instant::now();
        let watermarks = self.read_watermarks().await?;

        tracing::info!(destination = self.destination.name(), "Start");
        let batches = self.extract(&watermarks).await?;

        let mut summary = RunSummary {
            extracted: batches.iter().map(|(t, b)| (t.clone(), b.len())).collect(),
            ..RunSummary::default()
        };
        self.load(batches, &mut summary).await?;

        summary.duration_ms = started.elapsed().as_millis() as u64;
        metrics::observe_duration(summary.duration_ms as f64);
        tracing::info!(
            duration_ms = summary.duration_ms,
            errors = summary.errors.len(),
            "Done"
        );
        Ok(summary)
    }
}
