pub use rapidflow_core as core;
pub use rapidflow_utils as utils;

// Convenience re-exports for common usage
pub use rapidflow_core::builder::{bigquery_from_config, rapidpro_from_config, PipelineBuilder};
pub use rapidflow_core::config::{load_config, SyncConfig};
pub use rapidflow_core::destinations::{BigQueryDestination, Destination, FileDestination};
pub use rapidflow_core::pipeline::{RunSummary, SyncPipeline};
pub use rapidflow_core::sources::Source;
pub use rapidflow_utils::{Row, RowBatch, SyncResult};
