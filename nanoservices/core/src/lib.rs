//! rapidflow_core: incremental RapidPro and content-repo sync into BigQuery
//!
//! A run reads per-table watermarks from the warehouse, extracts newer records
//! from the remote APIs, flattens them into rows and loads them: reference
//! tables are truncated, fact tables appended.
//!
//! Basic usage:
//!
//! ```no_run
//! use rapidflow_core::builder::{bigquery_from_config, PipelineBuilder};
//! use rapidflow_core::config::load_config;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("rapidflow.yaml")?;
//! let pipeline = PipelineBuilder::from_config(&config)?
//!     .destination(bigquery_from_config(&config)?)
//!     .build()?;
//! let summary = pipeline.run().await?;
//! println!("{} load errors", summary.errors.len());
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod destinations;
pub mod pipeline;
pub mod sources;
pub mod tables;
pub mod transforms;
pub mod watermark;

pub mod logging;

pub mod metrics;

#[cfg(test)]
mod tests;
