//! rapidflow CLI: one incremental sync run from RapidPro and the content repo into BigQuery.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, warn};

use rapidflow::core::builder::rapidpro_from_config;
use rapidflow::core::logging;
use rapidflow::core::metrics;
use rapidflow::core::sources::check_contact_fields;
use rapidflow::{bigquery_from_config, load_config, FileDestination, PipelineBuilder};

#[derive(Debug, Parser)]
#[command(name = "rapidflow", about = "Sync RapidPro engagement data into BigQuery")]
struct CliArgs {
    /// Path to the YAML config file
    #[arg(short, long, default_value = "rapidflow.yaml")]
    config: PathBuf,

    /// Write NDJSON files to this directory instead of loading BigQuery
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();
    logging::init(&args.log_level);

    let config = match load_config(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config {}: {e}", args.config.display());
            return ExitCode::FAILURE;
        }
    };

    if !config.contact_fields.is_empty() {
        let client = match rapidpro_from_config(&config) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Invalid config: {e}");
                return ExitCode::FAILURE;
            }
        };
        let names: Vec<String> = config.contact_fields.iter().map(|f| f.name.clone()).collect();
        if let Err(e) = check_contact_fields(&client, &names).await {
            warn!(error = %e, "could not list RapidPro contact fields");
        }
    }

    let builder = match PipelineBuilder::from_config(&config) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Invalid config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let pipeline = match &args.output_dir {
        Some(dir) => {
            info!("Writing NDJSON to {}", dir.display());
            builder.destination(FileDestination(dir.clone())).build()
        }
        None => match bigquery_from_config(&config) {
            Ok(bq) => builder.destination(bq).build(),
            Err(e) => Err(e),
        },
    };
    let pipeline = match pipeline {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to set up sync: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = pipeline.run().await;

    if let Some(path) = &config.metrics_textfile {
        if let Err(e) = metrics::write_textfile(path) {
            warn!(error = %e, path = %path, "failed to write metrics textfile");
        }
    }

    match result {
        Ok(summary) => {
            for (table, rows) in &summary.loaded {
                info!(table = %table, rows, "loaded");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "sync failed");
            eprintln!("Sync failed: {e}");
            ExitCode::FAILURE
        }
    }
}
