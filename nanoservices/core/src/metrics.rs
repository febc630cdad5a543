use std::path::Path;

use once_cell::sync::Lazy;
use prometheus::{CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder};

// Global registry and metrics are initialized lazily.
static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("rapidflow".to_string()), None).unwrap_or_default()
});

fn table_counter(name: &str, help: &str) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), &["table"])
        .unwrap_or_else(|e| panic!("invalid metric {name}: {e}"));
    REGISTRY.register(Box::new(c.clone())).ok();
    c
}

static ROWS_EXTRACTED: Lazy<CounterVec> =
    Lazy::new(|| table_counter("rows_extracted_total", "Rows extracted per table"));

static ROWS_LOADED: Lazy<CounterVec> =
    Lazy::new(|| table_counter("rows_loaded_total", "Rows accepted by the warehouse per table"));

static LOAD_ERRORS: Lazy<CounterVec> =
    Lazy::new(|| table_counter("load_errors_total", "Row-level load errors per table"));

static SYNC_DURATION_MS: Lazy<Histogram> = Lazy::new(|| {
    let opts = HistogramOpts::new("sync_duration_ms", "Sync run duration in milliseconds")
        .buckets(prometheus::exponential_buckets(1000.0, 2.0, 12).unwrap_or_default());
    let hist = Histogram::with_opts(opts).unwrap_or_else(|e| panic!("invalid histogram: {e}"));
    REGISTRY.register(Box::new(hist.clone())).ok();
    hist
});

pub fn add_extracted(table: &str, rows: usize) {
    ROWS_EXTRACTED.with_label_values(&[table]).inc_by(rows as f64);
}

pub fn add_loaded(table: &str, rows: usize) {
    ROWS_LOADED.with_label_values(&[table]).inc_by(rows as f64);
}

pub fn add_load_errors(table: &str, errors: usize) {
    LOAD_ERRORS.with_label_values(&[table]).inc_by(errors as f64);
}

pub fn observe_duration(duration_ms: f64) {
    SYNC_DURATION_MS.observe(duration_ms);
}

/// Gather metrics as text in Prometheus exposition format.
pub fn gather_text() -> String {
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Write the exposition text for a node-exporter textfile collector.
///
/// The file is written next to its final path and renamed into place so the
/// collector never reads a partial file.
pub fn write_textfile(path: impl AsRef<Path>) -> std::io::Result<()> {
    let path = path.as_ref();
    let tmp = path.with_extension("prom.tmp");
    std::fs::write(&tmp, gather_text())?;
    std::fs::rename(&tmp, path)
}
