use crate::metrics;

#[test]
fn counters_are_exposed_per_table() {
    metrics::add_extracted("metrics_test_table", 4);
    metrics::add_loaded("metrics_test_table", 3);
    metrics::add_load_errors("metrics_test_table", 1);
    metrics::observe_duration(1500.0);

    let body = metrics::gather_text();
    assert!(body.contains("rapidflow_rows_extracted_total"), "missing extracted counter: {body}");
    assert!(body.contains("rapidflow_load_errors_total"), "missing error counter: {body}");
    assert!(body.contains("metrics_test_table"), "missing table label: {body}");
    assert!(body.contains("rapidflow_sync_duration_ms_bucket"), "missing histogram: {body}");
}

#[test]
fn textfile_is_written_atomically() {
    metrics::add_extracted("textfile_table", 1);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rapidflow.prom");

    metrics::write_textfile(&path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("textfile_table"));
    assert!(!dir.path().join("rapidflow.prom.tmp").exists());
}
