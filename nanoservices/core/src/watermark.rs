//! Incremental watermarks derived from what the warehouse already holds.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::NaiveDateTime;
use rapidflow_utils::error::Error;
use rapidflow_utils::SyncResult;

/// Timestamp format the remote APIs accept for `after` style filters.
const WATERMARK_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// Query returning the latest loaded value of `column` as a DATETIME.
pub fn watermark_query(project: &str, dataset: &str, table: &str, column: &str) -> String {
    format!("SELECT EXTRACT(DATETIME FROM MAX(`{column}`)) FROM `{project}.{dataset}.{table}`")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(NaiveDateTime);

impl Watermark {
    pub fn new(at: NaiveDateTime) -> Self {
        Watermark(at)
    }

    /// Shift the loaded maximum by `offset`. `None` means nothing loaded yet.
    ///
    /// An offset that cannot be applied is an error: falling back to a full
    /// extract would duplicate rows in append tables.
    pub fn from_loaded(max: Option<NaiveDateTime>, offset: Duration) -> SyncResult<Option<Self>> {
        let Some(max) = max else {
            return Ok(None);
        };
        chrono::Duration::from_std(offset)
            .ok()
            .and_then(|o| max.checked_add_signed(o))
            .map(|at| Some(Watermark(at)))
            .ok_or_else(|| {
                Error::WatermarkError(format!("offset of {}s overflows {max}", offset.as_secs()))
            })
    }

    pub fn at(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(WATERMARK_FORMAT))
    }
}

/// Parse a DATETIME cell as returned by the warehouse REST API.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    value.parse::<NaiveDateTime>().ok()
}

/// Per-table watermarks for one run.
#[derive(Debug, Clone, Default)]
pub struct Watermarks(HashMap<String, Watermark>);

impl Watermarks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: impl Into<String>, mark: Watermark) {
        self.0.insert(table.into(), mark);
    }

    pub fn get(&self, table: &str) -> Option<&Watermark> {
        self.0.get(table)
    }

    /// Rendered filter value for `table`, if it has a watermark.
    pub fn after(&self, table: &str) -> Option<String> {
        self.get(table).map(|w| w.to_string())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(h: u32, m: u32, s: u32, micro: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_micro_opt(h, m, s, micro)
            .unwrap()
    }

    #[test]
    fn query_targets_dataset_table() {
        assert_eq!(
            watermark_query("one2one", "rapidpro", "flow_runs", "created_at"),
            "SELECT EXTRACT(DATETIME FROM MAX(`created_at`)) FROM `one2one.rapidpro.flow_runs`"
        );
    }

    #[test]
    fn offset_is_added_and_rendered_with_micros() {
        let mark = Watermark::from_loaded(Some(dt(9, 15, 0, 42)), Duration::from_secs(7200)).unwrap().unwrap();
        assert_eq!(mark.at(), dt(11, 15, 0, 42));
        assert_eq!(mark.to_string(), "2024-03-09T11:15:00.000042Z");
    }

    #[test]
    fn offset_crosses_midnight() {
        let mark = Watermark::from_loaded(Some(dt(23, 30, 0, 0)), Duration::from_secs(7200)).unwrap().unwrap();
        assert_eq!(mark.to_string(), "2024-03-10T01:30:00.000000Z");
    }

    #[test]
    fn no_loaded_rows_means_no_watermark() {
        assert!(Watermark::from_loaded(None, Duration::from_secs(7200)).unwrap().is_none());
        assert!(Watermark::from_loaded(None, Duration::MAX).unwrap().is_none());
    }

    #[test]
    fn unusable_offset_is_an_error_not_a_full_sync() {
        let loaded = Some(dt(9, 15, 0, 0));
        let result = Watermark::from_loaded(loaded, Duration::from_secs(u64::MAX / 2));
        assert!(matches!(result, Err(Error::WatermarkError(_))));

        let near_end = NaiveDateTime::MAX.checked_sub_signed(chrono::Duration::hours(1));
        let result = Watermark::from_loaded(near_end, Duration::from_secs(7200));
        assert!(matches!(result, Err(Error::WatermarkError(_))));
    }

    #[test]
    fn parses_warehouse_datetimes() {
        assert_eq!(parse_datetime("2024-03-09T09:15:00.000042"), Some(dt(9, 15, 0, 42)));
        assert_eq!(parse_datetime("2024-03-09T09:15:00"), Some(dt(9, 15, 0, 0)));
        assert_eq!(parse_datetime("yesterday"), None);
    }

    #[test]
    fn watermarks_render_per_table() {
        let mut marks = Watermarks::new();
        marks.insert("flow_runs", Watermark::new(dt(1, 2, 3, 0)));
        assert_eq!(marks.after("flow_runs").as_deref(), Some("2024-03-09T01:02:03.000000Z"));
        assert_eq!(marks.after("contacts_raw"), None);
        assert_eq!(marks.len(), 1);
    }
}
