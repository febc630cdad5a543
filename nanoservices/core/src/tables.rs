//! Warehouse table catalog: names, write modes and column schemas.

use serde::Serialize;

use crate::config::types::ContactFieldConfig;

pub const GROUPS: &str = "groups";
pub const CONTACTS: &str = "contacts_raw";
pub const GROUP_CONTACTS: &str = "group_contacts";
pub const FLOWS: &str = "flows";
pub const PAGE_VIEWS: &str = "page_views";
pub const FLOW_RUNS: &str = "flow_runs";
pub const FLOW_RUN_VALUES: &str = "flow_run_values";

/// Columns every contact row carries before the custom fields.
pub const CONTACT_BASE_COLUMNS: &[(&str, &str)] = &[
    ("uuid", "STRING"),
    ("modified_on", "TIMESTAMP"),
    ("name", "STRING"),
    ("urn", "STRING"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace the whole table on every load
    Truncate,
    Append,
}

impl WriteMode {
    pub fn disposition(&self) -> &'static str {
        match self {
            WriteMode::Truncate => "WRITE_TRUNCATE",
            WriteMode::Append => "WRITE_APPEND",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    pub mode: &'static str,
}

impl Column {
    pub fn new(name: &str, column_type: &str) -> Self {
        Self { name: name.to_string(), column_type: column_type.to_string(), mode: "NULLABLE" }
    }

    pub fn repeated(name: &str, column_type: &str) -> Self {
        Self { mode: "REPEATED", ..Self::new(name, column_type) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: &'static str,
    pub mode: WriteMode,
    pub columns: Vec<Column>,
    /// Timestamp column the incremental watermark is read from
    pub watermark_column: Option<&'static str>,
}

impl TableSpec {
    fn new(name: &'static str, mode: WriteMode, columns: &[(&str, &str)]) -> Self {
        Self {
            name,
            mode,
            columns: columns.iter().map(|(n, t)| Column::new(n, t)).collect(),
            watermark_column: None,
        }
    }

    fn watermarked(mut self, column: &'static str) -> Self {
        self.watermark_column = Some(column);
        self
    }

    /// Schema sent with a load job. Truncate loads keep the existing table schema.
    pub fn load_schema(&self) -> Option<&[Column]> {
        match self.mode {
            WriteMode::Truncate => None,
            WriteMode::Append => Some(&self.columns),
        }
    }
}

/// All tables in load order.
#[derive(Debug, Clone)]
pub struct Catalog {
    tables: Vec<TableSpec>,
}

impl Catalog {
    pub fn new(contact_fields: &[ContactFieldConfig]) -> Self {
        let mut contacts = TableSpec::new(CONTACTS, WriteMode::Append, CONTACT_BASE_COLUMNS)
            .watermarked("modified_on");
        contacts.columns.extend(
            contact_fields.iter().map(|f| Column::new(&f.name, &f.field_type.to_uppercase())),
        );

        let mut flows = TableSpec::new(FLOWS, WriteMode::Truncate, &[("uuid", "STRING"), ("name", "STRING")]);
        flows.columns.push(Column::repeated("labels", "STRING"));

        let tables = vec![
            TableSpec::new(GROUPS, WriteMode::Truncate, &[("uuid", "STRING"), ("name", "STRING")]),
            contacts,
            TableSpec::new(
                GROUP_CONTACTS,
                WriteMode::Append,
                &[("contact_uuid", "STRING"), ("group_uuid", "STRING")],
            ),
            flows,
            TableSpec::new(
                PAGE_VIEWS,
                WriteMode::Append,
                &[
                    ("timestamp", "TIMESTAMP"),
                    ("page", "INTEGER"),
                    ("revision", "INTEGER"),
                    ("id", "INTEGER"),
                    ("run_uuid", "STRING"),
                    ("contact_uuid", "STRING"),
                ],
            )
            .watermarked("timestamp"),
            TableSpec::new(
                FLOW_RUNS,
                WriteMode::Append,
                &[
                    ("id", "INTEGER"),
                    ("flow_uuid", "STRING"),
                    ("contact_uuid", "STRING"),
                    ("responded", "BOOLEAN"),
                    ("created_at", "TIMESTAMP"),
                    ("modified_on", "TIMESTAMP"),
                    ("exited_on", "TIMESTAMP"),
                    ("exit_type", "STRING"),
                ],
            )
            .watermarked("created_at"),
            TableSpec::new(
                FLOW_RUN_VALUES,
                WriteMode::Append,
                &[
                    ("run_id", "INTEGER"),
                    ("value", "STRING"),
                    ("category", "STRING"),
                    ("time", "TIMESTAMP"),
                    ("name", "STRING"),
                    ("input", "STRING"),
                ],
            ),
        ];
        Self { tables }
    }

    pub fn tables(&self) -> &[TableSpec] {
        &self.tables
    }

    pub fn get(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Tables synced incrementally, with their watermark column.
    pub fn watermarked(&self) -> impl Iterator<Item = (&'static str, &'static str)> + '_ {
        self.tables.iter().filter_map(|t| t.watermark_column.map(|c| (t.name, c)))
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new(&[])
    }
}
