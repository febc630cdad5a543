use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub rapidpro: RapidProConfig,
    pub content_repo: ContentRepoConfig,
    pub warehouse: WarehouseConfig,
    /// Shift added to every watermark read from the warehouse, e.g. "2h"
    #[serde(default = "default_watermark_offset")]
    pub watermark_offset: String,
    /// Custom contact fields copied into `contacts_raw`, in column order
    #[serde(default)]
    pub contact_fields: Vec<ContactFieldConfig>,
    /// Where to dump Prometheus text metrics after a run
    pub metrics_textfile: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RapidProConfig {
    pub url: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_retry_wait")]
    pub max_retry_wait: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentRepoConfig {
    pub url: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    /// Defaults to the project of the service-account key
    pub project: Option<String>,
    pub dataset: String,
    pub location: Option<String>,
    #[serde(default = "default_key_path")]
    pub key_path: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_max_bad_records")]
    pub max_bad_records: u32,
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
    #[serde(default = "default_job_timeout")]
    pub job_timeout: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContactFieldConfig {
    pub name: String,
    /// BigQuery column type: STRING, INTEGER, NUMERIC, TIMESTAMP, ...
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
}

fn default_watermark_offset() -> String {
    "2h".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_max_retry_wait() -> String {
    "60s".to_string()
}

fn default_key_path() -> String {
    "credentials.json".to_string()
}

fn default_api_base() -> String {
    "https://bigquery.googleapis.com".to_string()
}

fn default_max_bad_records() -> u32 {
    1
}

fn default_poll_interval() -> String {
    "1s".to_string()
}

fn default_job_timeout() -> String {
    "10m".to_string()
}

fn default_field_type() -> String {
    "STRING".to_string()
}
