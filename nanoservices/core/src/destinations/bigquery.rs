//! BigQuery over its REST API: watermark queries and multipart NDJSON load jobs.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client as ReqwestClient, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use rapidflow_utils::error::Error;
use rapidflow_utils::{RowBatch, SyncResult};
use uuid::Uuid;

use crate::tables::TableSpec;
use crate::watermark::{parse_datetime, watermark_query};
use super::traits::{Destination, LoadReport};

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const DEFAULT_API_BASE: &str = "https://bigquery.googleapis.com";
const QUERY_WAIT_MS: u64 = 10_000;

/// Supplies OAuth bearer tokens for BigQuery requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> SyncResult<String>;
}

/// Tokens minted from a service-account JSON key.
pub struct ServiceAccountTokens(CustomServiceAccount);

impl ServiceAccountTokens {
    pub fn from_file(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let account = CustomServiceAccount::from_file(path)
            .map_err(|e| Error::AuthError(format!("{}: {e}", path.display())))?;
        Ok(Self(account))
    }

    /// Project the key belongs to.
    pub fn project_id(&self) -> Option<String> {
        self.0.project_id().map(str::to_string)
    }
}

#[async_trait]
impl TokenSource for ServiceAccountTokens {
    async fn token(&self) -> SyncResult<String> {
        let token = self.0
            .token(&[CLOUD_PLATFORM_SCOPE])
            .await
            .map_err(|e| Error::AuthError(e.to_string()))?;
        Ok(token.as_str().to_string())
    }
}

/// A fixed token, for emulators and tests.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> SyncResult<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    job_id: String,
    #[serde(default)]
    location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorProto {
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    message: String,
}

impl ErrorProto {
    fn describe(&self) -> String {
        match (&self.reason, &self.location) {
            (Some(reason), Some(location)) => format!("{} ({reason} at {location})", self.message),
            (Some(reason), None) => format!("{} ({reason})", self.message),
            _ => self.message.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Cell {
    #[serde(default)]
    v: Value,
}

#[derive(Debug, Deserialize)]
struct TableRow {
    #[serde(default)]
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    #[serde(default)]
    rows: Vec<TableRow>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobStatus {
    state: String,
    error_result: Option<ErrorProto>,
    #[serde(default)]
    errors: Vec<ErrorProto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoadStatistics {
    output_rows: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobStatistics {
    load: Option<LoadStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Job {
    job_reference: JobReference,
    status: JobStatus,
    statistics: Option<JobStatistics>,
}

impl Job {
    fn output_rows(&self) -> Option<usize> {
        self.statistics.as_ref()?.load.as_ref()?.output_rows.as_ref()?.parse().ok()
    }
}

pub struct BigQueryDestination {
    http: ReqwestClient,
    tokens: Arc<dyn TokenSource>,
    project: String,
    dataset: String,
    location: Option<String>,
    api_base: String,
    max_bad_records: u32,
    poll_interval: Duration,
    job_timeout: Duration,
}

impl BigQueryDestination {
    pub fn new(tokens: Arc<dyn TokenSource>, project: impl Into<String>, dataset: impl Into<String>) -> Self {
        Self {
            http: ReqwestClient::new(),
            tokens,
            project: project.into(),
            dataset: dataset.into(),
            location: None,
            api_base: DEFAULT_API_BASE.to_string(),
            max_bad_records: 1,
            poll_interval: Duration::from_secs(1),
            job_timeout: Duration::from_secs(600),
        }
    }

    pub fn location(mut self, location: Option<String>) -> Self {
        self.location = location;
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn max_bad_records(mut self, n: u32) -> Self {
        self.max_bad_records = n;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    fn projects_url(&self) -> String {
        format!("{}/bigquery/v2/projects/{}", self.api_base, self.project)
    }

    fn with_location(&self, request: RequestBuilder, location: Option<&str>) -> RequestBuilder {
        match location.or(self.location.as_deref()) {
            Some(loc) => request.query(&[("location", loc)]),
            None => request,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> SyncResult<T> {
        let token = self.tokens.token().await?;
        let resp = request.bearer_auth(token).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let url = resp.url().to_string();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::ApiStatus { url, status, body });
        }
        Ok(resp.json::<T>().await?)
    }

    fn check_deadline(&self, started: Instant, job_id: &str) -> SyncResult<()> {
        if started.elapsed() > self.job_timeout {
            return Err(Error::WarehouseError(format!(
                "job {job_id} did not finish within {}s",
                self.job_timeout.as_secs()
            )));
        }
        Ok(())
    }

    /// First cell of the first row of `sql`, `None` for NULL or no rows.
    async fn query_scalar(&self, sql: &str) -> SyncResult<Option<String>> {
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "timeoutMs": QUERY_WAIT_MS,
        });
        if let Some(location) = &self.location {
            body["location"] = json!(location);
        }

        let started = Instant::now();
        let request = self.http.post(format!("{}/queries", self.projects_url())).json(&body);
        let mut resp: QueryResponse = self.send(request).await?;

        while !resp.job_complete {
            let job = resp.job_reference.clone().ok_or_else(|| {
                Error::WarehouseError("incomplete query returned no job reference".to_string())
            })?;
            self.check_deadline(started, &job.job_id)?;
            tokio::time::sleep(self.poll_interval).await;

            let request = self.with_location(
                self.http
                    .get(format!("{}/queries/{}", self.projects_url(), job.job_id))
                    .query(&[("timeoutMs", QUERY_WAIT_MS)]),
                job.location.as_deref(),
            );
            resp = self.send(request).await?;
        }

        if let Some(err) = resp.errors.first() {
            return Err(Error::WarehouseError(err.describe()));
        }

        let cell = resp.rows.into_iter().next().and_then(|r| r.f.into_iter().next());
        Ok(match cell.map(|c| c.v) {
            Some(Value::String(s)) => Some(s),
            _ => None,
        })
    }

    fn load_metadata(&self, table: &TableSpec, job_id: &str) -> Value {
        let mut load = json!({
            "destinationTable": {
                "projectId": self.project,
                "datasetId": self.dataset,
                "tableId": table.name,
            },
            "sourceFormat": "NEWLINE_DELIMITED_JSON",
            "writeDisposition": table.mode.disposition(),
            "maxBadRecords": self.max_bad_records,
            "autodetect": false,
        });
        if let Some(columns) = table.load_schema() {
            load["schema"] = json!({ "fields": columns });
        }

        let mut reference = json!({ "projectId": self.project, "jobId": job_id });
        if let Some(location) = &self.location {
            reference["location"] = json!(location);
        }
        json!({ "jobReference": reference, "configuration": { "load": load } })
    }

    async fn wait_for_job(&self, mut job: Job) -> SyncResult<Job> {
        let started = Instant::now();
        while job.status.state != "DONE" {
            self.check_deadline(started, &job.job_reference.job_id)?;
            tokio::time::sleep(self.poll_interval).await;
            let request = self.with_location(
                self.http.get(format!("{}/jobs/{}", self.projects_url(), job.job_reference.job_id)),
                job.job_reference.location.as_deref(),
            );
            job = self.send(request).await?;
        }
        Ok(job)
    }
}

/// Build a `multipart/related` body: JSON metadata part, then the media part.
pub fn multipart_related(boundary: &str, metadata: &Value, media: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(media.len() + 512);
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.to_string().as_bytes());
    body.extend_from_slice(format!("\r\n--{boundary}\r\n").as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(media);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[async_trait]
impl Destination for BigQueryDestination {
    fn name(&self) -> &str { "bigquery" }

    async fn last_loaded(&self, table: &str, column: &str) -> SyncResult<Option<NaiveDateTime>> {
        let sql = watermark_query(&self.project, &self.dataset, table, column);
        tracing::debug!(%sql, "reading watermark");
        let cell = self.query_scalar(&sql).await?;
        match cell {
            None => Ok(None),
            Some(text) => parse_datetime(&text).map(Some).ok_or_else(|| {
                Error::WarehouseError(format!("unparsable DATETIME '{text}' from {table}.{column}"))
            }),
        }
    }

    async fn load(&self, table: &TableSpec, rows: RowBatch) -> SyncResult<LoadReport> {
        let job_id = format!("rapidflow_{}_{}", table.name, Uuid::new_v4().simple());
        let boundary = format!("rapidflow_{}", Uuid::new_v4().simple());
        let metadata = self.load_metadata(table, &job_id);
        let body = multipart_related(&boundary, &metadata, &rows.to_ndjson()?);

        let request = self.http
            .post(format!("{}/upload/bigquery/v2/projects/{}/jobs", self.api_base, self.project))
            .query(&[("uploadType", "multipart")])
            .header(CONTENT_TYPE, format!("multipart/related; boundary={boundary}"))
            .body(body);
        let job: Job = self.send(request).await?;
        tracing::debug!(table = table.name, job = %job.job_reference.job_id, "load job submitted");

        let job = self.wait_for_job(job).await?;

        let mut errors: Vec<String> = job.status.errors.iter().map(ErrorProto::describe).collect();
        let loaded = match &job.status.error_result {
            Some(fatal) => {
                let message = fatal.describe();
                if !errors.contains(&message) {
                    errors.push(message);
                }
                tracing::warn!(table = table.name, job = %job.job_reference.job_id, "load job failed");
                0
            }
            None => job.output_rows().unwrap_or(rows.len()),
        };

        Ok(LoadReport { table: table.name.to_string(), rows: loaded, errors })
    }
}
