//! Typed client for the RapidPro (Temba) v2 REST API.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use serde_json::Value;
use rapidflow_utils::SyncResult;

use super::http_client::{HttpSource, HttpSourceBuilder};

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectRef {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Group {
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Contact {
    pub uuid: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub urns: Vec<String>,
    #[serde(default)]
    pub groups: Vec<ObjectRef>,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    pub modified_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Label {
    pub uuid: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Flow {
    pub uuid: String,
    pub name: String,
    #[serde(default)]
    pub labels: Vec<Label>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunValue {
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub category: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Run {
    pub id: i64,
    pub flow: ObjectRef,
    pub contact: ObjectRef,
    #[serde(default)]
    pub responded: bool,
    #[serde(default)]
    pub values: BTreeMap<String, RunValue>,
    pub created_on: DateTime<Utc>,
    pub modified_on: DateTime<Utc>,
    #[serde(default)]
    pub exited_on: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDef {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RapidProClient {
    base: String,
    token: String,
    max_retries: u32,
    max_retry_wait: Duration,
    http: ReqwestClient,
}

impl RapidProClient {
    pub fn new(base: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            token: token.into(),
            max_retries: 5,
            max_retry_wait: Duration::from_secs(60),
            http: ReqwestClient::new(),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, max_retry_wait: Duration) -> Self {
        self.max_retries = max_retries;
        self.max_retry_wait = max_retry_wait;
        self
    }

    /// Max 429 retries and the cap on each wait.
    pub fn retry_policy(&self) -> (u32, Duration) {
        (self.max_retries, self.max_retry_wait)
    }

    fn endpoint(&self, name: &str, params: HashMap<String, String>) -> SyncResult<HttpSource> {
        HttpSourceBuilder::new(format!("{}/api/v2/{}.json", self.base, name))
            .token("Token", Some(self.token.as_str()))
            .params(params)
            .max_retries(self.max_retries)
            .max_retry_wait(self.max_retry_wait)
            .client(self.http.clone())
            .build()
    }

    fn after_param(after: Option<&str>) -> HashMap<String, String> {
        after
            .map(|a| HashMap::from([("after".to_string(), a.to_string())]))
            .unwrap_or_default()
    }

    pub async fn groups(&self) -> SyncResult<Vec<Group>> {
        self.endpoint("groups", HashMap::new())?.fetch_all().await
    }

    /// Contacts modified after `after`, or all contacts.
    pub async fn contacts(&self, after: Option<&str>) -> SyncResult<Vec<Contact>> {
        self.endpoint("contacts", Self::after_param(after))?.fetch_all().await
    }

    pub async fn flows(&self) -> SyncResult<Vec<Flow>> {
        self.endpoint("flows", HashMap::new())?.fetch_all().await
    }

    pub async fn fields(&self) -> SyncResult<Vec<FieldDef>> {
        self.endpoint("fields", HashMap::new())?.fetch_all().await
    }

    /// The runs endpoint for one flow; page through it with [`HttpSource::pages`].
    pub fn runs(&self, flow_uuid: &str, after: Option<&str>) -> SyncResult<HttpSource> {
        let mut params = Self::after_param(after);
        params.insert("flow".to_string(), flow_uuid.to_string());
        self.endpoint("runs", params)
    }
}
