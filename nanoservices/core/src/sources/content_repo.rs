//! Page-view listing from the content repository.

use std::collections::HashMap;

use reqwest::Client as ReqwestClient;
use serde::Deserialize;
use serde_json::{Map, Value};
use rapidflow_utils::SyncResult;

use super::http_client::HttpSourceBuilder;

#[derive(Debug, Clone, Deserialize)]
pub struct PageView {
    pub id: Value,
    pub timestamp: Value,
    #[serde(default)]
    pub page: Value,
    #[serde(default)]
    pub revision: Value,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub struct ContentRepoClient {
    url: String,
    token: String,
    http: ReqwestClient,
}

impl ContentRepoClient {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self { url: url.into(), token: token.into(), http: ReqwestClient::new() }
    }

    /// All page views, or only those newer than `since` when given.
    pub async fn page_views(&self, since: Option<&str>) -> SyncResult<Vec<PageView>> {
        let params = since
            .map(|s| HashMap::from([("timestamp_gt".to_string(), s.to_string())]))
            .unwrap_or_default();

        HttpSourceBuilder::new(self.url.as_str())
            .token("token", Some(self.token.as_str()))
            .params(params)
            .client(self.http.clone())
            .build()?
            .fetch_all()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_page_view_without_data() {
        let view: PageView = serde_json::from_value(json!({
            "id": 7,
            "timestamp": "2024-02-01T08:00:00Z",
            "page": 12,
            "revision": 3
        }))
        .unwrap();
        assert_eq!(view.id, json!(7));
        assert!(view.data.is_empty());
    }
}
