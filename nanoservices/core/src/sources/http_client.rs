use std::collections::HashMap;
use std::time::Duration;

use futures_util::stream::{self, Stream, TryStreamExt};
use reqwest::header::{AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client as ReqwestClient, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use rapidflow_utils::error::Error;
use rapidflow_utils::SyncResult;
use url::Url;

const DEFAULT_RETRY_WAIT: Duration = Duration::from_secs(1);

/// One page of a `{ "next": ..., "results": [...] }` listing.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    #[serde(default)]
    pub next: Option<String>,
    pub results: Vec<T>,
}

#[derive(Debug)]
pub struct HttpSourceBuilder {
    url: String,
    token: Option<String>,
    scheme: String,
    params: Option<HashMap<String, String>>,
    max_retries: u32,
    max_retry_wait: Duration,
    client: Option<ReqwestClient>,
}

impl HttpSourceBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: None,
            scheme: "Token".to_string(),
            params: None,
            max_retries: 5,
            max_retry_wait: Duration::from_secs(60),
            client: None,
        }
    }

    /// Authorization header is sent as `<scheme> <token>`.
    pub fn token<T: Into<String>>(mut self, scheme: &str, token: Option<T>) -> Self {
        self.scheme = scheme.to_string();
        self.token = token.map(|t| t.into());
        self
    }

    pub fn params(mut self, params: HashMap<String, String>) -> Self {
        self.params = Some(params);
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn max_retry_wait(mut self, wait: Duration) -> Self {
        self.max_retry_wait = wait;
        self
    }

    /// Share a connection pool with other sources.
    pub fn client(mut self, client: ReqwestClient) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> SyncResult<HttpSource> {
        let mut url = Url::parse(&self.url)?;

        // Add parameters first (if any)
        if let Some(params) = self.params.filter(|p| !p.is_empty()) {
            let mut sorted: Vec<_> = params.into_iter().collect();
            sorted.sort();
            url.query_pairs_mut().extend_pairs(sorted);
        }

        let auth = self.token
            .filter(|t| !t.is_empty())
            .map(|t| format!("{} {}", self.scheme, t));

        Ok(HttpSource {
            client: self.client.unwrap_or_default(),
            url,
            auth,
            max_retries: self.max_retries,
            max_retry_wait: self.max_retry_wait,
        })
    }
}

/// A paginated GET endpoint with rate-limit aware retries.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: ReqwestClient,
    url: Url,
    auth: Option<String>,
    max_retries: u32,
    max_retry_wait: Duration,
}

impl HttpSource {
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Stream pages in order, following `next` links until exhausted.
    pub fn pages<T>(&self) -> impl Stream<Item = SyncResult<Vec<T>>> + '_
    where
        T: DeserializeOwned + 'static,
    {
        stream::try_unfold(Some(self.url.to_string()), move |next: Option<String>| async move {
            let Some(url) = next else {
                return Ok::<_, Error>(None);
            };
            let page: Page<T> = self.fetch_page(&url).await?;
            Ok(Some((page.results, page.next)))
        })
    }

    /// Every result of every page.
    pub async fn fetch_all<T>(&self) -> SyncResult<Vec<T>>
    where
        T: DeserializeOwned + 'static,
    {
        self.pages().try_concat().await
    }

    async fn fetch_page<T: DeserializeOwned>(&self, url: &str) -> SyncResult<Page<T>> {
        let resp = self.send_with_retry(url).await?;
        let page = resp.json::<Page<T>>().await?;
        tracing::debug!(url = %url, results = page.results.len(), "fetched page");
        Ok(page)
    }

    async fn send_with_retry(&self, url: &str) -> SyncResult<Response> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let mut request = self.client.get(url);
            if let Some(auth) = &self.auth {
                request = request.header(AUTHORIZATION, auth);
            }
            let resp = request.send().await?;
            let status = resp.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempts > self.max_retries {
                    return Err(Error::RateLimited { url: url.to_string(), attempts });
                }
                let wait = retry_after(&resp).min(self.max_retry_wait);
                tracing::warn!(url = %url, attempt = attempts, wait_ms = wait.as_millis() as u64, "rate limited, retrying");
                tokio::time::sleep(wait).await;
                continue;
            }

            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::ApiStatus { url: url.to_string(), status, body });
            }
            return Ok(resp);
        }
    }
}

fn retry_after(resp: &Response) -> Duration {
    resp.headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_RETRY_WAIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sorts_params_and_formats_auth() {
        let params = HashMap::from([
            ("flow".to_string(), "f-1".to_string()),
            ("after".to_string(), "2024-01-01T00:00:00.000000Z".to_string()),
        ]);
        let source = HttpSourceBuilder::new("https://rapidpro.example.org/api/v2/runs.json")
            .token("Token", Some("abc"))
            .params(params)
            .build()
            .unwrap();

        assert_eq!(
            source.url().as_str(),
            "https://rapidpro.example.org/api/v2/runs.json?after=2024-01-01T00%3A00%3A00.000000Z&flow=f-1"
        );
        assert_eq!(source.auth.as_deref(), Some("Token abc"));
    }

    #[test]
    fn empty_params_leave_no_query() {
        let source = HttpSourceBuilder::new("https://rapidpro.example.org/api/v2/groups.json")
            .params(HashMap::new())
            .build()
            .unwrap();
        assert_eq!(source.url().as_str(), "https://rapidpro.example.org/api/v2/groups.json");
        assert!(source.url().query().is_none());
    }

    #[test]
    fn empty_token_sends_no_header() {
        let source = HttpSourceBuilder::new("https://content.example.org/pageviews/")
            .token("token", Some(""))
            .build()
            .unwrap();
        assert!(source.auth.is_none());
    }

    #[test]
    fn invalid_url_is_an_error() {
        let result = HttpSourceBuilder::new("not a url").build();
        assert!(matches!(result, Err(Error::UrlParseError(_))));
    }

    #[test]
    fn page_decodes_without_next() {
        let page: Page<u32> = serde_json::from_str(r#"{"results": [1, 2]}"#).unwrap();
        assert!(page.next.is_none());
        assert_eq!(page.results, vec![1, 2]);
    }
}
