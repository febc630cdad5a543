//! In-process HTTP stand-in for RapidPro, the content repo and BigQuery.

#![allow(dead_code)]

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use hyper::header::HeaderValue;
use hyper::service::service_fn;
use hyper::{Body, HeaderMap, Request, Response, StatusCode};
use serde_json::Value;
use tokio::sync::oneshot;

/// One request as the server saw it.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub path: String,
    pub query: String,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Recorded {
    /// `http://host:port` the client used, for building `next` links.
    pub fn base(&self) -> String {
        let host = self.headers.get("host").and_then(|h| h.to_str().ok()).unwrap_or_default();
        format!("http://{host}")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|h| h.to_str().ok())
    }

    pub fn has_param(&self, key: &str, value: &str) -> bool {
        url::form_urlencoded::parse(self.query.as_bytes()).any(|(k, v)| k == key && v == value)
    }

    pub fn param(&self, key: &str) -> Option<String> {
        url::form_urlencoded::parse(self.query.as_bytes())
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

type Handler = Arc<dyn Fn(&Recorded) -> Response<Body> + Send + Sync>;

pub struct MockServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockServer {
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Recorded) -> Response<Body> + Send + Sync + 'static,
    {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handler: Handler = Arc::new(handler);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (tx, mut rx) = oneshot::channel::<()>();

        let log = requests.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut rx => break,
                    accept = listener.accept() => {
                        let Ok((stream, _peer)) = accept else { continue };
                        let handler = handler.clone();
                        let log = log.clone();
                        tokio::spawn(async move {
                            let svc = service_fn(move |req: Request<Body>| {
                                let handler = handler.clone();
                                let log = log.clone();
                                async move {
                                    let (parts, body) = req.into_parts();
                                    let body = hyper::body::to_bytes(body).await.unwrap_or_default();
                                    let recorded = Recorded {
                                        method: parts.method.to_string(),
                                        path: parts.uri.path().to_string(),
                                        query: parts.uri.query().unwrap_or_default().to_string(),
                                        headers: parts.headers,
                                        body: body.to_vec(),
                                    };
                                    let resp = handler(&recorded);
                                    log.lock().unwrap().push(recorded);
                                    Ok::<_, Infallible>(resp)
                                }
                            });
                            let _ = hyper::server::conn::Http::new().serve_connection(stream, svc).await;
                        });
                    }
                }
            }
        });

        Self { addr, requests, shutdown: Some(tx) }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, path: &str) -> Vec<Recorded> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

pub fn json(status: u16, body: Value) -> Response<Body> {
    let mut resp = Response::new(Body::from(body.to_string()));
    *resp.status_mut() = StatusCode::from_u16(status).unwrap();
    resp.headers_mut().insert("content-type", HeaderValue::from_static("application/json"));
    resp
}

pub fn rate_limited(retry_after: &'static str) -> Response<Body> {
    let mut resp = Response::new(Body::from(r#"{"detail":"Request was throttled."}"#));
    *resp.status_mut() = StatusCode::TOO_MANY_REQUESTS;
    resp.headers_mut().insert("retry-after", HeaderValue::from_static(retry_after));
    resp
}

pub fn not_found() -> Response<Body> {
    json(404, serde_json::json!({ "detail": "Not found." }))
}

/// A RapidPro v2 page.
pub fn page(results: Value, next: Option<String>) -> Response<Body> {
    json(200, serde_json::json!({ "next": next, "previous": null, "results": results }))
}
