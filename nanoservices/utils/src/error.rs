use thiserror::Error;
use reqwest::Error as ReqwestError;
use reqwest::StatusCode;
use std::io::Error as IoError;
use serde_json::Error as JsonError;
use url::ParseError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Reqwest Error: {0}")]
    RestSourceError(#[from] ReqwestError),

    #[error("Io Error: {0}")]
    IoError(#[from] IoError),

    #[error("Json Error: {0}")]
    JsonError(#[from] JsonError),

    #[error("Url Error: {0}")]
    UrlParseError(#[from] ParseError),

    #[error("Api Error: {url} returned {status}: {body}")]
    ApiStatus {
        url: String,
        status: StatusCode,
        body: String,
    },

    #[error("Rate limit still exceeded for {url} after {attempts} attempts")]
    RateLimited { url: String, attempts: u32 },

    #[error("Auth Error: {0}")]
    AuthError(String),

    #[error("Warehouse Error: {0}")]
    WarehouseError(String),

    #[error("Watermark Error: {0}")]
    WatermarkError(String),
}
