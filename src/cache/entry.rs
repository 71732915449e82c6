use std::collections::BTreeMap;

use axum::{
    body::{Body, Bytes},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::proxy::is_hop_by_hop;

pub const X_CACHE: &str = "x-cache";

#[derive(Debug, thiserror::Error)]
pub enum CacheEntryError {
    #[error("invalid entry json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid status: {0}")]
    Status(String),
    #[error("invalid body encoding: {0}")]
    Body(#[from] base64::DecodeError),
}

/// 缓存的一次完整响应
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub status: StatusCode,
    /// 每个头只保留第一个值
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

/// 存储格式: {"status": 200, "headers": "<json>", "body": "<base64>"}
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    status: StoredStatus,
    headers: String,
    body: String,
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredStatus {
    Number(u16),
    Text(String),
}

impl CacheEntry {
    pub fn new(status: StatusCode, headers: &HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers: snapshot_headers(headers),
            body,
        }
    }

    pub fn encode(&self) -> Result<String, CacheEntryError> {
        let stored = StoredEntry {
            status: StoredStatus::Number(self.status.as_u16()),
            headers: serde_json::to_string(&self.headers)?,
            body: STANDARD.encode(&self.body),
        };
        Ok(serde_json::to_string(&stored)?)
    }

    pub fn decode(raw: &str) -> Result<Self, CacheEntryError> {
        let stored: StoredEntry = serde_json::from_str(raw)?;
        let code = match stored.status {
            StoredStatus::Number(n) => n,
            StoredStatus::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| CacheEntryError::Status(s.clone()))?,
        };
        let status = StatusCode::from_u16(code).map_err(|_| CacheEntryError::Status(code.to_string()))?;

        Ok(Self {
            status,
            headers: serde_json::from_str(&stored.headers)?,
            body: Bytes::from(STANDARD.decode(stored.body.as_bytes())?),
        })
    }

    /// 回放缓存：状态码、头快照、原始 body
    pub fn into_response(self, add_cache_header: bool) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;

        let headers = response.headers_mut();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, value);
            }
        }
        if add_cache_header {
            headers.insert(X_CACHE, HeaderValue::from_static("HIT"));
        }
        response
    }
}

fn snapshot_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    let mut snapshot = BTreeMap::new();
    for (name, value) in headers {
        if is_hop_by_hop(name) || name.as_str() == X_CACHE {
            continue;
        }
        if let Ok(value) = value.to_str() {
            snapshot
                .entry(name.as_str().to_string())
                .or_insert_with(|| value.to_string());
        }
    }
    snapshot
}
