use std::sync::Arc;

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::{debug, info, warn};

use crate::{
    cache::{BodyTap, CacheEntry, CacheKeyParts, X_CACHE, response_cache_key},
    config::ResponseCacheOptions,
    identity::{ClientIdentity, IdentityResolver},
    middleware::ResolvedTarget,
    store::CacheStore,
};

/// 读穿缓存：命中直接回放，未命中时旁路聚合上游响应并在流结束后写入存储
#[derive(Clone)]
pub struct ResponseCache {
    store: Arc<dyn CacheStore>,
    namespace: String,
    resolver: IdentityResolver,
    options: ResponseCacheOptions,
}

impl ResponseCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        namespace: impl Into<String>,
        resolver: IdentityResolver,
        options: ResponseCacheOptions,
    ) -> Self {
        Self {
            store,
            namespace: namespace.into(),
            resolver,
            options,
        }
    }

    pub async fn handle(&self, req: Request, next: Next) -> Response {
        if !is_cacheable_request(req.method(), req.headers()) {
            return next.run(req).await;
        }

        let key = self.key_for(&req);
        if let Some(entry) = self.lookup(&key).await {
            info!("Cache HIT {}", key);
            return entry.into_response(self.options.add_cache_header);
        }

        debug!("Cache MISS {}", key);
        let response = next.run(req).await;
        self.intercept(key, response)
    }

    pub fn key_for(&self, req: &Request) -> String {
        let identity = self.options.key_by_integrator.then(|| {
            req.extensions()
                .get::<ClientIdentity>()
                .cloned()
                .unwrap_or_else(|| self.resolver.resolve_request(req))
        });
        let target_path = req
            .extensions()
            .get::<ResolvedTarget>()
            .map(|t| t.url.path());

        response_cache_key(
            &self.namespace,
            &CacheKeyParts {
                method: req.method(),
                path: req.uri().path(),
                query: req.uri().query(),
                identity: identity.as_ref(),
                target_path,
            },
        )
    }

    async fn lookup(&self, key: &str) -> Option<CacheEntry> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match CacheEntry::decode(&raw) {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Corrupt cache entry {}, treating as miss: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Cache lookup failed for {}: {}", key, e);
                None
            }
        }
    }

    fn intercept(&self, key: String, response: Response) -> Response {
        let (mut parts, body) = response.into_parts();

        let body = if self.is_storable(parts.status, &parts.headers) {
            let status = parts.status;
            let headers = parts.headers.clone();
            let store = self.store.clone();
            let ttl = self.options.ttl_seconds;

            let expected_len = declared_len(&headers).or_else(|| body.size_hint().exact());

            let tap = BodyTap::new(body.into_data_stream(), self.options.max_bytes, move |bytes| {
                // body 完整后异步写入
                let entry = CacheEntry::new(status, &headers, bytes);
                tokio::spawn(persist(store, key, entry, ttl));
            })
            .expect_len(expected_len);
            Body::from_stream(tap)
        } else {
            debug!("Response for {} not cacheable (status {})", key, parts.status);
            body
        };

        if self.options.add_cache_header {
            parts.headers.insert(X_CACHE, HeaderValue::from_static("MISS"));
        }
        Response::from_parts(parts, body)
    }

    fn is_storable(&self, status: StatusCode, headers: &HeaderMap) -> bool {
        let status_ok = !self.options.only_200 || status == StatusCode::OK;
        let type_ok = !self.options.json_only || is_json(headers);
        status_ok && type_ok
    }
}

async fn persist(store: Arc<dyn CacheStore>, key: String, entry: CacheEntry, ttl: u64) {
    let raw = match entry.encode() {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Cache pack error for {}: {}", key, e);
            return;
        }
    };
    match store.set(&key, &raw, ttl).await {
        Ok(_) => debug!("Cache set {} ttl={}s ({} bytes)", key, ttl, entry.body.len()),
        Err(e) => warn!("Cache write error {}: {}", key, e),
    }
}

/// 只缓存 GET，且请求没有带 no-cache / no-store
pub fn is_cacheable_request(method: &Method, headers: &HeaderMap) -> bool {
    if method != Method::GET {
        return false;
    }
    !headers
        .get_all(header::CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|d| d.trim().to_ascii_lowercase())
        .any(|d| d == "no-cache" || d == "no-store")
}

fn declared_len(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// application/json 或 application/*+json
fn is_json(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.split_once('/') {
        Some(("application", subtype)) => subtype == "json" || subtype.ends_with("+json"),
        _ => false,
    }
}

pub async fn response_cache(
    State(cache): State<Arc<ResponseCache>>,
    req: Request,
    next: Next,
) -> Response {
    cache.handle(req, next).await
}
