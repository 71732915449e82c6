use std::env;
use std::path::Path;

use axum::http::StatusCode;
use reqwest::Url;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {value}")]
    InvalidVar { name: &'static str, value: String },
    #[error("failed to read routes file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse routes: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid route {id}: {reason}")]
    InvalidRoute { id: String, reason: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub redis_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub routes_file: String,
    pub identity_header: String,
    pub rate_limit_namespace: String,
    pub cache_namespace: String,
    pub routes: Vec<RouteDefinition>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let redis_url = env::var("REDIS_URL").map_err(|_| ConfigError::MissingVar("REDIS_URL"))?;
        let server_port = match env::var("SERVER_PORT") {
            Ok(port) => port.parse().map_err(|_| ConfigError::InvalidVar {
                name: "SERVER_PORT",
                value: port,
            })?,
            Err(_) => 8080,
        };
        let routes_file = var_or("GATEWAY_ROUTES", "routes.json");
        let routes = load_routes(&routes_file)?;

        Ok(Config {
            redis_url,
            server_host: var_or("SERVER_HOST", "0.0.0.0"),
            server_port,
            routes_file,
            identity_header: var_or("IDENTITY_HEADER", "X-Real-IP"),
            rate_limit_namespace: var_or("RATE_LIMIT_NAMESPACE", "rl"),
            cache_namespace: var_or("CACHE_NAMESPACE", "cache"),
            routes,
        })
    }
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn load_routes(path: impl AsRef<Path>) -> Result<Vec<RouteDefinition>, ConfigError> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_routes(&raw)
}

pub fn parse_routes(raw: &str) -> Result<Vec<RouteDefinition>, ConfigError> {
    let routes: Vec<RouteDefinition> = serde_json::from_str(raw)?;
    let mut seen = std::collections::HashSet::new();
    for route in &routes {
        route.validate()?;
        if !seen.insert(route.path.trim_end_matches('/')) {
            return Err(ConfigError::InvalidRoute {
                id: route.id.clone(),
                reason: format!("duplicate path {}", route.path),
            });
        }
    }
    Ok(routes)
}

/// 单条路由：匹配 `path` 前缀的请求被转发到 `uri`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteDefinition {
    pub id: String,
    pub path: String,
    pub uri: String,
    #[serde(default)]
    pub strip_prefix: bool,
    #[serde(default)]
    pub rate_limit: Option<RateLimitOptions>,
    #[serde(default)]
    pub cache: Option<ResponseCacheOptions>,
}

impl RouteDefinition {
    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidRoute {
            id: self.id.clone(),
            reason: reason.to_string(),
        };

        if !self.path.starts_with('/') {
            return Err(invalid("path must start with '/'"));
        }
        match Url::parse(&self.uri) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => return Err(invalid("uri must be an absolute http(s) url")),
        }
        if let Some(rl) = &self.rate_limit {
            if rl.limit == 0 || rl.window_seconds == 0 {
                return Err(invalid("rateLimit.limit and rateLimit.windowSeconds must be positive"));
            }
            for (name, status) in [
                ("statusCode", rl.status_code),
                ("missingIntegratorStatus", rl.missing_integrator_status),
                ("storeErrorStatus", rl.store_error_status),
            ] {
                if StatusCode::from_u16(status).is_err() {
                    return Err(invalid(&format!(
                        "rateLimit.{} {} is not a valid HTTP status",
                        name, status
                    )));
                }
            }
        }
        if let Some(cache) = &self.cache {
            if cache.ttl_seconds == 0 || cache.max_bytes == 0 {
                return Err(invalid("cache.ttlSeconds and cache.maxBytes must be positive"));
            }
        }
        Ok(())
    }
}

/// 限流存储不可用时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreFailurePolicy {
    #[default]
    FailOpen,
    FailClosed,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateLimitOptions {
    pub limit: u64,
    pub window_seconds: u64,
    pub status_code: u16,
    pub require_integrator_id: bool,
    pub missing_integrator_status: u16,
    pub missing_integrator_code: String,
    pub missing_integrator_message: String,
    pub failed_code: String,
    pub failed_message: String,
    pub on_store_error: StoreFailurePolicy,
    pub store_error_status: u16,
    pub store_error_code: String,
    pub store_error_message: String,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            limit: 100,
            window_seconds: 60,
            status_code: 429,
            require_integrator_id: false,
            missing_integrator_status: 400,
            missing_integrator_code: "MISSING_CLIENT_ID".into(),
            missing_integrator_message: "Client identity header is required".into(),
            failed_code: "RATE_LIMITED".into(),
            failed_message: "Too many requests".into(),
            on_store_error: StoreFailurePolicy::FailOpen,
            store_error_status: 503,
            store_error_code: "RATE_LIMIT_UNAVAILABLE".into(),
            store_error_message: "Rate limiter is temporarily unavailable".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResponseCacheOptions {
    pub ttl_seconds: u64,
    pub max_bytes: usize,
    #[serde(rename = "only200")]
    pub only_200: bool,
    pub json_only: bool,
    pub add_cache_header: bool,
    pub key_by_integrator: bool,
}

impl Default for ResponseCacheOptions {
    fn default() -> Self {
        Self {
            ttl_seconds: 60,
            max_bytes: 1024 * 1024,
            only_200: true,
            json_only: true,
            add_cache_header: true,
            key_by_integrator: false,
        }
    }
}
