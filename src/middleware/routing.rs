use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Uri,
    middleware::Next,
    response::Response,
};
use reqwest::Url;

use crate::config::{ConfigError, RouteDefinition};

/// 路由解析结果，同时写入请求和响应的 extensions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub route_id: String,
    pub url: Url,
}

#[derive(Debug, Clone)]
pub struct RouteTarget {
    id: String,
    prefix: String,
    base: Url,
    strip_prefix: bool,
}

impl RouteTarget {
    pub fn new(route: &RouteDefinition) -> Result<Self, ConfigError> {
        let base = Url::parse(&route.uri).map_err(|e| ConfigError::InvalidRoute {
            id: route.id.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            id: route.id.clone(),
            prefix: route.path.trim_end_matches('/').to_string(),
            base,
            strip_prefix: route.strip_prefix,
        })
    }

    pub fn resolve(&self, uri: &Uri) -> ResolvedTarget {
        let mut path = uri.path();
        if self.strip_prefix {
            path = path.strip_prefix(self.prefix.as_str()).unwrap_or(path);
        }

        let mut url = self.base.clone();
        let joined = format!(
            "{}/{}",
            self.base.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.set_query(uri.query());

        ResolvedTarget {
            route_id: self.id.clone(),
            url,
        }
    }
}

pub async fn resolve_target(
    State(route): State<Arc<RouteTarget>>,
    mut req: Request,
    next: Next,
) -> Response {
    let target = route.resolve(req.uri());
    tracing::debug!("Route {} resolved {} -> {}", target.route_id, req.uri(), target.url);

    req.extensions_mut().insert(target.clone());
    let mut response = next.run(req).await;
    response.extensions_mut().insert(target);
    response
}
