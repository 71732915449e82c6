use std::sync::Arc;

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::any,
};

use crate::{
    AppState,
    config::{ConfigError, RouteDefinition},
    identity::IdentityResolver,
    middleware::{
        RateLimiter, ResponseCache, RouteTarget, log_errors, rate_limit, resolve_target,
        response_cache,
    },
    proxy,
    rate_limit::FixedWindowRateLimiter,
};

// 创建网关路由，每条路由一套独立的过滤链
pub fn create_router(state: &AppState) -> Result<Router, ConfigError> {
    let resolver = IdentityResolver::new(&state.config.identity_header)?;
    let limiter = FixedWindowRateLimiter::new(
        state.counters.clone(),
        state.config.rate_limit_namespace.clone(),
    );

    let mut router = Router::new();
    for route in &state.config.routes {
        tracing::info!(
            "Route {}: {} -> {} (rate limit: {}, cache: {})",
            route.id,
            route.path,
            route.uri,
            route.rate_limit.is_some(),
            route.cache.is_some()
        );
        router = router.merge(route_pipeline(route, state, &resolver, &limiter)?);
    }
    Ok(router.layer(from_fn(log_errors)))
}

/// 请求依次经过：限流 -> 目标解析 -> 响应缓存 -> 转发上游。
/// axum 中后添加的 layer 在外层，所以这里按相反顺序添加。
fn route_pipeline(
    route: &RouteDefinition,
    state: &AppState,
    resolver: &IdentityResolver,
    limiter: &FixedWindowRateLimiter,
) -> Result<Router, ConfigError> {
    let prefix = route.path.trim_end_matches('/');
    let exact = if prefix.is_empty() { "/" } else { prefix };
    let wildcard = format!("{}/{{*rest}}", prefix);

    let mut router = Router::new()
        .route(exact, any(proxy::forward))
        .route(&wildcard, any(proxy::forward));

    if let Some(options) = &route.cache {
        let cache = ResponseCache::new(
            state.cache.clone(),
            state.config.cache_namespace.clone(),
            resolver.clone(),
            options.clone(),
        );
        router = router.layer(from_fn_with_state(Arc::new(cache), response_cache));
    }

    let target = RouteTarget::new(route)?;
    router = router.layer(from_fn_with_state(Arc::new(target), resolve_target));

    if let Some(options) = &route.rate_limit {
        let admission = RateLimiter::new(
            route.id.clone(),
            limiter.clone(),
            resolver.clone(),
            options.clone(),
        );
        router = router.layer(from_fn_with_state(Arc::new(admission), rate_limit));
    }

    Ok(router.with_state(state.http.clone()))
}
