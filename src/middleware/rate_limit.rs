use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::Uri,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{error, info, warn};

use crate::{
    config::{RateLimitOptions, StoreFailurePolicy},
    error::GatewayError,
    identity::IdentityResolver,
    middleware::ResolvedTarget,
    rate_limit::FixedWindowRateLimiter,
};

/// 准入控制：在路由和缓存之前执行固定窗口限流
#[derive(Clone)]
pub struct RateLimiter {
    route_id: String,
    limiter: FixedWindowRateLimiter,
    resolver: IdentityResolver,
    options: RateLimitOptions,
}

impl RateLimiter {
    pub fn new(
        route_id: impl Into<String>,
        limiter: FixedWindowRateLimiter,
        resolver: IdentityResolver,
        options: RateLimitOptions,
    ) -> Self {
        Self {
            route_id: route_id.into(),
            limiter,
            resolver,
            options,
        }
    }

    pub async fn check_rate_limit(self: Arc<Self>, req: Request, next: Next) -> Response {
        let original = req.uri().clone();
        let response = self.admit(req, next).await;
        self.log_completion(&original, &response);
        response
    }

    async fn admit(&self, mut req: Request, next: Next) -> Response {
        let path = req.uri().path().to_string();

        if self.options.require_integrator_id && !self.resolver.has_trusted_header(req.headers()) {
            error!(
                "Missing {} header for request path: {}",
                self.resolver.trusted_header(),
                path
            );
            return self.missing_identity().into_response();
        }

        let identity = self.resolver.resolve_request(&req);
        info!("Received request from {} by path: {}", identity, path);
        if identity.as_str().trim().is_empty() {
            return self.missing_identity().into_response();
        }

        match self
            .limiter
            .check(&identity, self.options.limit, self.options.window_seconds)
            .await
        {
            Ok(decision) if decision.allowed => {
                info!("Remaining limit for {}: {}", identity, decision.remaining);
            }
            Ok(decision) => {
                warn!(
                    "Rate limit exceeded for {} on {}, retry after {}s",
                    identity, path, decision.retry_after_seconds
                );
                return GatewayError::RateLimitExceeded {
                    status: self.options.status_code,
                    code: self.options.failed_code.clone(),
                    message: self.options.failed_message.clone(),
                    key: identity.to_string(),
                    retry_after_seconds: decision.retry_after_seconds,
                }
                .into_response();
            }
            Err(e) => match self.options.on_store_error {
                StoreFailurePolicy::FailOpen => {
                    warn!("Rate limit store unavailable, allowing {}: {}", identity, e);
                }
                StoreFailurePolicy::FailClosed => {
                    error!("Rate limit store unavailable, rejecting {}: {}", identity, e);
                    return GatewayError::StoreUnavailable {
                        status: self.options.store_error_status,
                        code: self.options.store_error_code.clone(),
                        message: self.options.store_error_message.clone(),
                    }
                    .into_response();
                }
            },
        }

        req.extensions_mut().insert(identity);
        next.run(req).await
    }

    fn missing_identity(&self) -> GatewayError {
        GatewayError::MissingIdentity {
            status: self.options.missing_integrator_status,
            code: self.options.missing_integrator_code.clone(),
            message: self.options.missing_integrator_message.clone(),
        }
    }

    fn log_completion(&self, original: &Uri, response: &Response) {
        let target = response
            .extensions()
            .get::<ResolvedTarget>()
            .map(|t| t.url.to_string())
            .unwrap_or_else(|| "-".to_string());
        info!(
            "GW route={} original={} -> target={} status={}",
            self.route_id,
            original,
            target,
            response.status()
        );
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request,
    next: Next,
) -> Response {
    limiter.check_rate_limit(req, next).await
}
