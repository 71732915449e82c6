use axum::{extract::Request, middleware::Next, response::Response};
use tracing::error;

use crate::middleware::ResolvedTarget;

/// 记录 5xx 响应。只看状态码，不读取 body，避免打断流式响应
pub async fn log_errors(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let response = next.run(req).await;

    if response.status().is_server_error() {
        let route = response
            .extensions()
            .get::<ResolvedTarget>()
            .map(|t| t.route_id.as_str())
            .unwrap_or("?");
        error!(
            "Server error occurred - Status: {}, Route: {}, Request: {} {}",
            response.status(),
            route,
            method,
            uri
        );
    }
    response
}
