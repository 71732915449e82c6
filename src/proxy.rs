use axum::{
    body::{Body, to_bytes},
    extract::{Request, State},
    http::{HeaderName, header},
    response::Response,
};
use tracing::warn;

use crate::error::GatewayError;
use crate::middleware::ResolvedTarget;

const MAX_REQUEST_BODY: usize = 10 * 1024 * 1024;

static HOP_BY_HOP: [HeaderName; 8] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// 逐跳头，不转发也不缓存
pub fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(name)
}

/// 转发请求到路由解析出的目标地址，响应 body 以流的方式返回
pub async fn forward(
    State(client): State<reqwest::Client>,
    req: Request,
) -> Result<Response, GatewayError> {
    let target = req
        .extensions()
        .get::<ResolvedTarget>()
        .cloned()
        .ok_or_else(|| GatewayError::UpstreamUnavailable("no route target resolved".into()))?;

    let (parts, body) = req.into_parts();
    let body = to_bytes(body, MAX_REQUEST_BODY).await.map_err(|e| {
        warn!("Failed to read request body for route {}: {}", target.route_id, e);
        GatewayError::BadRequest("request body could not be read".into())
    })?;

    let mut upstream_req = client.request(parts.method, target.url.clone());
    for (name, value) in &parts.headers {
        if is_hop_by_hop(name) || name == header::HOST || name == header::CONTENT_LENGTH {
            continue;
        }
        upstream_req = upstream_req.header(name, value);
    }

    let upstream = upstream_req.body(body).send().await.map_err(|e| {
        warn!("Upstream request to {} failed: {}", target.url, e);
        GatewayError::UpstreamUnavailable(format!("upstream {} unavailable", target.route_id))
    })?;

    let mut response = Response::builder().status(upstream.status());
    if let Some(headers) = response.headers_mut() {
        for (name, value) in upstream.headers() {
            if !is_hop_by_hop(name) {
                headers.append(name, value.clone());
            }
        }
    }

    response
        .body(Body::from_stream(upstream.bytes_stream()))
        .map_err(|e| GatewayError::UpstreamUnavailable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_headers() {
        assert!(is_hop_by_hop(&header::TRANSFER_ENCODING));
        assert!(is_hop_by_hop(&HeaderName::from_static("keep-alive")));
        assert!(!is_hop_by_hop(&header::CONTENT_TYPE));
        assert!(!is_hop_by_hop(&header::CONTENT_LENGTH));
    }
}
