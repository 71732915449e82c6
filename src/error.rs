use axum::Json;
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// 网关直接返回给客户端的错误，统一输出结构化 JSON
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    MissingIdentity {
        status: u16,
        code: String,
        message: String,
    },
    RateLimitExceeded {
        status: u16,
        code: String,
        message: String,
        key: String,
        retry_after_seconds: u64,
    },
    /// 仅在 failClosed 策略下出现
    StoreUnavailable {
        status: u16,
        code: String,
        message: String,
    },
    UpstreamUnavailable(String),
    BadRequest(String),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectionBody<'a> {
    pub code: &'a str,
    pub message: &'a str,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<u64>,
}

impl GatewayError {
    fn body(&self) -> RejectionBody<'_> {
        match self {
            GatewayError::MissingIdentity {
                status,
                code,
                message,
            }
            | GatewayError::StoreUnavailable {
                status,
                code,
                message,
            } => RejectionBody {
                code: code.as_str(),
                message: message.as_str(),
                status: *status,
                key: None,
                retry_after_seconds: None,
            },
            GatewayError::RateLimitExceeded {
                status,
                code,
                message,
                key,
                retry_after_seconds,
            } => RejectionBody {
                code: code.as_str(),
                message: message.as_str(),
                status: *status,
                key: Some(key.as_str()),
                retry_after_seconds: Some(*retry_after_seconds),
            },
            GatewayError::BadRequest(message) => RejectionBody {
                code: "BAD_REQUEST",
                message: message.as_str(),
                status: StatusCode::BAD_REQUEST.as_u16(),
                key: None,
                retry_after_seconds: None,
            },
            GatewayError::UpstreamUnavailable(message) => RejectionBody {
                code: "BAD_GATEWAY",
                message: message.as_str(),
                status: StatusCode::BAD_GATEWAY.as_u16(),
                key: None,
                retry_after_seconds: None,
            },
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = self.body();
        let status =
            StatusCode::from_u16(body.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(&body)).into_response();

        if let GatewayError::RateLimitExceeded {
            retry_after_seconds,
            ..
        } = &self
        {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_seconds));
        }
        response
    }
}
