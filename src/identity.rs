use std::fmt;
use std::net::SocketAddr;

use axum::{
    extract::ConnectInfo,
    http::{HeaderMap, HeaderName, Request},
};

use crate::config::ConfigError;

const FORWARDED_FOR: &str = "x-forwarded-for";
const UNKNOWN: &str = "ip:unknown";

/// 请求方身份，每个请求只解析一次
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 前置阶段已经算好的身份，放在请求 extensions 里直接复用
#[derive(Debug, Clone)]
pub struct PrecomputedIdentity(pub String);

#[derive(Debug, Clone)]
pub struct IdentityResolver {
    trusted_header: HeaderName,
}

impl IdentityResolver {
    pub fn new(trusted_header: &str) -> Result<Self, ConfigError> {
        let trusted_header =
            HeaderName::from_bytes(trusted_header.as_bytes()).map_err(|_| {
                ConfigError::InvalidVar {
                    name: "IDENTITY_HEADER",
                    value: trusted_header.to_string(),
                }
            })?;
        Ok(Self { trusted_header })
    }

    pub fn trusted_header(&self) -> &HeaderName {
        &self.trusted_header
    }

    /// 请求是否携带了非空的可信身份头
    pub fn has_trusted_header(&self, headers: &HeaderMap) -> bool {
        header_value(headers, &self.trusted_header).is_some()
    }

    pub fn resolve_request<B>(&self, req: &Request<B>) -> ClientIdentity {
        let precomputed = req
            .extensions()
            .get::<PrecomputedIdentity>()
            .map(|p| p.0.as_str());
        let remote = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0);
        self.resolve(precomputed, req.headers(), remote)
    }

    /// 按优先级解析：预计算身份 > 可信头 > X-Forwarded-For 第一项 > 连接地址 > ip:unknown
    pub fn resolve(
        &self,
        precomputed: Option<&str>,
        headers: &HeaderMap,
        remote: Option<SocketAddr>,
    ) -> ClientIdentity {
        if let Some(id) = precomputed.filter(|s| !s.trim().is_empty()) {
            return ClientIdentity(id.to_string());
        }

        // 可信头的 "ip:" 兜底分支与这里读取同一个头，合并为一次检查
        if let Some(value) = header_value(headers, &self.trusted_header) {
            return ClientIdentity(value.to_lowercase());
        }

        if let Some(first) = headers
            .get(FORWARDED_FOR)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            return ClientIdentity(format!("ip:{}", first));
        }

        if let Some(addr) = remote {
            return ClientIdentity(format!("ip:{}", addr.ip()));
        }

        ClientIdentity(UNKNOWN.to_string())
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}
