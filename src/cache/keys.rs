use std::collections::BTreeMap;

use axum::http::Method;

use crate::identity::ClientIdentity;

/// 构成缓存键的请求要素
#[derive(Debug, Clone, Copy)]
pub struct CacheKeyParts<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub query: Option<&'a str>,
    /// 按身份分区缓存时才设置
    pub identity: Option<&'a ClientIdentity>,
    /// 路由解析后的目标路径
    pub target_path: Option<&'a str>,
}

/// 生成缓存键: `<ns>:<METHOD>|<path>|{a=1, b=2}|int=<id>|t=<target>`
///
/// 查询参数按名字排序，同名参数只取第一个值，所以参数顺序不影响结果。
pub fn response_cache_key(namespace: &str, parts: &CacheKeyParts<'_>) -> String {
    let mut key = format!("{}:{}|{}|", namespace, parts.method, parts.path);

    if let Some(query) = parts.query.filter(|q| !q.is_empty()) {
        key.push_str(&sorted_query(query));
    }

    if let Some(identity) = parts.identity {
        key.push_str("|int=");
        key.push_str(&identity.as_str().to_lowercase());
    }

    if let Some(target) = parts.target_path {
        key.push_str("|t=");
        key.push_str(target);
    }

    key
}

fn sorted_query(query: &str) -> String {
    let pairs: Vec<(String, String)> = match serde_urlencoded::from_str(query) {
        Ok(pairs) => pairs,
        // 无法解析时整体作为一个片段
        Err(_) => return query.to_string(),
    };
    if pairs.is_empty() {
        return String::new();
    }

    let mut params = BTreeMap::new();
    for (name, value) in pairs {
        params.entry(name).or_insert(value);
    }

    let joined = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{}}}", joined)
}
