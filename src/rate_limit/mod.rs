// 固定窗口限流
// 计数器保存在外部存储中，本进程不保存跨请求状态

use std::sync::Arc;

use crate::identity::ClientIdentity;
use crate::store::{CounterStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub count: u64,
    pub remaining: u64,
    pub allowed: bool,
    pub retry_after_seconds: u64,
}

#[derive(Clone)]
pub struct FixedWindowRateLimiter {
    store: Arc<dyn CounterStore>,
    namespace: String,
}

impl FixedWindowRateLimiter {
    pub fn new(store: Arc<dyn CounterStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    pub fn key_for(&self, identity: &ClientIdentity) -> String {
        format!("{}:{}", self.namespace, identity)
    }

    /// 计数 +1；只有第一次命中（计数为 1）时设置窗口过期时间，之后不再刷新
    pub async fn check(
        &self,
        identity: &ClientIdentity,
        limit: u64,
        window_seconds: u64,
    ) -> Result<RateLimitDecision, StoreError> {
        let key = self.key_for(identity);

        let count = self.store.increment_and_get(&key).await?.max(0) as u64;
        if count == 1 {
            self.store.expire(&key, window_seconds).await?;
        }

        let remaining = limit.saturating_sub(count);
        if count > limit {
            let retry_after_seconds = match self.store.remaining_ttl(&key).await? {
                // 首次 EXPIRE 丢失时计数器没有过期时间，补设一次，否则该身份永远被拒绝
                Some(ttl) if ttl < 0 => {
                    self.store.expire(&key, window_seconds).await?;
                    window_seconds
                }
                Some(ttl) => ttl as u64,
                None => 0,
            };
            return Ok(RateLimitDecision {
                count,
                remaining,
                allowed: false,
                retry_after_seconds,
            });
        }

        Ok(RateLimitDecision {
            count,
            remaining,
            allowed: true,
            retry_after_seconds: 0,
        })
    }
}
