// 存储模块
// 限流计数器和响应缓存共用的键值存储能力

mod memory;
mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("wrong value type at key {0}")]
    WrongType(String),
}

/// 原子计数器，限流使用
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// 自增并返回自增后的值，键不存在时从 0 开始
    async fn increment_and_get(&self, key: &str) -> Result<i64, StoreError>;

    /// 设置过期时间（秒），键存在时返回 true
    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, StoreError>;

    /// 剩余过期秒数；键不存在返回 None，没有过期时间时返回负数
    async fn remaining_ttl(&self, key: &str) -> Result<Option<i64>, StoreError>;
}

/// 响应缓存读写
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, StoreError>;
}
