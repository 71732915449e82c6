use async_trait::async_trait;
use redis::{AsyncCommands, aio::ConnectionManager};

use super::{CacheStore, CounterStore, StoreError};

/// Redis 实现，内部使用自动重连的 ConnectionManager
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(client: redis::Client) -> Result<Self, StoreError> {
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn increment_and_get(&self, key: &str) -> Result<i64, StoreError> {
        let mut conn = self.conn.clone();
        let count: i64 = conn.incr(key, 1).await?;
        Ok(count)
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let applied: bool = conn.expire(key, seconds as i64).await?;
        Ok(applied)
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let mut conn = self.conn.clone();
        // -2: 键不存在, -1: 没有过期时间
        let ttl: i64 = conn.ttl(key).await?;
        Ok(if ttl == -2 { None } else { Some(ttl) })
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl_seconds).await?;
        Ok(true)
    }
}
