use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use super::{CacheStore, CounterStore, StoreError};

#[derive(Debug, Clone)]
enum Value {
    Counter(i64),
    Text(String),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// 进程内存储，用于本地开发和测试。
///
/// 语义与 Redis 保持一致：INCR 原子自增、EXPIRE 只对已存在的键生效、
/// 过期的键在下一次访问时被清除。时间使用 tokio 时钟，测试可以暂停/快进。
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_live_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>, Instant) -> T,
    ) -> Result<T, StoreError> {
        let now = Instant::now();
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store poisoned".into()))?;
        entries.retain(|_, entry| !entry.is_expired(now));
        Ok(f(&mut entries, now))
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment_and_get(&self, key: &str) -> Result<i64, StoreError> {
        self.with_live_entries(|entries, _| {
            let entry = entries.entry(key.to_string()).or_insert(Entry {
                value: Value::Counter(0),
                expires_at: None,
            });
            match &mut entry.value {
                Value::Counter(count) => {
                    *count += 1;
                    Ok(*count)
                }
                Value::Text(_) => Err(StoreError::WrongType(key.to_string())),
            }
        })?
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, StoreError> {
        self.with_live_entries(|entries, now| match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Some(now + Duration::from_secs(seconds));
                true
            }
            None => false,
        })
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.with_live_entries(|entries, now| {
            entries.get(key).map(|entry| match entry.expires_at {
                // 与 Redis TTL 一致，向上取整到秒
                Some(at) => {
                    let left = at.saturating_duration_since(now);
                    let secs = left.as_secs() + u64::from(left.subsec_nanos() > 0);
                    secs as i64
                }
                None => -1,
            })
        })
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.with_live_entries(|entries, _| match entries.get(key) {
            Some(Entry {
                value: Value::Text(text),
                ..
            }) => Ok(Some(text.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
            None => Ok(None),
        })?
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, StoreError> {
        self.with_live_entries(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(value.to_string()),
                    expires_at: Some(now + Duration::from_secs(ttl_seconds)),
                },
            );
            true
        })
    }
}
