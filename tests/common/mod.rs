#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{Body, to_bytes},
    http::Request,
    response::Response,
};
use gateway::store::{CacheStore, CounterStore, MemoryStore, StoreError};

/// 记录调用次数的存储，内部委托给 MemoryStore
#[derive(Clone, Default)]
pub struct RecordingStore {
    pub inner: MemoryStore,
    gets: Arc<AtomicUsize>,
    sets: Arc<AtomicUsize>,
    increments: Arc<AtomicUsize>,
}

impl RecordingStore {
    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn increments(&self) -> usize {
        self.increments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CounterStore for RecordingStore {
    async fn increment_and_get(&self, key: &str) -> Result<i64, StoreError> {
        self.increments.fetch_add(1, Ordering::SeqCst);
        self.inner.increment_and_get(key).await
    }

    async fn expire(&self, key: &str, seconds: u64) -> Result<bool, StoreError> {
        self.inner.expire(key, seconds).await
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<i64>, StoreError> {
        self.inner.remaining_ttl(key).await
    }
}

#[async_trait]
impl CacheStore for RecordingStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<bool, StoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.inner.set(key, value, ttl_seconds).await
    }
}

/// 所有操作都失败的存储
#[derive(Clone, Default)]
pub struct FailingStore;

fn down() -> StoreError {
    StoreError::Unavailable("connection refused".into())
}

#[async_trait]
impl CounterStore for FailingStore {
    async fn increment_and_get(&self, _key: &str) -> Result<i64, StoreError> {
        Err(down())
    }

    async fn expire(&self, _key: &str, _seconds: u64) -> Result<bool, StoreError> {
        Err(down())
    }

    async fn remaining_ttl(&self, _key: &str) -> Result<Option<i64>, StoreError> {
        Err(down())
    }
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(down())
    }

    async fn set(&self, _key: &str, _value: &str, _ttl_seconds: u64) -> Result<bool, StoreError> {
        Err(down())
    }
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_as(uri: &str, identity: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("x-real-ip", identity)
        .body(Body::empty())
        .unwrap()
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// 等待后台写缓存任务完成
pub async fn wait_for_sets(store: &RecordingStore, expected: usize) {
    for _ in 0..200 {
        if store.sets() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("expected {} cache writes, saw {}", expected, store.sets());
}

/// 让已经 spawn 的任务有机会执行
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
