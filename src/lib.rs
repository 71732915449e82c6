use config::Config;
use std::sync::Arc;
use store::{CacheStore, CounterStore};

pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod middleware;
pub mod proxy;
pub mod rate_limit;
pub mod router;
pub mod store;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub counters: Arc<dyn CounterStore>,
    pub cache: Arc<dyn CacheStore>,
    pub http: reqwest::Client,
}
