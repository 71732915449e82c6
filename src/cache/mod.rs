// 响应缓存
// 缓存键、存储格式以及响应 body 的旁路聚合

pub mod entry;
pub mod keys;
pub mod tap;

pub use entry::{CacheEntry, CacheEntryError, X_CACHE};
pub use keys::{CacheKeyParts, response_cache_key};
pub use tap::{AggregationBuffer, BodyTap};
