//! Read-through cache layer. Entries live until explicitly busted through
//! the key registry in [`keys`].

use std::future::Future;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

pub mod keys;
mod memory;
mod redis;

pub use self::redis::RedisCache;
pub use memory::MemoryCache;

/// Key-value side table consumed by the stores. No TTL semantics; entries
/// are removed only by explicit busts.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String) -> Result<()>;
    async fn delete_many(&self, keys: &[String]) -> Result<()>;
}

/// Read-through lookup: a cache hit wins, otherwise `fetch` runs against
/// the store and the entry is populated. The cache is best effort on the
/// read path, so get/set failures count as misses and are only logged.
pub async fn read_through<T, F, Fut>(cache: &dyn Cache, key: &str, fetch: F) -> Result<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match cache.get(key).await {
        Ok(Some(raw)) => {
            if let Ok(value) = serde_json::from_str(&raw) {
                return Ok(value);
            }
            tracing::warn!(key, "discarding undecodable cache entry");
        }
        Ok(None) => {}
        Err(err) => tracing::warn!(key, %err, "cache read failed, falling back to store"),
    }

    let value = fetch().await?;
    match serde_json::to_string(&value) {
        Ok(raw) => {
            if let Err(err) = cache.set(key, raw).await {
                tracing::warn!(key, %err, "failed to populate cache entry");
            }
        }
        Err(err) => tracing::warn!(key, %err, "failed to encode cache entry"),
    }
    Ok(value)
}
