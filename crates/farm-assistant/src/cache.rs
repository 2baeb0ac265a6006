/// Redis cache for query embeddings.
///
/// All operations degrade to misses when Redis is unavailable. Key schema (namespaced to
/// avoid collisions with other Farm2Table services):
/// - `f2t:v1:embedding:{sha256(message)}`: JSON-serialized `Vec<f32>` (TTL configurable)
use sha2::{Digest, Sha256};
use tracing::warn;

use farm_common::redis::RedisCache;

const KEY_PREFIX: &str = "f2t:v1:";

#[derive(Clone)]
pub struct EmbeddingCache {
    redis: RedisCache,
    ttl_secs: u64,
}

impl EmbeddingCache {
    pub fn new(redis: RedisCache, ttl_secs: u64) -> Self {
        Self { redis, ttl_secs }
    }

    pub fn disabled() -> Self {
        Self::new(RedisCache::disabled(), 0)
    }

    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        let key = embedding_key(text);
        let json = self.redis.get(&key).await?;
        serde_json::from_str::<Vec<f32>>(&json)
            .inspect_err(|e| warn!(error = %e, key, "cache deserialization failed"))
            .ok()
            .filter(|v| !v.is_empty())
    }

    pub async fn set(&self, text: &str, embedding: &[f32]) {
        if embedding.is_empty() || self.ttl_secs == 0 {
            return;
        }
        let key = embedding_key(text);
        if let Ok(json) = serde_json::to_string(embedding) {
            self.redis.set_with_ttl(&key, &json, self.ttl_secs).await;
        }
    }
}

/// Deterministic cache key for a message. Surrounding whitespace does not change the key.
fn embedding_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.trim().as_bytes());
    let hash = hasher.finalize();
    format!("{KEY_PREFIX}embedding:{:x}", hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced_and_stable() {
        let key = embedding_key("what is in season?");
        assert!(key.starts_with("f2t:v1:embedding:"));
        assert_eq!(key.len(), "f2t:v1:embedding:".len() + 64);
        assert_eq!(key, embedding_key("  what is in season?\n"));
        assert_ne!(key, embedding_key("what is in season"));
    }

    #[tokio::test]
    async fn disabled_cache_always_misses() {
        let cache = EmbeddingCache::disabled();
        cache.set("q", &[1.0]).await;
        assert_eq!(cache.get("q").await, None);
    }
}
