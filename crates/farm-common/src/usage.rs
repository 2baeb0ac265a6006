use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::redis::RedisCache;

const USAGE_KEY: &str = "f2t:usage";

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct UsageStats {
    pub models: Vec<ModelUsageStats>,
    /// Failed generations keyed by failure kind (`credentials`, `rate_limited`, `other`).
    pub failures: HashMap<String, u64>,
    /// Requests ranked without a query embedding.
    pub embedding_fallbacks: u64,
    pub redis_available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ModelUsageStats {
    pub model: String,
    pub requests: u64,
}

/// Redis-backed counters for assistant traffic. Losing Redis loses the counters, nothing else.
#[derive(Clone)]
pub struct UsageTracker {
    redis: RedisCache,
}

impl UsageTracker {
    pub fn new(redis: RedisCache) -> Self {
        Self { redis }
    }

    pub async fn record_generation(&self, model: &str) {
        let _ = self
            .redis
            .hincr_by(USAGE_KEY, &format!("requests:{model}"), 1)
            .await;
    }

    pub async fn record_failure(&self, kind: &str) {
        let _ = self
            .redis
            .hincr_by(USAGE_KEY, &format!("failures:{kind}"), 1)
            .await;
    }

    pub async fn record_embedding_fallback(&self) {
        let _ = self.redis.hincr_by(USAGE_KEY, "embedding_fallbacks", 1).await;
    }

    pub async fn get_usage_stats(&self) -> UsageStats {
        let redis_available = self.redis.is_available().await;
        let Some(entries) = self.redis.hgetall(USAGE_KEY).await else {
            return UsageStats {
                redis_available,
                ..UsageStats::default()
            };
        };
        let mut stats = aggregate(entries);
        stats.redis_available = redis_available;
        stats
    }
}

fn aggregate(entries: HashMap<String, String>) -> UsageStats {
    let mut stats = UsageStats::default();
    for (field, value) in entries {
        let parsed = value.parse::<u64>().unwrap_or(0);
        if field == "embedding_fallbacks" {
            stats.embedding_fallbacks = parsed;
            continue;
        }
        let Some((kind, name)) = field.split_once(':') else {
            continue;
        };
        match kind {
            "requests" => stats.models.push(ModelUsageStats {
                model: name.to_string(),
                requests: parsed,
            }),
            "failures" => {
                stats.failures.insert(name.to_string(), parsed);
            }
            _ => {}
        }
    }
    stats.models.sort_by(|a, b| a.model.cmp(&b.model));
    stats
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_hash_fields() {
        let entries: HashMap<String, String> = [
            ("requests:gemini-2.0-flash-exp", "7"),
            ("requests:gemini-1.5-pro", "2"),
            ("failures:rate_limited", "3"),
            ("embedding_fallbacks", "4"),
            ("garbage", "x"),
            ("unknown:thing", "1"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let stats = aggregate(entries);
        assert_eq!(stats.models.len(), 2);
        assert_eq!(stats.models[0].model, "gemini-1.5-pro");
        assert_eq!(stats.models[1].requests, 7);
        assert_eq!(stats.failures.get("rate_limited"), Some(&3));
        assert_eq!(stats.embedding_fallbacks, 4);
    }

    #[tokio::test]
    async fn stats_without_redis_are_empty() {
        let tracker = UsageTracker::new(RedisCache::disabled());
        tracker.record_generation("m").await;
        let stats = tracker.get_usage_stats().await;
        assert!(!stats.redis_available);
        assert!(stats.models.is_empty());
    }
}
