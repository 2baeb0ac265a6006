/// Redis cache wrapper with graceful degradation.
///
/// All operations return `Option<T>` or `bool`: on any Redis error, the operation logs a
/// warning and reports a miss. Callers fall through to compute from source. Every service is
/// fully functional without Redis.
use std::collections::HashMap;

use redis::AsyncCommands;
use tracing::warn;

#[derive(Clone)]
pub struct RedisCache {
    client: Option<redis::Client>,
}

impl RedisCache {
    /// Attempt to create a client. If the URL is `None` or invalid, returns a `RedisCache`
    /// that always degrades gracefully (no-ops).
    pub fn new(url: Option<&str>) -> Self {
        let client = url.and_then(|u| {
            redis::Client::open(u)
                .inspect_err(|e| warn!(error = %e, url = u, "failed to create redis client, cache disabled"))
                .ok()
        });
        Self { client }
    }

    /// A cache that never connects. Used when no `REDIS_URL` is configured and in tests.
    pub fn disabled() -> Self {
        Self { client: None }
    }

    /// Test the connection by sending a PING. Returns `true` if Redis is reachable.
    pub async fn is_available(&self) -> bool {
        let Some(mut conn) = self.connection().await else {
            return false;
        };
        let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        result.is_ok()
    }

    async fn connection(&self) -> Option<redis::aio::MultiplexedConnection> {
        let client = self.client.as_ref()?;
        client
            .get_multiplexed_async_connection()
            .await
            .inspect_err(|e| warn!(error = %e, "redis connection failed"))
            .ok()
    }

    /// Get a value. Returns `None` if Redis is unavailable or the key doesn't exist.
    pub async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.connection().await?;
        conn.get::<_, Option<String>>(key)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis GET failed"))
            .ok()?
    }

    /// Set a value with a TTL in seconds. Returns `true` if successful.
    pub async fn set_with_ttl(&self, key: &str, value: &str, ttl_secs: u64) -> bool {
        let Some(mut conn) = self.connection().await else {
            return false;
        };
        conn.set_ex::<_, _, ()>(key, value, ttl_secs)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis SETEX failed"))
            .is_ok()
    }

    /// Increment a hash field. Returns `true` if successful.
    pub async fn hincr_by(&self, key: &str, field: &str, delta: i64) -> bool {
        let Some(mut conn) = self.connection().await else {
            return false;
        };
        conn.hincr::<_, _, _, i64>(key, field, delta)
            .await
            .inspect_err(|e| warn!(error = %e, key, field, "redis HINCRBY failed"))
            .is_ok()
    }

    /// Read a whole hash. Returns `None` if Redis is unavailable.
    pub async fn hgetall(&self, key: &str) -> Option<HashMap<String, String>> {
        let mut conn = self.connection().await?;
        conn.hgetall::<_, HashMap<String, String>>(key)
            .await
            .inspect_err(|e| warn!(error = %e, key, "redis HGETALL failed"))
            .ok()
    }
}
