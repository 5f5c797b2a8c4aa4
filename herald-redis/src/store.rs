//! Shared store client.

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use std::collections::HashMap;
use std::time::Duration;
use tracing::info;

use crate::{RedisConfig, Result, StoreError};

/// Shared store client.
///
/// Wraps one multiplexed, auto-reconnecting connection. Clones share the
/// underlying connection, so a single `Store` can be handed to the
/// producer, the queue, and every worker loop at once. The manager retries
/// commands internally and performs no readiness probe, which is what the
/// job queue requires of its client.
#[derive(Clone)]
pub struct Store {
    conn: ConnectionManager,
    config: RedisConfig,
}

impl Store {
    /// Connect to the store.
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.connection_url())
            .map_err(|e| StoreError::Config(e.to_string()))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(config.connection_timeout)
            .set_response_timeout(config.command_timeout);

        let conn = ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        info!(component = "store", url = %config.url, "store connection established");

        Ok(Self { conn, config })
    }

    /// Get the configuration.
    pub fn config(&self) -> &RedisConfig {
        &self.config
    }

    /// Check that the connection answers PING.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    // String keys

    /// Get a string key.
    pub async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    /// Set a string key.
    pub async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    /// Set a string key with a TTL.
    pub async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    /// Delete a key.
    pub async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: u32 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    /// Check if a key exists.
    pub async fn exists(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.exists(key).await?;
        Ok(exists)
    }

    // Counter hashes

    /// Atomically increment one hash field.
    pub async fn hincr(&self, key: &str, field: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.hincr(key, field, delta).await?;
        Ok(value)
    }

    /// Atomically increment several hash fields in one round trip.
    ///
    /// All increments are applied inside a MULTI/EXEC pipeline, so
    /// concurrent readers observe either none or all of them.
    pub async fn hincr_many(&self, key: &str, increments: &[(String, i64)]) -> Result<()> {
        if increments.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (field, delta) in increments {
            pipe.hincr(key, field, *delta).ignore();
        }
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    /// Read an entire hash of numeric counters.
    pub async fn hgetall_counts(&self, key: &str) -> Result<HashMap<String, u64>> {
        let mut conn = self.conn.clone();
        let counts: HashMap<String, u64> = conn.hgetall(key).await?;
        Ok(counts)
    }

    // Sorted sets and sequences (used by the job queue)

    /// Increment a sequence counter.
    pub async fn incr(&self, key: &str, delta: i64) -> Result<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = conn.incr(key, delta).await?;
        Ok(value)
    }

    /// Add a member to a sorted set.
    pub async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.zadd(key, member, score).await?;
        Ok(())
    }

    /// Remove a member from a sorted set.
    pub async fn zrem(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let removed: u32 = conn.zrem(key, member).await?;
        Ok(removed > 0)
    }

    /// Sorted set cardinality.
    pub async fn zcard(&self, key: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let count: u64 = conn.zcard(key).await?;
        Ok(count)
    }

    /// Pop the lowest-scored member of a sorted set.
    pub async fn zpopmin(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        // ZPOPMIN returns a flat [member, score] bulk
        let items: Vec<String> = conn.zpopmin(key, 1).await?;
        Ok(items.into_iter().next())
    }

    /// Members of a sorted set with scores up to `max`.
    pub async fn zrangebyscore_upto(&self, key: &str, max: f64) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.zrangebyscore(key, "-inf", max).await?;
        Ok(members)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").field("url", &self.config.url).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_string_round_trip() {
        let store = Store::connect(RedisConfig::default()).await.unwrap();

        store.set("herald:test:key", "value").await.unwrap();
        assert_eq!(
            store.get("herald:test:key").await.unwrap().as_deref(),
            Some("value")
        );

        assert!(store.delete("herald:test:key").await.unwrap());
        assert_eq!(store.get("herald:test:key").await.unwrap(), None);
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_counter_pipeline() {
        let store = Store::connect(RedisConfig::default()).await.unwrap();
        store.delete("herald:test:stats").await.unwrap();

        store
            .hincr_many(
                "herald:test:stats",
                &[
                    ("success".to_string(), 2),
                    ("error:MISSING_SUBJECT".to_string(), 1),
                ],
            )
            .await
            .unwrap();

        let counts = store.hgetall_counts("herald:test:stats").await.unwrap();
        assert_eq!(counts.get("success"), Some(&2));
        assert_eq!(counts.get("error:MISSING_SUBJECT"), Some(&1));

        store.delete("herald:test:stats").await.unwrap();
    }

    #[tokio::test]
    #[ignore = "requires Redis"]
    async fn test_sorted_set_fifo() {
        let store = Store::connect(RedisConfig::default()).await.unwrap();
        store.delete("herald:test:zset").await.unwrap();

        store.zadd("herald:test:zset", "first", 1.0).await.unwrap();
        store.zadd("herald:test:zset", "second", 2.0).await.unwrap();

        assert_eq!(store.zcard("herald:test:zset").await.unwrap(), 2);
        assert_eq!(
            store.zpopmin("herald:test:zset").await.unwrap().as_deref(),
            Some("first")
        );

        store.delete("herald:test:zset").await.unwrap();
    }
}
