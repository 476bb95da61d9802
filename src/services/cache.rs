use anyhow::Result;
use moka::{future::Cache, Expiry};
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Upper bound for any entry held in memory.
const MEMORY_MAX_TTL: Duration = Duration::from_secs(24 * 3600);

/// In-memory counters outlive a daily key by a day.
const COUNTER_TTL: Duration = Duration::from_secs(48 * 3600);

#[derive(Clone)]
struct MemoryEntry {
    json: String,
    ttl: Duration,
}

/// Expires each entry after the TTL it was stored with.
struct EntryTtl;

impl Expiry<String, MemoryEntry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &MemoryEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

pub struct CacheService {
    redis: Option<redis::aio::ConnectionManager>,
    memory: Arc<Cache<String, MemoryEntry>>,
    counters: Cache<String, i64>,
}

impl CacheService {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let redis = match redis::Client::open(redis_url) {
            Ok(client) => match client.get_connection_manager().await {
                Ok(conn) => {
                    tracing::info!("Redis connected successfully");
                    Some(conn)
                }
                Err(e) => {
                    tracing::warn!("Redis connection failed: {}, using memory cache only", e);
                    None
                }
            },
            Err(e) => {
                tracing::warn!("Redis client creation failed: {}, using memory cache only", e);
                None
            }
        };

        Ok(Self::with_redis(redis))
    }

    pub fn memory_only() -> Self {
        Self::with_redis(None)
    }

    fn with_redis(redis: Option<redis::aio::ConnectionManager>) -> Self {
        let memory = Arc::new(
            Cache::builder()
                .max_capacity(10_000)
                .expire_after(EntryTtl)
                .build(),
        );
        let counters = Cache::builder()
            .max_capacity(1_000)
            .time_to_live(COUNTER_TTL)
            .build();

        Self {
            redis,
            memory,
            counters,
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        if let Some(cached) = self.memory.get(key).await {
            if let Ok(value) = serde_json::from_str(&cached.json) {
                tracing::debug!("Memory cache hit for key: {}", key);
                return Ok(Some(value));
            }
        }

        if let Some(mut redis) = self.redis.clone() {
            match redis.get::<_, Option<String>>(key).await {
                Ok(Some(cached)) => {
                    if let Ok(value) = serde_json::from_str(&cached) {
                        let ttl = match redis.ttl::<_, i64>(key).await {
                            Ok(secs) if secs > 0 => secs as u64,
                            _ => 1,
                        };
                        self.remember(key, cached, ttl).await;
                        tracing::debug!("Redis cache hit for key: {}", key);
                        return Ok(Some(value));
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Redis get error: {}", e),
            }
        }

        tracing::debug!("Cache miss for key: {}", key);
        Ok(None)
    }

    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> Result<()> {
        let serialized = serde_json::to_string(value)?;

        self.remember(key, serialized.clone(), ttl_secs).await;

        if let Some(mut redis) = self.redis.clone() {
            if let Err(e) = redis.set_ex::<_, _, ()>(key, serialized, ttl_secs).await {
                tracing::warn!("Redis set error: {}", e);
            } else {
                tracing::debug!("Cached key: {} with TTL: {}s", key, ttl_secs);
            }
        }

        Ok(())
    }

    pub async fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        if let Some(mut redis) = self.redis.clone() {
            match redis.incr(key, delta).await {
                Ok(value) => return Ok(value),
                Err(e) => tracing::warn!("Redis increment error: {}, counting in memory", e),
            }
        }

        let entry = self
            .counters
            .entry(key.to_string())
            .and_upsert_with(|current| {
                let next = current.map(|e| e.into_value()).unwrap_or(0) + delta;
                std::future::ready(next)
            })
            .await;
        Ok(entry.into_value())
    }

    pub async fn ping(&self) -> Result<bool> {
        if let Some(mut redis) = self.redis.clone() {
            match redis::cmd("PING").query_async::<_, String>(&mut redis).await {
                Ok(_) => Ok(true),
                Err(_) => Ok(false),
            }
        } else {
            Ok(false)
        }
    }

    async fn remember(&self, key: &str, json: String, ttl_secs: u64) {
        let ttl = Duration::from_secs(ttl_secs).min(MEMORY_MAX_TTL);
        if ttl.is_zero() {
            self.memory.invalidate(key).await;
            return;
        }
        self.memory
            .insert(key.to_string(), MemoryEntry { json, ttl })
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_round_trips_values() {
        let cache = CacheService::memory_only();
        cache.set("quote:USD_MONAD", &vec![1u32, 2, 3], 30).await.unwrap();

        let value: Option<Vec<u32>> = cache.get("quote:USD_MONAD").await.unwrap();
        assert_eq!(value, Some(vec![1, 2, 3]));

        let missing: Option<Vec<u32>> = cache.get("quote:EUR_MONAD").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn zero_ttl_entries_are_not_served() {
        let cache = CacheService::memory_only();
        cache.set("short", &"value", 0).await.unwrap();
        let value: Option<String> = cache.get("short").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn entries_expire_after_their_own_ttl() {
        let cache = CacheService::memory_only();
        cache.set("rate:USD_MONAD", &"2.0", 1).await.unwrap();
        cache.set("verification:abc", &"confirmed", 3600).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1_200)).await;

        let rate: Option<String> = cache.get("rate:USD_MONAD").await.unwrap();
        let verification: Option<String> = cache.get("verification:abc").await.unwrap();
        assert!(rate.is_none());
        assert_eq!(verification.as_deref(), Some("confirmed"));
    }

    #[tokio::test]
    async fn counters_work_without_redis() {
        let cache = CacheService::memory_only();
        assert_eq!(cache.increment("analytics:requests", 1).await.unwrap(), 1);
        assert_eq!(cache.increment("analytics:requests", 2).await.unwrap(), 3);
        assert_eq!(cache.increment("analytics:requests", 0).await.unwrap(), 3);
        assert!(!cache.ping().await.unwrap());
    }
}
