//! Redis-based caching layer for recommendation data.
//!
//! Two tiers, both best-effort and safe to lose:
//! - recommendation stats per user — TTL ~1 hour
//! - book view counters — TTL ~5 minutes
//!
//! Cache keys:
//! - `coko:rec:stats:{user_id}` → serialized stats payload
//! - `coko:rec:views:{book_id}` → integer counter

use redis::aio::ConnectionManager;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::RecommendationConfig;
use crate::error::{AppError, Result};

const KEY_PREFIX: &str = "coko:rec:";

#[derive(Clone)]
pub struct RecommendationCache {
    manager: ConnectionManager,
    stats_ttl: u64,
    view_counter_ttl: u64,
}

impl RecommendationCache {
    pub async fn new(redis_url: &str, config: &RecommendationConfig) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::Internal(format!("Failed to create Redis client: {}", e)))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to connect to Redis: {}", e)))?;
        Ok(Self {
            manager,
            stats_ttl: config.stats_cache_ttl,
            view_counter_ttl: config.view_counter_ttl,
        })
    }

    fn stats_key(user_id: Uuid) -> String {
        format!("{}stats:{}", KEY_PREFIX, user_id)
    }

    fn views_key(book_id: Uuid) -> String {
        format!("{}views:{}", KEY_PREFIX, book_id)
    }

    pub async fn get_stats<T: DeserializeOwned>(&self, user_id: Uuid) -> Result<Option<T>> {
        let key = Self::stats_key(user_id);
        let value: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut self.manager.clone())
            .await?;
        match value {
            Some(json) => {
                debug!(key = %key, "Stats cache hit");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    pub async fn set_stats<T: Serialize>(&self, user_id: Uuid, stats: &T) -> Result<()> {
        let key = Self::stats_key(user_id);
        let json = serde_json::to_string(stats)?;
        redis::cmd("SETEX")
            .arg(&key)
            .arg(self.stats_ttl)
            .arg(json)
            .query_async::<_, ()>(&mut self.manager.clone())
            .await?;
        Ok(())
    }

    pub async fn invalidate_user(&self, user_id: Uuid) -> Result<()> {
        redis::cmd("DEL")
            .arg(Self::stats_key(user_id))
            .query_async::<_, ()>(&mut self.manager.clone())
            .await?;
        Ok(())
    }

    /// Increment the short-lived view counter for a book. Best-effort.
    pub async fn bump_view_counter(&self, book_id: Uuid) -> Result<i64> {
        let key = Self::views_key(book_id);
        let count: i64 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut self.manager.clone())
            .await?;
        redis::cmd("EXPIRE")
            .arg(&key)
            .arg(self.view_counter_ttl)
            .query_async::<_, ()>(&mut self.manager.clone())
            .await?;
        Ok(count)
    }

    pub async fn get_view_counter(&self, book_id: Uuid) -> Result<i64> {
        let value: Option<i64> = redis::cmd("GET")
            .arg(Self::views_key(book_id))
            .query_async(&mut self.manager.clone())
            .await?;
        Ok(value.unwrap_or(0))
    }

    /// Drop every key under this service's prefix (admin cleanup).
    pub async fn clear_all(&self) -> Result<u64> {
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(format!("{}*", KEY_PREFIX))
            .query_async(&mut self.manager.clone())
            .await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let count = keys.len() as u64;
        let mut cmd = redis::cmd("DEL");
        for key in &keys {
            cmd.arg(key);
        }
        if let Err(err) = cmd.query_async::<_, ()>(&mut self.manager.clone()).await {
            warn!(error = %err, "Cache clear failed");
            return Err(err.into());
        }
        Ok(count)
    }
}
