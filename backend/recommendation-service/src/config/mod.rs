use anyhow::{Context, Result};
use std::env;

/// Service configuration, built once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub recommendation: RecommendationConfig,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub port: u16,
    pub service_name: String,
    /// Primary UI language, used for the vector language-match flag.
    pub primary_language: String,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct RecommendationConfig {
    /// Minimum pairwise similarity persisted to the matrix.
    pub similarity_threshold: f32,
    /// Source books per rebuild transaction batch.
    pub similarity_batch_size: usize,
    /// Days before similarity rows are considered stale.
    pub similarity_staleness_days: i64,
    /// Days a recommendation set is retained before cleanup.
    pub set_retention_days: i64,
    /// Hybrid blend weights.
    pub hybrid_content_weight: f32,
    pub hybrid_collaborative_weight: f32,
    pub hybrid_popularity_weight: f32,
    /// Recommendation stats cache TTL (seconds).
    pub stats_cache_ttl: u64,
    /// Book view counter cache TTL (seconds).
    pub view_counter_ttl: u64,
}

fn var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = var_or(key, default);
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("{} must be valid ({}): {}", key, raw, e))
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            app: AppConfig {
                env: var_or("APP_ENV", "development"),
                port: parse_var("HTTP_PORT", "8014")?,
                service_name: var_or("SERVICE_NAME", "recommendation-service"),
                primary_language: var_or("PRIMARY_LANGUAGE", "en"),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .context("DATABASE_URL must be set")?,
                max_connections: parse_var("DATABASE_MAX_CONNECTIONS", "10")?,
            },
            redis: RedisConfig {
                url: var_or("REDIS_URL", "redis://localhost:6379"),
            },
            recommendation: RecommendationConfig::from_env()?,
        })
    }
}

impl RecommendationConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            similarity_threshold: parse_var("SIMILARITY_THRESHOLD", "0.1")?,
            similarity_batch_size: parse_var("SIMILARITY_BATCH_SIZE", "100")?,
            similarity_staleness_days: parse_var("SIMILARITY_STALENESS_DAYS", "7")?,
            set_retention_days: parse_var("SET_RETENTION_DAYS", "90")?,
            hybrid_content_weight: parse_var("HYBRID_CONTENT_WEIGHT", "0.5")?,
            hybrid_collaborative_weight: parse_var("HYBRID_COLLABORATIVE_WEIGHT", "0.3")?,
            hybrid_popularity_weight: parse_var("HYBRID_POPULARITY_WEIGHT", "0.2")?,
            stats_cache_ttl: parse_var("STATS_CACHE_TTL_SECONDS", "3600")?,
            view_counter_ttl: parse_var("VIEW_COUNTER_TTL_SECONDS", "300")?,
        })
    }
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.1,
            similarity_batch_size: 100,
            similarity_staleness_days: 7,
            set_retention_days: 90,
            hybrid_content_weight: 0.5,
            hybrid_collaborative_weight: 0.3,
            hybrid_popularity_weight: 0.2,
            stats_cache_ttl: 3600,
            view_counter_ttl: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_recommendation_config() {
        let config = RecommendationConfig::default();
        assert_eq!(config.similarity_threshold, 0.1);
        assert_eq!(config.similarity_staleness_days, 7);
        let total = config.hybrid_content_weight
            + config.hybrid_collaborative_weight
            + config.hybrid_popularity_weight;
        assert!((total - 1.0).abs() < f32::EPSILON);
    }
}
