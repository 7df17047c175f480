//! Background job queue.
//!
//! The async boundary for batch work: commands enqueue fire-and-forget
//! payloads onto a Redis list, and `coko-admin worker` (a separate process)
//! drains it. Enqueue failure surfaces to the caller; per-job failures in
//! the worker are logged and the loop continues.

use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{TrendPeriod, TrendType};
use crate::services::similarity::{MatrixBuildOptions, MatrixBuilder};
use crate::services::trending::TrendingService;
use crate::services::vectors::FeatureVectorStore;

const QUEUE_KEY: &str = "coko:jobs:recommendation";
/// BLPOP timeout; the worker wakes this often to log liveness.
const POP_TIMEOUT_SECS: usize = 30;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobPayload {
    RefreshVector {
        book_id: Uuid,
    },
    RebuildSimilarity {
        threshold: f32,
        batch_size: usize,
        book_ids: Option<Vec<Uuid>>,
        clean_old: bool,
        update_vectors: bool,
    },
    UpdateTrending {
        period: TrendPeriod,
        trend_type: TrendType,
        limit: usize,
        min_interactions: i64,
    },
}

#[derive(Clone)]
pub struct JobQueue {
    manager: ConnectionManager,
}

impl JobQueue {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| AppError::QueueUnavailable(format!("Redis client error: {}", e)))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| AppError::QueueUnavailable(format!("Redis connection error: {}", e)))?;
        Ok(Self { manager })
    }

    /// Fire-and-forget enqueue. Queue unavailability is the caller's
    /// problem (a command surfaces it as a non-zero exit).
    pub async fn enqueue(&self, payload: &JobPayload) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        redis::cmd("RPUSH")
            .arg(QUEUE_KEY)
            .arg(json)
            .query_async::<_, ()>(&mut self.manager.clone())
            .await
            .map_err(|e| AppError::QueueUnavailable(format!("Enqueue failed: {}", e)))?;
        Ok(())
    }

    /// Blocking pop; returns `None` on timeout.
    pub async fn pop(&self) -> Result<Option<JobPayload>> {
        let value: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(QUEUE_KEY)
            .arg(POP_TIMEOUT_SECS)
            .query_async(&mut self.manager.clone())
            .await?;
        match value {
            Some((_, json)) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn depth(&self) -> Result<i64> {
        let depth: i64 = redis::cmd("LLEN")
            .arg(QUEUE_KEY)
            .query_async(&mut self.manager.clone())
            .await?;
        Ok(depth)
    }
}

/// Drains the queue and dispatches each payload to the owning service.
pub struct JobWorker {
    queue: JobQueue,
    vectors: Arc<FeatureVectorStore>,
    matrix: Arc<MatrixBuilder>,
    trending: Arc<TrendingService>,
    staleness_days: i64,
}

impl JobWorker {
    pub fn new(
        queue: JobQueue,
        vectors: Arc<FeatureVectorStore>,
        matrix: Arc<MatrixBuilder>,
        trending: Arc<TrendingService>,
        staleness_days: i64,
    ) -> Self {
        Self {
            queue,
            vectors,
            matrix,
            trending,
            staleness_days,
        }
    }

    /// Worker loop. A failing job is logged and dropped; the loop never
    /// exits on job errors.
    pub async fn run(&self) -> Result<()> {
        info!("Job worker started");
        loop {
            match self.queue.pop().await {
                Ok(Some(payload)) => {
                    info!(job = ?payload_kind(&payload), "Processing job");
                    if let Err(err) = self.handle(&payload).await {
                        error!(job = ?payload_kind(&payload), error = %err, "Job failed");
                    }
                }
                Ok(None) => {
                    // Timeout tick; nothing queued.
                }
                Err(err) => {
                    error!(error = %err, "Queue pop failed, retrying");
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn handle(&self, payload: &JobPayload) -> Result<()> {
        match payload {
            JobPayload::RefreshVector { book_id } => {
                self.vectors.refresh_vector(*book_id).await?;
            }
            JobPayload::RebuildSimilarity {
                threshold,
                batch_size,
                book_ids,
                clean_old,
                update_vectors,
            } => {
                if *update_vectors {
                    self.vectors.refresh_all(book_ids.clone()).await?;
                }
                self.matrix
                    .rebuild(&MatrixBuildOptions {
                        threshold: *threshold,
                        batch_size: *batch_size,
                        book_ids: book_ids.clone(),
                        dry_run: false,
                    })
                    .await?;
                if *clean_old {
                    self.matrix.purge_stale(self.staleness_days).await?;
                }
            }
            JobPayload::UpdateTrending {
                period,
                trend_type,
                limit,
                min_interactions,
            } => {
                self.trending
                    .update(*period, *trend_type, *limit, *min_interactions, false)
                    .await?;
            }
        }
        Ok(())
    }
}

fn payload_kind(payload: &JobPayload) -> &'static str {
    match payload {
        JobPayload::RefreshVector { .. } => "refresh_vector",
        JobPayload::RebuildSimilarity { .. } => "rebuild_similarity",
        JobPayload::UpdateTrending { .. } => "update_trending",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_roundtrip() {
        let payload = JobPayload::RebuildSimilarity {
            threshold: 0.1,
            batch_size: 100,
            book_ids: Some(vec![Uuid::new_v4()]),
            clean_old: true,
            update_vectors: false,
        };
        let json = serde_json::to_string(&payload).unwrap();
        let parsed: JobPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_payload_tag_is_stable() {
        let payload = JobPayload::RefreshVector {
            book_id: Uuid::new_v4(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"type\":\"refresh_vector\""));
    }
}
