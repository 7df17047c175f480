use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use tracing::error;
use uuid::Uuid;

use super::RecommendationStore;
use crate::error::{AppError, Result};
use crate::models::{Algorithm, Recommendation, RecommendationContext, RecommendationSet};

type SetRow = (Uuid, Uuid, String, String, f32, DateTime<Utc>);
type ItemRow = (Uuid, Uuid, Uuid, i32, f32, Vec<String>);

fn into_set(row: SetRow) -> Result<RecommendationSet> {
    let (id, user_id, algorithm, context, confidence_score, created_at) = row;
    Ok(RecommendationSet {
        id,
        user_id,
        algorithm: Algorithm::from_str(&algorithm)?,
        context: RecommendationContext::from_str(&context)?,
        confidence_score,
        created_at,
    })
}

fn into_item(row: ItemRow) -> Recommendation {
    let (id, set_id, book_id, rank, score, reasons) = row;
    Recommendation {
        id,
        set_id,
        book_id,
        rank,
        score,
        reasons,
    }
}

pub struct PgRecommendationStore {
    pool: PgPool,
}

impl PgRecommendationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RecommendationStore for PgRecommendationStore {
    async fn insert_set(&self, set: &RecommendationSet, items: &[Recommendation]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO recommendation_sets
                (id, user_id, algorithm, context, confidence_score, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(set.id)
        .bind(set.user_id)
        .bind(set.algorithm.as_str())
        .bind(set.context.as_str())
        .bind(set.confidence_score)
        .bind(set.created_at)
        .execute(&mut *tx)
        .await?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO recommendations (id, set_id, book_id, rank, score, reasons)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.id)
            .bind(item.set_id)
            .bind(item.book_id)
            .bind(item.rank)
            .bind(item.score)
            .bind(&item.reasons)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to persist recommendation set {}: {}", set.id, e);
            AppError::Database(e.to_string())
        })?;
        Ok(())
    }

    async fn recent_recommended_book_ids(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT r.book_id
            FROM recommendations r
            JOIN recommendation_sets s ON s.id = r.set_id
            WHERE s.user_id = $1 AND s.created_at >= $2
            "#,
        )
        .bind(user_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn sets_since(
        &self,
        since: DateTime<Utc>,
        algorithm: Option<Algorithm>,
        user_id: Option<Uuid>,
    ) -> Result<Vec<RecommendationSet>> {
        let rows = sqlx::query_as::<_, SetRow>(
            r#"
            SELECT id, user_id, algorithm, context, confidence_score, created_at
            FROM recommendation_sets
            WHERE created_at >= $1
              AND ($2::VARCHAR IS NULL OR algorithm = $2)
              AND ($3::UUID IS NULL OR user_id = $3)
            ORDER BY created_at DESC
            "#,
        )
        .bind(since)
        .bind(algorithm.map(|a| a.as_str()))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(into_set).collect()
    }

    async fn items_for_sets(&self, set_ids: &[Uuid]) -> Result<Vec<Recommendation>> {
        if set_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT id, set_id, book_id, rank, score, reasons
            FROM recommendations
            WHERE set_id = ANY($1)
            ORDER BY set_id, rank
            "#,
        )
        .bind(set_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(into_item).collect())
    }

    async fn count_sets_older_than(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM recommendation_sets WHERE created_at < $1")
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn purge_sets_older_than(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: i64,
    ) -> Result<u64> {
        // Items cascade with their set. Batched so no single transaction
        // grows unbounded.
        let mut total: u64 = 0;
        loop {
            let result = sqlx::query(
                r#"
                DELETE FROM recommendation_sets
                WHERE id IN (
                    SELECT id FROM recommendation_sets
                    WHERE created_at < $1
                    ORDER BY created_at ASC
                    LIMIT $2
                )
                "#,
            )
            .bind(cutoff)
            .bind(batch_size)
            .execute(&self.pool)
            .await?;

            let deleted = result.rows_affected();
            total += deleted;
            if deleted < batch_size as u64 {
                break;
            }
        }
        Ok(total)
    }
}
