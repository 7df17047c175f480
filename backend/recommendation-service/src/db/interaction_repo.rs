use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use super::{AttributedInteraction, InteractionAggregate, InteractionStore};
use crate::error::Result;
use crate::models::{InteractionType, RecommendationFeedback, UserInteraction};

const IMPORTANT_TYPES: [&str; 3] = ["rating", "bookmark", "purchase"];

pub struct PgInteractionStore {
    pool: PgPool,
}

impl PgInteractionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InteractionStore for PgInteractionStore {
    async fn record(&self, interaction: &UserInteraction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_interactions
                (id, user_id, book_id, interaction_type, recommendation_id,
                 rating_value, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(interaction.id)
        .bind(interaction.user_id)
        .bind(interaction.book_id)
        .bind(interaction.interaction_type.as_str())
        .bind(interaction.recommendation_id)
        .bind(interaction.rating_value)
        .bind(&interaction.metadata)
        .bind(interaction.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_feedback(&self, feedback: &RecommendationFeedback) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recommendation_feedback
                (id, user_id, recommendation_id, rating, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(feedback.id)
        .bind(feedback.user_id)
        .bind(feedback.recommendation_id)
        .bind(feedback.rating)
        .bind(feedback.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn recent_books_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT book_id
            FROM user_interactions
            WHERE user_id = $1
            GROUP BY book_id
            ORDER BY MAX(created_at) DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn peers_for_books(
        &self,
        user_id: Uuid,
        book_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<(Uuid, i64)>> {
        if book_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT user_id, COUNT(DISTINCT book_id) AS shared
            FROM user_interactions
            WHERE book_id = ANY($1) AND user_id <> $2
            GROUP BY user_id
            ORDER BY shared DESC, user_id ASC
            LIMIT $3
            "#,
        )
        .bind(book_ids)
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn weighted_books_for_users(
        &self,
        user_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<(Uuid, f64)>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<(Uuid, f64)> = sqlx::query_as(
            r#"
            SELECT book_id,
                   SUM(CASE interaction_type
                       WHEN 'view' THEN 1.0
                       WHEN 'rating' THEN 2.0
                       WHEN 'bookmark' THEN 3.0
                       WHEN 'download' THEN 5.0
                       WHEN 'purchase' THEN 8.0
                       ELSE 1.0
                   END)::FLOAT8 AS weight
            FROM user_interactions
            WHERE user_id = ANY($1)
            GROUP BY book_id
            ORDER BY weight DESC, book_id ASC
            LIMIT $2
            "#,
        )
        .bind(user_ids)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn aggregates_since(&self, since: DateTime<Utc>) -> Result<Vec<InteractionAggregate>> {
        let rows: Vec<(Uuid, i64, i64, i64, i64, i64, f64, Option<DateTime<Utc>>)> =
            sqlx::query_as(
                r#"
                SELECT book_id,
                       COUNT(*) FILTER (WHERE interaction_type = 'view'),
                       COUNT(*) FILTER (WHERE interaction_type = 'download'),
                       COUNT(*) FILTER (WHERE interaction_type = 'rating'),
                       COUNT(*) FILTER (WHERE interaction_type = 'bookmark'),
                       COUNT(*) FILTER (WHERE interaction_type = 'purchase'),
                       COALESCE(SUM(rating_value) FILTER (WHERE interaction_type = 'rating'), 0)::FLOAT8,
                       MAX(created_at)
                FROM user_interactions
                WHERE created_at >= $1
                GROUP BY book_id
                "#,
            )
            .bind(since)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(
                |(book_id, views, downloads, ratings, bookmarks, purchases, rating_sum, last)| {
                    InteractionAggregate {
                        book_id,
                        views,
                        downloads,
                        ratings,
                        bookmarks,
                        purchases,
                        rating_sum,
                        last_interaction: last,
                    }
                },
            )
            .collect())
    }

    async fn attributed_since(&self, since: DateTime<Utc>) -> Result<Vec<AttributedInteraction>> {
        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT recommendation_id, interaction_type
            FROM user_interactions
            WHERE recommendation_id IS NOT NULL AND created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|(recommendation_id, raw)| {
                Ok(AttributedInteraction {
                    recommendation_id,
                    interaction_type: InteractionType::from_str(&raw)?,
                })
            })
            .collect()
    }

    async fn feedback_since(&self, since: DateTime<Utc>) -> Result<Vec<RecommendationFeedback>> {
        let rows: Vec<(Uuid, Uuid, Uuid, i16, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT id, user_id, recommendation_id, rating, created_at
            FROM recommendation_feedback
            WHERE created_at >= $1
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(id, user_id, recommendation_id, rating, created_at)| {
                RecommendationFeedback {
                    id,
                    user_id,
                    recommendation_id,
                    rating,
                    created_at,
                }
            })
            .collect())
    }

    async fn user_activity_since(&self, since: DateTime<Utc>) -> Result<Vec<(Uuid, i64)>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT user_id, COUNT(*)
            FROM user_interactions
            WHERE created_at >= $1
            GROUP BY user_id
            ORDER BY COUNT(*) DESC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn count_purgeable(
        &self,
        routine_cutoff: DateTime<Utc>,
        important_cutoff: DateTime<Utc>,
    ) -> Result<(i64, i64)> {
        let important_types: Vec<String> =
            IMPORTANT_TYPES.iter().map(|s| s.to_string()).collect();

        let (routine,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM user_interactions
            WHERE created_at < $1 AND interaction_type <> ALL($2)
            "#,
        )
        .bind(routine_cutoff)
        .bind(&important_types)
        .fetch_one(&self.pool)
        .await?;

        let (important,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM user_interactions
            WHERE created_at < $1 AND interaction_type = ANY($2)
            "#,
        )
        .bind(important_cutoff)
        .bind(&important_types)
        .fetch_one(&self.pool)
        .await?;

        Ok((routine, important))
    }

    async fn purge(
        &self,
        routine_cutoff: DateTime<Utc>,
        important_cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let important_types: Vec<String> =
            IMPORTANT_TYPES.iter().map(|s| s.to_string()).collect();

        let routine = sqlx::query(
            r#"
            DELETE FROM user_interactions
            WHERE created_at < $1 AND interaction_type <> ALL($2)
            "#,
        )
        .bind(routine_cutoff)
        .bind(&important_types)
        .execute(&self.pool)
        .await?;

        let important = sqlx::query(
            r#"
            DELETE FROM user_interactions
            WHERE created_at < $1 AND interaction_type = ANY($2)
            "#,
        )
        .bind(important_cutoff)
        .bind(&important_types)
        .execute(&self.pool)
        .await?;

        Ok(routine.rows_affected() + important.rows_affected())
    }
}
