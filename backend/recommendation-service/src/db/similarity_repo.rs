use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::SimilarityStore;
use crate::error::{AppError, Result};
use crate::models::SimilarityEntry;

type SimilarityRow = (Uuid, Uuid, f32, String, DateTime<Utc>);

fn into_entry(row: SimilarityRow) -> SimilarityEntry {
    let (book_id, similar_book_id, similarity_score, algorithm_type, last_calculated) = row;
    SimilarityEntry {
        book_id,
        similar_book_id,
        similarity_score,
        algorithm_type,
        last_calculated,
    }
}

pub struct PgSimilarityStore {
    pool: PgPool,
}

impl PgSimilarityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SimilarityStore for PgSimilarityStore {
    async fn replace_for_book(&self, book_id: Uuid, entries: &[SimilarityEntry]) -> Result<()> {
        // Delete-then-insert inside one transaction so readers never see a
        // partially rewritten row set for this source book.
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM similarity_matrix WHERE book_id = $1")
            .bind(book_id)
            .execute(&mut *tx)
            .await?;

        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO similarity_matrix
                    (book_id, similar_book_id, similarity_score, algorithm_type, last_calculated)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(entry.book_id)
            .bind(entry.similar_book_id)
            .bind(entry.similarity_score)
            .bind(&entry.algorithm_type)
            .bind(entry.last_calculated)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await.map_err(|e| {
            error!("Failed to commit similarity rows for {}: {}", book_id, e);
            AppError::Database(e.to_string())
        })?;
        Ok(())
    }

    async fn upsert_entries(&self, entries: &[SimilarityEntry]) -> Result<()> {
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO similarity_matrix
                    (book_id, similar_book_id, similarity_score, algorithm_type, last_calculated)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (book_id, similar_book_id) DO UPDATE SET
                    similarity_score = EXCLUDED.similarity_score,
                    algorithm_type = EXCLUDED.algorithm_type,
                    last_calculated = EXCLUDED.last_calculated
                "#,
            )
            .bind(entry.book_id)
            .bind(entry.similar_book_id)
            .bind(entry.similarity_score)
            .bind(&entry.algorithm_type)
            .bind(entry.last_calculated)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    async fn most_similar(&self, book_id: Uuid, limit: i64) -> Result<Vec<SimilarityEntry>> {
        let rows = sqlx::query_as::<_, SimilarityRow>(
            r#"
            SELECT book_id, similar_book_id, similarity_score, algorithm_type, last_calculated
            FROM similarity_matrix
            WHERE book_id = $1
            ORDER BY similarity_score DESC, similar_book_id ASC
            LIMIT $2
            "#,
        )
        .bind(book_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(into_entry).collect())
    }

    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM similarity_matrix WHERE last_calculated < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_stale(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM similarity_matrix WHERE last_calculated < $1")
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM similarity_matrix")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
