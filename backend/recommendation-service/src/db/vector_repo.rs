use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::VectorStore;
use crate::error::{AppError, Result};
use crate::models::BookVector;

type VectorRow = (
    Uuid,          // book_id
    Vec<f32>,      // content_vector
    Vec<f32>,      // genre_vector
    Vec<f32>,      // author_vector
    Vec<f32>,      // metadata_vector
    f32,           // popularity_score
    f32,           // quality_score
    f32,           // recency_score
    i64,           // view_count
    i64,           // download_count
    f32,           // rating_average
    i64,           // rating_count
    DateTime<Utc>, // last_updated
);

const VECTOR_SELECT: &str = r#"
    SELECT book_id, content_vector, genre_vector, author_vector, metadata_vector,
           popularity_score, quality_score, recency_score,
           view_count, download_count, rating_average, rating_count, last_updated
    FROM book_vectors
"#;

fn into_vector(row: VectorRow) -> BookVector {
    let (
        book_id,
        content_vector,
        genre_vector,
        author_vector,
        metadata_vector,
        popularity_score,
        quality_score,
        recency_score,
        view_count,
        download_count,
        rating_average,
        rating_count,
        last_updated,
    ) = row;
    BookVector {
        book_id,
        content_vector,
        genre_vector,
        author_vector,
        metadata_vector,
        popularity_score,
        quality_score,
        recency_score,
        view_count,
        download_count,
        rating_average,
        rating_count,
        last_updated,
    }
}

pub struct PgVectorStore {
    pool: PgPool,
}

impl PgVectorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn get(&self, book_id: Uuid) -> Result<Option<BookVector>> {
        let sql = format!("{} WHERE book_id = $1", VECTOR_SELECT);
        let row = sqlx::query_as::<_, VectorRow>(&sql)
            .bind(book_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(into_vector))
    }

    async fn upsert(&self, vector: &BookVector) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO book_vectors (
                book_id, content_vector, genre_vector, author_vector, metadata_vector,
                popularity_score, quality_score, recency_score,
                view_count, download_count, rating_average, rating_count, last_updated
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (book_id) DO UPDATE SET
                content_vector = EXCLUDED.content_vector,
                genre_vector = EXCLUDED.genre_vector,
                author_vector = EXCLUDED.author_vector,
                metadata_vector = EXCLUDED.metadata_vector,
                popularity_score = EXCLUDED.popularity_score,
                quality_score = EXCLUDED.quality_score,
                recency_score = EXCLUDED.recency_score,
                view_count = EXCLUDED.view_count,
                download_count = EXCLUDED.download_count,
                rating_average = EXCLUDED.rating_average,
                rating_count = EXCLUDED.rating_count,
                last_updated = EXCLUDED.last_updated
            "#,
        )
        .bind(vector.book_id)
        .bind(&vector.content_vector)
        .bind(&vector.genre_vector)
        .bind(&vector.author_vector)
        .bind(&vector.metadata_vector)
        .bind(vector.popularity_score)
        .bind(vector.quality_score)
        .bind(vector.recency_score)
        .bind(vector.view_count)
        .bind(vector.download_count)
        .bind(vector.rating_average)
        .bind(vector.rating_count)
        .bind(vector.last_updated)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to upsert vector for book {}: {}", vector.book_id, e);
            AppError::Database(e.to_string())
        })?;
        Ok(())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<BookVector>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("{} WHERE book_id = ANY($1)", VECTOR_SELECT);
        let rows = sqlx::query_as::<_, VectorRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(into_vector).collect())
    }

    async fn all_ids(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT book_id FROM book_vectors ORDER BY book_id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn top_by_popularity(&self, limit: i64, exclude: &[Uuid]) -> Result<Vec<BookVector>> {
        let sql = format!(
            "{} WHERE book_id <> ALL($1)
            ORDER BY popularity_score DESC, book_id ASC
            LIMIT $2",
            VECTOR_SELECT
        );
        let rows = sqlx::query_as::<_, VectorRow>(&sql)
            .bind(exclude)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(into_vector).collect())
    }

    async fn delete(&self, book_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM book_vectors WHERE book_id = $1")
            .bind(book_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
