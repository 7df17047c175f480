use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::{Bookmark, ProviderError, ReadingRecord, ReadingStatus, Result};

/// Read-only access to the reading service's per-user history.
#[async_trait]
pub trait ReadingDataProvider: Send + Sync {
    /// Every reading record for the user, most recent first.
    async fn get_user_reading_history(&self, user_id: Uuid) -> Result<Vec<ReadingRecord>>;

    async fn get_user_current_books(&self, user_id: Uuid) -> Result<Vec<ReadingRecord>>;

    async fn get_user_completed_books(&self, user_id: Uuid) -> Result<Vec<ReadingRecord>>;

    async fn get_user_bookmarks(&self, user_id: Uuid) -> Result<Vec<Bookmark>>;

    async fn has_user_read_book(&self, user_id: Uuid, book_id: Uuid) -> Result<bool>;
}

type ReadingRow = (
    Uuid,                  // user_id
    Uuid,                  // book_id
    String,                // status
    f32,                   // progress_percent
    DateTime<Utc>,         // started_at
    Option<DateTime<Utc>>, // finished_at
    DateTime<Utc>,         // last_read_at
);

fn into_record(row: ReadingRow) -> Result<ReadingRecord> {
    let (user_id, book_id, status, progress_percent, started_at, finished_at, last_read_at) = row;
    Ok(ReadingRecord {
        user_id,
        book_id,
        status: status.parse::<ReadingStatus>()?,
        progress_percent,
        started_at,
        finished_at,
        last_read_at,
    })
}

const READING_SELECT: &str = r#"
    SELECT user_id, book_id, status, progress_percent::FLOAT4,
           started_at, finished_at, last_read_at
    FROM reading_progress
"#;

/// Postgres-backed reading history provider.
pub struct PgReadingProvider {
    pool: PgPool,
}

impl PgReadingProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_by_status(
        &self,
        user_id: Uuid,
        status: ReadingStatus,
    ) -> Result<Vec<ReadingRecord>> {
        let sql = format!(
            "{} WHERE user_id = $1 AND status = $2 ORDER BY last_read_at DESC",
            READING_SELECT
        );
        let rows = sqlx::query_as::<_, ReadingRow>(&sql)
            .bind(user_id)
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(ProviderError::from)?;
        rows.into_iter().map(into_record).collect()
    }
}

#[async_trait]
impl ReadingDataProvider for PgReadingProvider {
    async fn get_user_reading_history(&self, user_id: Uuid) -> Result<Vec<ReadingRecord>> {
        let sql = format!("{} WHERE user_id = $1 ORDER BY last_read_at DESC", READING_SELECT);
        let rows = sqlx::query_as::<_, ReadingRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(ProviderError::from)?;
        rows.into_iter().map(into_record).collect()
    }

    async fn get_user_current_books(&self, user_id: Uuid) -> Result<Vec<ReadingRecord>> {
        self.fetch_by_status(user_id, ReadingStatus::InProgress).await
    }

    async fn get_user_completed_books(&self, user_id: Uuid) -> Result<Vec<ReadingRecord>> {
        self.fetch_by_status(user_id, ReadingStatus::Completed).await
    }

    async fn get_user_bookmarks(&self, user_id: Uuid) -> Result<Vec<Bookmark>> {
        let rows: Vec<(Uuid, Uuid, i32, Option<String>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT user_id, book_id, position, note, created_at
             FROM bookmarks WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(user_id, book_id, position, note, created_at)| Bookmark {
                user_id,
                book_id,
                position,
                note,
                created_at,
            })
            .collect())
    }

    async fn has_user_read_book(&self, user_id: Uuid, book_id: Uuid) -> Result<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (
                SELECT 1 FROM reading_progress
                WHERE user_id = $1 AND book_id = $2
            )",
        )
        .bind(user_id)
        .bind(book_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}
