use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use tracing::error;
use uuid::Uuid;

use super::TrendingStore;
use crate::error::{AppError, Result};
use crate::models::{TrendPeriod, TrendType, TrendingBook};

type TrendingRow = (
    Uuid,          // id
    Uuid,          // book_id
    String,        // period
    String,        // trend_type
    i32,           // rank
    f64,           // score
    i64,           // interaction_count
    f32,           // avg_rating
    bool,          // is_active
    DateTime<Utc>, // computed_at
);

fn into_trending(row: TrendingRow) -> Result<TrendingBook> {
    let (id, book_id, period, trend_type, rank, score, interaction_count, avg_rating, is_active, computed_at) =
        row;
    Ok(TrendingBook {
        id,
        book_id,
        period: TrendPeriod::from_str(&period)?,
        trend_type: TrendType::from_str(&trend_type)?,
        rank,
        score,
        interaction_count,
        avg_rating,
        is_active,
        computed_at,
    })
}

pub struct PgTrendingStore {
    pool: PgPool,
}

impl PgTrendingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TrendingStore for PgTrendingStore {
    async fn replace_snapshot(
        &self,
        period: TrendPeriod,
        trend_type: TrendType,
        rows: &[TrendingBook],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            UPDATE trending_books
            SET is_active = FALSE
            WHERE period = $1 AND trend_type = $2 AND is_active
            "#,
        )
        .bind(period.as_str())
        .bind(trend_type.as_str())
        .execute(&mut *tx)
        .await?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO trending_books
                    (id, book_id, period, trend_type, rank, score,
                     interaction_count, avg_rating, is_active, computed_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, TRUE, $9)
                "#,
            )
            .bind(row.id)
            .bind(row.book_id)
            .bind(row.period.as_str())
            .bind(row.trend_type.as_str())
            .bind(row.rank)
            .bind(row.score)
            .bind(row.interaction_count)
            .bind(row.avg_rating)
            .bind(row.computed_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await.map_err(|e| {
            error!(
                "Failed to commit trending snapshot {}/{}: {}",
                period, trend_type, e
            );
            AppError::Database(e.to_string())
        })?;
        Ok(())
    }

    async fn get_active(
        &self,
        period: TrendPeriod,
        trend_type: TrendType,
        limit: i64,
    ) -> Result<Vec<TrendingBook>> {
        let rows = sqlx::query_as::<_, TrendingRow>(
            r#"
            SELECT id, book_id, period, trend_type, rank, score,
                   interaction_count, avg_rating, is_active, computed_at
            FROM trending_books
            WHERE period = $1 AND trend_type = $2 AND is_active
            ORDER BY rank ASC
            LIMIT $3
            "#,
        )
        .bind(period.as_str())
        .bind(trend_type.as_str())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(into_trending).collect()
    }

    async fn count_inactive_older_than(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM trending_books WHERE NOT is_active AND computed_at < $1",
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn purge_inactive_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            "DELETE FROM trending_books WHERE NOT is_active AND computed_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
