use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use crate::{BookSummary, ProviderError, Result, SearchFilters};

/// Read-only access to the catalog service's book data.
///
/// Side-effect-free from the consumer's perspective; counters (views,
/// downloads, ratings) are maintained by the catalog service itself.
#[async_trait]
pub trait BookDataProvider: Send + Sync {
    async fn get_book_by_id(&self, id: Uuid) -> Result<Option<BookSummary>>;

    async fn get_books_by_ids(&self, ids: &[Uuid]) -> Result<Vec<BookSummary>>;

    /// Books belonging to any of the given categories, rating-ordered.
    async fn get_books_by_category(
        &self,
        categories: &[String],
        limit: i64,
    ) -> Result<Vec<BookSummary>>;

    /// Most engaged-with books, excluding the given ids.
    async fn get_popular_books(&self, limit: i64, exclude_ids: &[Uuid])
        -> Result<Vec<BookSummary>>;

    async fn search_books(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<BookSummary>>;

    async fn get_book_categories(&self, id: Uuid) -> Result<Vec<String>>;

    /// Every catalog book id; drives batch vector refresh and orphan cleanup.
    async fn all_book_ids(&self) -> Result<Vec<Uuid>>;

    /// Highest view count across the corpus (popularity denominator).
    async fn max_view_count(&self) -> Result<i64>;
}

type BookRow = (
    Uuid,                      // id
    String,                    // title
    Vec<String>,               // authors
    Vec<String>,               // categories
    Option<String>,            // language
    f32,                       // average_rating
    i64,                       // ratings_count
    i64,                       // view_count
    i64,                       // download_count
    Option<DateTime<Utc>>,     // published_at
    Option<String>,            // cover_image
);

const BOOK_SELECT: &str = r#"
    SELECT
        b.id,
        b.title,
        COALESCE(a.authors, '{}') AS authors,
        COALESCE(c.categories, '{}') AS categories,
        b.language,
        b.average_rating::FLOAT4 AS average_rating,
        b.ratings_count,
        b.view_count,
        b.download_count,
        b.published_at,
        b.cover_image
    FROM books b
    LEFT JOIN LATERAL (
        SELECT array_agg(ba.author_name ORDER BY ba.position) AS authors
        FROM book_authors ba WHERE ba.book_id = b.id
    ) a ON TRUE
    LEFT JOIN LATERAL (
        SELECT array_agg(bc.category_name) AS categories
        FROM book_categories bc WHERE bc.book_id = b.id
    ) c ON TRUE
"#;

fn into_summary(row: BookRow) -> BookSummary {
    let (
        id,
        title,
        authors,
        categories,
        language,
        average_rating,
        ratings_count,
        view_count,
        download_count,
        published_at,
        cover_image,
    ) = row;
    BookSummary {
        id,
        title,
        authors,
        categories,
        language,
        average_rating,
        ratings_count,
        view_count,
        download_count,
        published_at,
        cover_image,
    }
}

/// Postgres-backed catalog provider.
pub struct PgBookProvider {
    pool: PgPool,
}

impl PgBookProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookDataProvider for PgBookProvider {
    async fn get_book_by_id(&self, id: Uuid) -> Result<Option<BookSummary>> {
        let sql = format!("{} WHERE b.id = $1", BOOK_SELECT);
        let row = sqlx::query_as::<_, BookRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to fetch book {}: {}", id, e);
                ProviderError::Database(e.to_string())
            })?;
        Ok(row.map(into_summary))
    }

    async fn get_books_by_ids(&self, ids: &[Uuid]) -> Result<Vec<BookSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("{} WHERE b.id = ANY($1)", BOOK_SELECT);
        let rows = sqlx::query_as::<_, BookRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(into_summary).collect())
    }

    async fn get_books_by_category(
        &self,
        categories: &[String],
        limit: i64,
    ) -> Result<Vec<BookSummary>> {
        if categories.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "{} WHERE EXISTS (
                SELECT 1 FROM book_categories bc
                WHERE bc.book_id = b.id AND bc.category_name = ANY($1)
            )
            ORDER BY b.average_rating DESC, b.id ASC
            LIMIT $2",
            BOOK_SELECT
        );
        let rows = sqlx::query_as::<_, BookRow>(&sql)
            .bind(categories)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(into_summary).collect())
    }

    async fn get_popular_books(
        &self,
        limit: i64,
        exclude_ids: &[Uuid],
    ) -> Result<Vec<BookSummary>> {
        let sql = format!(
            "{} WHERE b.id <> ALL($1)
            ORDER BY (b.view_count + b.download_count * 5) DESC, b.id ASC
            LIMIT $2",
            BOOK_SELECT
        );
        let rows = sqlx::query_as::<_, BookRow>(&sql)
            .bind(exclude_ids)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(into_summary).collect())
    }

    async fn search_books(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<BookSummary>> {
        let pattern = format!("%{}%", query);
        let sql = format!(
            "{} WHERE b.title ILIKE $1
              AND ($2::TEXT[] = '{{}}' OR EXISTS (
                  SELECT 1 FROM book_categories bc
                  WHERE bc.book_id = b.id AND bc.category_name = ANY($2)
              ))
              AND ($3::TEXT IS NULL OR b.language = $3)
              AND ($4::FLOAT4 IS NULL OR b.average_rating >= $4)
            ORDER BY b.average_rating DESC, b.id ASC
            LIMIT $5",
            BOOK_SELECT
        );
        let rows = sqlx::query_as::<_, BookRow>(&sql)
            .bind(pattern)
            .bind(&filters.categories)
            .bind(filters.language.as_deref())
            .bind(filters.min_rating)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(into_summary).collect())
    }

    async fn get_book_categories(&self, id: Uuid) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT category_name FROM book_categories WHERE book_id = $1 ORDER BY category_name",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn all_book_ids(&self) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM books ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn max_view_count(&self) -> Result<i64> {
        let (max,): (i64,) =
            sqlx::query_as("SELECT COALESCE(MAX(view_count), 0) FROM books")
                .fetch_one(&self.pool)
                .await?;
        Ok(max)
    }
}
