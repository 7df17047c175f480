//! Feature vector store.
//!
//! One vector per book, created lazily on first request and recomputed by
//! the batch refresh job. Derived scores (popularity, quality, recency) are
//! recomputed from the current catalog counters on every refresh.

use chrono::Utc;
use data_providers::BookDataProvider;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::VectorStore;
use crate::error::{AppError, Result};
use crate::models::BookVector;

mod vectorizer;

pub use vectorizer::{
    popularity_score, quality_score, recency_score, BookVectorizer, DefaultVectorizer,
    AUTHOR_DIM, CONTENT_DIM, GENRE_DIM, GENRE_VOCABULARY, METADATA_DIM,
};

/// Outcome of a batch refresh pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
}

pub struct FeatureVectorStore {
    books: Arc<dyn BookDataProvider>,
    store: Arc<dyn VectorStore>,
    vectorizer: Arc<dyn BookVectorizer>,
}

impl FeatureVectorStore {
    pub fn new(
        books: Arc<dyn BookDataProvider>,
        store: Arc<dyn VectorStore>,
        vectorizer: Arc<dyn BookVectorizer>,
    ) -> Self {
        Self {
            books,
            store,
            vectorizer,
        }
    }

    /// Return the stored vector, computing and persisting it on first
    /// request.
    pub async fn get_or_create_vector(&self, book_id: Uuid) -> Result<BookVector> {
        if let Some(vector) = self.store.get(book_id).await? {
            return Ok(vector);
        }
        self.refresh_vector(book_id).await
    }

    /// Recompute every sub-vector and derived score from current catalog
    /// data. Idempotent: absent interaction changes, repeated runs produce
    /// the same field values.
    pub async fn refresh_vector(&self, book_id: Uuid) -> Result<BookVector> {
        let book = self
            .books
            .get_book_by_id(book_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not in catalog", book_id)))?;

        let max_views = self.books.max_view_count().await?;
        let now = Utc::now();

        let recency = recency_score(book.published_at, now);
        let vector = BookVector {
            book_id,
            content_vector: self.vectorizer.content_vector(&book),
            genre_vector: self.vectorizer.genre_vector(&book),
            author_vector: self.vectorizer.author_vector(&book),
            metadata_vector: self.vectorizer.metadata_vector(&book, recency),
            popularity_score: popularity_score(book.view_count, max_views),
            quality_score: quality_score(book.average_rating, book.ratings_count),
            recency_score: recency,
            view_count: book.view_count,
            download_count: book.download_count,
            rating_average: book.average_rating,
            rating_count: book.ratings_count,
            last_updated: now,
        };

        self.store.upsert(&vector).await?;
        Ok(vector)
    }

    /// Refresh the given books, or the whole catalog when `book_ids` is
    /// `None`. A failure on one book is logged and skipped; it never aborts
    /// the rest of the batch.
    pub async fn refresh_all(&self, book_ids: Option<Vec<Uuid>>) -> Result<RefreshSummary> {
        let ids = match book_ids {
            Some(ids) => ids,
            None => self.books.all_book_ids().await?,
        };

        let mut summary = RefreshSummary::default();
        for book_id in ids {
            match self.refresh_vector(book_id).await {
                Ok(_) => summary.refreshed += 1,
                Err(err) => {
                    summary.failed += 1;
                    warn!(book_id = %book_id, error = %err, "Vector refresh failed, skipping");
                }
            }
        }

        info!(
            refreshed = summary.refreshed,
            failed = summary.failed,
            "Vector refresh pass complete"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryVectorStore;
    use data_providers::{BookSummary, InMemoryBookProvider};

    fn seeded_provider() -> (Arc<InMemoryBookProvider>, Uuid) {
        let provider = Arc::new(InMemoryBookProvider::new());
        let book_id = Uuid::new_v4();
        provider.add_book(BookSummary {
            id: book_id,
            title: "Weep Not, Child".to_string(),
            authors: vec!["Ngugi wa Thiong'o".to_string()],
            categories: vec!["Fiction".to_string()],
            language: Some("en".to_string()),
            average_rating: 4.0,
            ratings_count: 10,
            view_count: 50,
            download_count: 3,
            published_at: Some(Utc::now() - chrono::Duration::days(180)),
            cover_image: None,
        });
        provider.add_book(BookSummary {
            id: Uuid::new_v4(),
            title: "Corpus Max".to_string(),
            authors: vec![],
            categories: vec![],
            language: Some("en".to_string()),
            average_rating: 0.0,
            ratings_count: 0,
            view_count: 100,
            download_count: 0,
            published_at: None,
            cover_image: None,
        });
        (provider, book_id)
    }

    fn vector_service(
        provider: Arc<InMemoryBookProvider>,
    ) -> (FeatureVectorStore, Arc<InMemoryVectorStore>) {
        let store = Arc::new(InMemoryVectorStore::new());
        let service = FeatureVectorStore::new(
            provider,
            store.clone(),
            Arc::new(DefaultVectorizer::new("en")),
        );
        (service, store)
    }

    #[tokio::test]
    async fn test_refresh_computes_derived_scores() {
        let (provider, book_id) = seeded_provider();
        let (service, _) = vector_service(provider);

        let vector = service.refresh_vector(book_id).await.unwrap();
        assert_eq!(vector.popularity_score, 0.5); // 50 / 100
        assert_eq!(vector.quality_score, 0.8); // 4.0 / 5
        assert!((vector.recency_score - 0.507).abs() < 0.01);
        assert_eq!(vector.view_count, 50);
        assert_eq!(vector.rating_count, 10);
    }

    #[tokio::test]
    async fn test_refresh_is_idempotent() {
        let (provider, book_id) = seeded_provider();
        let (service, _) = vector_service(provider);

        let first = service.refresh_vector(book_id).await.unwrap();
        let second = service.refresh_vector(book_id).await.unwrap();

        assert_eq!(first.content_vector, second.content_vector);
        assert_eq!(first.genre_vector, second.genre_vector);
        assert_eq!(first.author_vector, second.author_vector);
        assert_eq!(first.popularity_score, second.popularity_score);
        assert_eq!(first.quality_score, second.quality_score);
    }

    #[tokio::test]
    async fn test_get_or_create_is_lazy() {
        let (provider, book_id) = seeded_provider();
        let (service, store) = vector_service(provider);

        assert!(store.is_empty());
        let vector = service.get_or_create_vector(book_id).await.unwrap();
        assert_eq!(store.len(), 1);

        // Second call serves the stored row
        let again = service.get_or_create_vector(book_id).await.unwrap();
        assert_eq!(vector.last_updated, again.last_updated);
    }

    #[tokio::test]
    async fn test_batch_refresh_skips_failures() {
        let (provider, _) = seeded_provider();
        let (service, _) = vector_service(provider.clone());

        let mut ids = provider.all_book_ids().await.unwrap();
        ids.push(Uuid::new_v4()); // not in the catalog

        let summary = service.refresh_all(Some(ids)).await.unwrap();
        assert_eq!(summary.refreshed, 2);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn test_zero_interaction_book() {
        let provider = Arc::new(InMemoryBookProvider::new());
        let book_id = Uuid::new_v4();
        provider.add_book(BookSummary {
            id: book_id,
            title: "Unread".to_string(),
            authors: vec![],
            categories: vec![],
            language: None,
            average_rating: 0.0,
            ratings_count: 0,
            view_count: 0,
            download_count: 0,
            published_at: None,
            cover_image: None,
        });
        let (service, _) = vector_service(provider);

        let vector = service.refresh_vector(book_id).await.unwrap();
        assert_eq!(vector.popularity_score, 0.0);
        assert_eq!(vector.quality_score, 0.0);
        assert_eq!(vector.rating_count, 0);
    }
}
