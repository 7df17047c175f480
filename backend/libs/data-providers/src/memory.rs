//! In-memory provider implementations.
//!
//! Fixtures for tests and local development; behavior mirrors the Postgres
//! implementations (ordering, exclusion, filter semantics).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::{
    BookDataProvider, BookSummary, Bookmark, ReadingDataProvider, ReadingRecord, ReadingStatus,
    Result, SearchFilters,
};

#[derive(Default)]
pub struct InMemoryBookProvider {
    books: RwLock<HashMap<Uuid, BookSummary>>,
}

impl InMemoryBookProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_book(&self, book: BookSummary) {
        self.books.write().unwrap().insert(book.id, book);
    }

    pub fn with_books(books: Vec<BookSummary>) -> Self {
        let provider = Self::new();
        for book in books {
            provider.add_book(book);
        }
        provider
    }

    pub fn len(&self) -> usize {
        self.books.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sorted_by_popularity(&self, exclude: &[Uuid]) -> Vec<BookSummary> {
        let mut books: Vec<BookSummary> = self
            .books
            .read()
            .unwrap()
            .values()
            .filter(|b| !exclude.contains(&b.id))
            .cloned()
            .collect();
        books.sort_by(|a, b| {
            let ka = a.view_count + a.download_count * 5;
            let kb = b.view_count + b.download_count * 5;
            kb.cmp(&ka).then(a.id.cmp(&b.id))
        });
        books
    }
}

#[async_trait]
impl BookDataProvider for InMemoryBookProvider {
    async fn get_book_by_id(&self, id: Uuid) -> Result<Option<BookSummary>> {
        Ok(self.books.read().unwrap().get(&id).cloned())
    }

    async fn get_books_by_ids(&self, ids: &[Uuid]) -> Result<Vec<BookSummary>> {
        let books = self.books.read().unwrap();
        Ok(ids.iter().filter_map(|id| books.get(id).cloned()).collect())
    }

    async fn get_books_by_category(
        &self,
        categories: &[String],
        limit: i64,
    ) -> Result<Vec<BookSummary>> {
        let mut books: Vec<BookSummary> = self
            .books
            .read()
            .unwrap()
            .values()
            .filter(|b| b.categories.iter().any(|c| categories.contains(c)))
            .cloned()
            .collect();
        books.sort_by(|a, b| {
            b.average_rating
                .partial_cmp(&a.average_rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        books.truncate(limit as usize);
        Ok(books)
    }

    async fn get_popular_books(
        &self,
        limit: i64,
        exclude_ids: &[Uuid],
    ) -> Result<Vec<BookSummary>> {
        let mut books = self.sorted_by_popularity(exclude_ids);
        books.truncate(limit as usize);
        Ok(books)
    }

    async fn search_books(
        &self,
        query: &str,
        filters: &SearchFilters,
        limit: i64,
    ) -> Result<Vec<BookSummary>> {
        let needle = query.to_lowercase();
        let mut books: Vec<BookSummary> = self
            .books
            .read()
            .unwrap()
            .values()
            .filter(|b| b.title.to_lowercase().contains(&needle))
            .filter(|b| {
                filters.categories.is_empty()
                    || b.categories.iter().any(|c| filters.categories.contains(c))
            })
            .filter(|b| {
                filters
                    .language
                    .as_ref()
                    .map(|lang| b.language.as_deref() == Some(lang.as_str()))
                    .unwrap_or(true)
            })
            .filter(|b| {
                filters
                    .min_rating
                    .map(|min| b.average_rating >= min)
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        books.sort_by(|a, b| {
            b.average_rating
                .partial_cmp(&a.average_rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        books.truncate(limit as usize);
        Ok(books)
    }

    async fn get_book_categories(&self, id: Uuid) -> Result<Vec<String>> {
        Ok(self
            .books
            .read()
            .unwrap()
            .get(&id)
            .map(|b| b.categories.clone())
            .unwrap_or_default())
    }

    async fn all_book_ids(&self) -> Result<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.books.read().unwrap().keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn max_view_count(&self) -> Result<i64> {
        Ok(self
            .books
            .read()
            .unwrap()
            .values()
            .map(|b| b.view_count)
            .max()
            .unwrap_or(0))
    }
}

#[derive(Default)]
pub struct InMemoryReadingProvider {
    records: RwLock<Vec<ReadingRecord>>,
    bookmarks: RwLock<Vec<Bookmark>>,
}

impl InMemoryReadingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_record(&self, record: ReadingRecord) {
        self.records.write().unwrap().push(record);
    }

    pub fn add_bookmark(&self, bookmark: Bookmark) {
        self.bookmarks.write().unwrap().push(bookmark);
    }

    fn records_for(&self, user_id: Uuid, status: Option<ReadingStatus>) -> Vec<ReadingRecord> {
        let mut records: Vec<ReadingRecord> = self
            .records
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .filter(|r| status.map(|s| r.status == s).unwrap_or(true))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.last_read_at.cmp(&a.last_read_at));
        records
    }
}

#[async_trait]
impl ReadingDataProvider for InMemoryReadingProvider {
    async fn get_user_reading_history(&self, user_id: Uuid) -> Result<Vec<ReadingRecord>> {
        Ok(self.records_for(user_id, None))
    }

    async fn get_user_current_books(&self, user_id: Uuid) -> Result<Vec<ReadingRecord>> {
        Ok(self.records_for(user_id, Some(ReadingStatus::InProgress)))
    }

    async fn get_user_completed_books(&self, user_id: Uuid) -> Result<Vec<ReadingRecord>> {
        Ok(self.records_for(user_id, Some(ReadingStatus::Completed)))
    }

    async fn get_user_bookmarks(&self, user_id: Uuid) -> Result<Vec<Bookmark>> {
        let mut bookmarks: Vec<Bookmark> = self
            .bookmarks
            .read()
            .unwrap()
            .iter()
            .filter(|b| b.user_id == user_id)
            .cloned()
            .collect();
        bookmarks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(bookmarks)
    }

    async fn has_user_read_book(&self, user_id: Uuid, book_id: Uuid) -> Result<bool> {
        Ok(self
            .records
            .read()
            .unwrap()
            .iter()
            .any(|r| r.user_id == user_id && r.book_id == book_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn book(title: &str, views: i64) -> BookSummary {
        BookSummary {
            id: Uuid::new_v4(),
            title: title.to_string(),
            authors: vec!["Ama Ata".to_string()],
            categories: vec!["Fiction".to_string()],
            language: Some("en".to_string()),
            average_rating: 4.0,
            ratings_count: 12,
            view_count: views,
            download_count: 0,
            published_at: Some(Utc::now()),
            cover_image: None,
        }
    }

    #[tokio::test]
    async fn test_popular_books_ordering_and_exclusion() {
        let provider = InMemoryBookProvider::new();
        let low = book("Quiet", 10);
        let high = book("Loud", 100);
        provider.add_book(low.clone());
        provider.add_book(high.clone());

        let popular = provider.get_popular_books(10, &[]).await.unwrap();
        assert_eq!(popular[0].id, high.id);

        let excluded = provider.get_popular_books(10, &[high.id]).await.unwrap();
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].id, low.id);
    }

    #[tokio::test]
    async fn test_search_matches_title_and_filters() {
        let provider = InMemoryBookProvider::new();
        let mut hit = book("A River Runs Through", 5);
        hit.average_rating = 4.5;
        provider.add_book(hit.clone());
        provider.add_book(book("Desert Wind", 5));

        let results = provider
            .search_books("river", &SearchFilters::default(), 10)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, hit.id);

        let filtered = provider
            .search_books(
                "river",
                &SearchFilters {
                    min_rating: Some(4.8),
                    ..Default::default()
                },
                10,
            )
            .await
            .unwrap();
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn test_reading_history_filters_by_status() {
        let provider = InMemoryReadingProvider::new();
        let user = Uuid::new_v4();
        let done = Uuid::new_v4();
        let open = Uuid::new_v4();
        let now = Utc::now();

        provider.add_record(ReadingRecord {
            user_id: user,
            book_id: done,
            status: ReadingStatus::Completed,
            progress_percent: 100.0,
            started_at: now,
            finished_at: Some(now),
            last_read_at: now,
        });
        provider.add_record(ReadingRecord {
            user_id: user,
            book_id: open,
            status: ReadingStatus::InProgress,
            progress_percent: 40.0,
            started_at: now,
            finished_at: None,
            last_read_at: now,
        });

        let completed = provider.get_user_completed_books(user).await.unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].book_id, done);

        assert!(provider.has_user_read_book(user, open).await.unwrap());
        assert!(!provider.has_user_read_book(user, Uuid::new_v4()).await.unwrap());
    }
}
