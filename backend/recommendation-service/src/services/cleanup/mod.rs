//! Retention cleanup.
//!
//! Each entity has its own retention rule:
//! - recommendation sets older than `days` are purged (batched deletes)
//! - routine interactions (views, downloads) older than `days` are purged;
//!   important ones (rating, bookmark, purchase) get 2x `days`
//! - similarity rows older than `days` are purged
//! - vectors whose book left the catalog are removed
//! - inactive trending rows older than `days` are purged

use chrono::{Duration, Utc};
use data_providers::BookDataProvider;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{
    InteractionStore, RecommendationStore, SimilarityStore, TrendingStore, VectorStore,
};
use crate::error::Result;

/// Retention multiplier for important interaction types.
const IMPORTANT_RETENTION_FACTOR: i64 = 2;

#[derive(Debug, Clone)]
pub struct CleanupOptions {
    pub days: i64,
    pub recommendations: bool,
    pub interactions: bool,
    pub vectors: bool,
    pub similarity: bool,
    pub trending: bool,
    pub batch_size: i64,
    pub dry_run: bool,
}

impl Default for CleanupOptions {
    fn default() -> Self {
        Self {
            days: 90,
            recommendations: false,
            interactions: false,
            vectors: false,
            similarity: false,
            trending: false,
            batch_size: 500,
            dry_run: false,
        }
    }
}

impl CleanupOptions {
    pub fn any_entity(&self) -> bool {
        self.recommendations || self.interactions || self.vectors || self.similarity || self.trending
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub recommendation_sets: u64,
    pub interactions: u64,
    pub vectors: u64,
    pub similarity_rows: u64,
    pub trending_rows: u64,
}

impl CleanupSummary {
    pub fn total(&self) -> u64 {
        self.recommendation_sets
            + self.interactions
            + self.vectors
            + self.similarity_rows
            + self.trending_rows
    }
}

pub struct CleanupService {
    recommendations: Arc<dyn RecommendationStore>,
    interactions: Arc<dyn InteractionStore>,
    vectors: Arc<dyn VectorStore>,
    similarity: Arc<dyn SimilarityStore>,
    trending: Arc<dyn TrendingStore>,
    books: Arc<dyn BookDataProvider>,
}

impl CleanupService {
    pub fn new(
        recommendations: Arc<dyn RecommendationStore>,
        interactions: Arc<dyn InteractionStore>,
        vectors: Arc<dyn VectorStore>,
        similarity: Arc<dyn SimilarityStore>,
        trending: Arc<dyn TrendingStore>,
        books: Arc<dyn BookDataProvider>,
    ) -> Self {
        Self {
            recommendations,
            interactions,
            vectors,
            similarity,
            trending,
            books,
        }
    }

    /// Run the selected retention passes. In dry-run mode, counts what
    /// would be deleted without mutating anything.
    pub async fn run(&self, options: &CleanupOptions) -> Result<CleanupSummary> {
        let now = Utc::now();
        let cutoff = now - Duration::days(options.days);
        let important_cutoff = now - Duration::days(options.days * IMPORTANT_RETENTION_FACTOR);

        let mut summary = CleanupSummary::default();

        if options.recommendations {
            summary.recommendation_sets = if options.dry_run {
                self.recommendations.count_sets_older_than(cutoff).await? as u64
            } else {
                self.recommendations
                    .purge_sets_older_than(cutoff, options.batch_size)
                    .await?
            };
        }

        if options.interactions {
            summary.interactions = if options.dry_run {
                let (routine, important) = self
                    .interactions
                    .count_purgeable(cutoff, important_cutoff)
                    .await?;
                (routine + important) as u64
            } else {
                self.interactions.purge(cutoff, important_cutoff).await?
            };
        }

        if options.similarity {
            summary.similarity_rows = if options.dry_run {
                self.similarity.count_stale(cutoff).await? as u64
            } else {
                self.similarity.purge_stale(cutoff).await?
            };
        }

        if options.vectors {
            summary.vectors = self.purge_orphaned_vectors(options.dry_run).await?;
        }

        if options.trending {
            summary.trending_rows = if options.dry_run {
                self.trending.count_inactive_older_than(cutoff).await? as u64
            } else {
                self.trending.purge_inactive_older_than(cutoff).await?
            };
        }

        info!(
            total = summary.total(),
            dry_run = options.dry_run,
            days = options.days,
            "Cleanup pass complete"
        );
        Ok(summary)
    }

    /// Vectors are never deleted while their book exists; only rows whose
    /// book left the catalog are removed.
    async fn purge_orphaned_vectors(&self, dry_run: bool) -> Result<u64> {
        let catalog: HashSet<_> = self.books.all_book_ids().await?.into_iter().collect();
        let stored = self.vectors.all_ids().await?;

        let mut purged = 0u64;
        for book_id in stored {
            if catalog.contains(&book_id) {
                continue;
            }
            if dry_run {
                purged += 1;
                continue;
            }
            match self.vectors.delete(book_id).await {
                Ok(true) => purged += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(book_id = %book_id, error = %err, "Failed to delete orphaned vector")
                }
            }
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{
        InMemoryInteractionStore, InMemoryRecommendationStore, InMemorySimilarityStore,
        InMemoryTrendingStore, InMemoryVectorStore,
    };
    use crate::models::{BookVector, InteractionType, UserInteraction};
    use data_providers::InMemoryBookProvider;
    use uuid::Uuid;

    struct Fixture {
        service: CleanupService,
        interactions: Arc<InMemoryInteractionStore>,
        vectors: Arc<InMemoryVectorStore>,
        books: Arc<InMemoryBookProvider>,
    }

    fn fixture() -> Fixture {
        let interactions = Arc::new(InMemoryInteractionStore::new());
        let vectors = Arc::new(InMemoryVectorStore::new());
        let books = Arc::new(InMemoryBookProvider::new());
        let service = CleanupService::new(
            Arc::new(InMemoryRecommendationStore::new()),
            interactions.clone(),
            vectors.clone(),
            Arc::new(InMemorySimilarityStore::new()),
            Arc::new(InMemoryTrendingStore::new()),
            books.clone(),
        );
        Fixture {
            service,
            interactions,
            vectors,
            books,
        }
    }

    async fn record_aged(
        store: &InMemoryInteractionStore,
        interaction_type: InteractionType,
        age_days: i64,
    ) {
        store
            .record(&UserInteraction {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                book_id: Uuid::new_v4(),
                interaction_type,
                recommendation_id: None,
                rating_value: None,
                metadata: serde_json::Value::Null,
                created_at: Utc::now() - Duration::days(age_days),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_extended_retention_for_important_interactions() {
        let fixture = fixture();

        // 120 days old: view is past 90d, rating is within 180d
        record_aged(&fixture.interactions, InteractionType::View, 120).await;
        record_aged(&fixture.interactions, InteractionType::Rating, 120).await;
        // 200 days old: rating is past even the extended window
        record_aged(&fixture.interactions, InteractionType::Bookmark, 200).await;

        let summary = fixture
            .service
            .run(&CleanupOptions {
                days: 90,
                interactions: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(summary.interactions, 2);
        assert_eq!(fixture.interactions.interaction_count(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_deleting() {
        let fixture = fixture();
        record_aged(&fixture.interactions, InteractionType::View, 120).await;

        let summary = fixture
            .service
            .run(&CleanupOptions {
                days: 90,
                interactions: true,
                dry_run: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(summary.interactions, 1);
        assert_eq!(fixture.interactions.interaction_count(), 1);
    }

    #[tokio::test]
    async fn test_orphaned_vectors_removed_live_books_kept() {
        let fixture = fixture();

        let live = Uuid::new_v4();
        fixture.books.add_book(data_providers::BookSummary {
            id: live,
            title: "Live".to_string(),
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

        for book_id in [live, Uuid::new_v4()] {
            fixture
                .vectors
                .upsert(&BookVector {
                    book_id,
                    content_vector: vec![],
                    genre_vector: vec![],
                    author_vector: vec![],
                    metadata_vector: vec![],
                    popularity_score: 0.0,
                    quality_score: 0.0,
                    recency_score: 0.0,
                    view_count: 0,
                    download_count: 0,
                    rating_average: 0.0,
                    rating_count: 0,
                    last_updated: Utc::now(),
                })
                .await
                .unwrap();
        }

        let summary = fixture
            .service
            .run(&CleanupOptions {
                vectors: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(summary.vectors, 1);
        assert_eq!(fixture.vectors.len(), 1);
        assert!(fixture.vectors.get(live).await.unwrap().is_some());
    }
}
