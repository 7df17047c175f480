//! Recommendation orchestrator.
//!
//! Selects a generator, applies exclusions, backfills from popularity when
//! the primary strategy comes up short, and records the resulting set. A
//! user-facing request never errors out of this module: every failure path
//! degrades to a smaller (possibly popularity-only) list.

use chrono::{Duration, Utc};
use data_providers::ReadingDataProvider;
use event_bus::{EventBus, EventType};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{ProfileStore, RecommendationStore};
use crate::error::Result;
use crate::models::{
    Algorithm, Recommendation, RecommendationContext, RecommendationOutcome, RecommendationSet,
    ScoredBook, UserProfile,
};
use crate::services::generators::{GenerationRequest, RecommendationGenerator};

/// Books recommended within this window are excluded from new sets.
const DEFAULT_EXCLUSION_WINDOW_DAYS: i64 = 7;

pub struct RecommendationOrchestrator {
    generators: HashMap<Algorithm, Arc<dyn RecommendationGenerator>>,
    fallback: Arc<dyn RecommendationGenerator>,
    store: Arc<dyn RecommendationStore>,
    profiles: Arc<dyn ProfileStore>,
    reading: Arc<dyn ReadingDataProvider>,
    bus: Arc<EventBus>,
    service_name: String,
    exclusion_window_days: i64,
}

impl RecommendationOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        generators: HashMap<Algorithm, Arc<dyn RecommendationGenerator>>,
        fallback: Arc<dyn RecommendationGenerator>,
        store: Arc<dyn RecommendationStore>,
        profiles: Arc<dyn ProfileStore>,
        reading: Arc<dyn ReadingDataProvider>,
        bus: Arc<EventBus>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            generators,
            fallback,
            store,
            profiles,
            reading,
            bus,
            service_name: service_name.into(),
            exclusion_window_days: DEFAULT_EXCLUSION_WINDOW_DAYS,
        }
    }

    pub async fn generate_personalized_recommendations(
        &self,
        user_id: Uuid,
        algorithm: Algorithm,
        count: usize,
        context: RecommendationContext,
    ) -> Result<RecommendationOutcome> {
        if count == 0 {
            return Ok(empty_outcome(algorithm));
        }

        let profile = match self.profiles.get(user_id).await {
            Ok(Some(profile)) => profile,
            Ok(None) => UserProfile::default_for(user_id),
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "Profile lookup failed, using defaults");
                UserProfile::default_for(user_id)
            }
        };

        if !profile.enable_recommendations {
            info!(user_id = %user_id, "Recommendations disabled by user setting");
            return Ok(empty_outcome(algorithm));
        }

        let exclude = self.build_exclusion_set(user_id).await;
        let request = GenerationRequest::new(user_id, profile, exclude, count, context);

        let primary = self
            .generators
            .get(&algorithm)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone());

        let primary_results = match primary.generate(&request).await {
            Ok(results) => results,
            Err(err) => {
                warn!(
                    user_id = %user_id,
                    algorithm = %algorithm,
                    error = %err,
                    "Primary generator failed, backfilling"
                );
                Vec::new()
            }
        };

        let backfill = if primary_results.len() < count
            && primary.algorithm() != self.fallback.algorithm()
        {
            let mut backfill_exclude = request.exclude.clone();
            backfill_exclude.extend(primary_results.iter().map(|s| s.book.id));
            let backfill_request = GenerationRequest {
                exclude: backfill_exclude,
                count: count - primary_results.len(),
                ..request.clone()
            };
            match self.fallback.generate(&backfill_request).await {
                Ok(results) => results,
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "Fallback generator failed");
                    Vec::new()
                }
            }
        } else {
            Vec::new()
        };

        let algorithm_used = if primary_results.is_empty() && !backfill.is_empty() {
            self.fallback.algorithm()
        } else {
            algorithm
        };

        let books = merge_candidates(primary_results, backfill, &request.exclude, count);
        if books.is_empty() {
            info!(user_id = %user_id, algorithm = %algorithm, "No candidates available");
            return Ok(empty_outcome(algorithm_used));
        }

        let confidence_score = mean_score(&books);
        let set_id = self
            .persist_set(user_id, algorithm_used, context, confidence_score, &books)
            .await;

        self.bus.publish_event(
            EventType::RecommendationsGenerated,
            serde_json::json!({
                "set_id": set_id,
                "algorithm": algorithm_used.as_str(),
                "context": context.as_str(),
                "count": books.len(),
            }),
            Some(user_id),
            &self.service_name,
        );

        Ok(RecommendationOutcome {
            set_id,
            books,
            algorithm_used,
            confidence_score,
        })
    }

    /// Completed books plus anything recommended within the exclusion
    /// window. Unavailable sources contribute nothing rather than failing
    /// the request.
    async fn build_exclusion_set(&self, user_id: Uuid) -> HashSet<Uuid> {
        let mut exclude = HashSet::new();

        match self.reading.get_user_completed_books(user_id).await {
            Ok(records) => exclude.extend(records.into_iter().map(|r| r.book_id)),
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "Completed-books lookup failed")
            }
        }

        let since = Utc::now() - Duration::days(self.exclusion_window_days);
        match self.store.recent_recommended_book_ids(user_id, since).await {
            Ok(ids) => exclude.extend(ids),
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "Recent-recommendation lookup failed")
            }
        }

        exclude
    }

    async fn persist_set(
        &self,
        user_id: Uuid,
        algorithm: Algorithm,
        context: RecommendationContext,
        confidence_score: f32,
        books: &[ScoredBook],
    ) -> Option<Uuid> {
        let set = RecommendationSet {
            id: Uuid::new_v4(),
            user_id,
            algorithm,
            context,
            confidence_score,
            created_at: Utc::now(),
        };
        let items: Vec<Recommendation> = books
            .iter()
            .enumerate()
            .map(|(index, scored)| Recommendation {
                id: Uuid::new_v4(),
                set_id: set.id,
                book_id: scored.book.id,
                rank: (index + 1) as i32,
                score: scored.score,
                reasons: scored.reasons.clone(),
            })
            .collect();

        match self.store.insert_set(&set, &items).await {
            Ok(()) => Some(set.id),
            Err(err) => {
                // The user still gets their list; only the record is lost.
                warn!(user_id = %user_id, error = %err, "Failed to persist recommendation set");
                None
            }
        }
    }
}

fn empty_outcome(algorithm: Algorithm) -> RecommendationOutcome {
    RecommendationOutcome {
        set_id: None,
        books: Vec::new(),
        algorithm_used: algorithm,
        confidence_score: 0.0,
    }
}

/// Primary results keep their order; backfill fills remaining slots.
/// Duplicates and excluded books are dropped.
pub fn merge_candidates(
    primary: Vec<ScoredBook>,
    backfill: Vec<ScoredBook>,
    exclude: &HashSet<Uuid>,
    count: usize,
) -> Vec<ScoredBook> {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(count);
    for candidate in primary.into_iter().chain(backfill) {
        if merged.len() >= count {
            break;
        }
        if exclude.contains(&candidate.book.id) {
            continue;
        }
        if seen.insert(candidate.book.id) {
            merged.push(candidate);
        }
    }
    merged
}

fn mean_score(books: &[ScoredBook]) -> f32 {
    if books.is_empty() {
        return 0.0;
    }
    books.iter().map(|s| s.score).sum::<f32>() / books.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{
        InMemoryProfileStore, InMemoryRecommendationStore, InMemoryVectorStore,
    };
    use crate::db::VectorStore;
    use crate::models::BookVector;
    use crate::services::generators::PopularityGenerator;
    use async_trait::async_trait;
    use data_providers::{BookSummary, InMemoryBookProvider, InMemoryReadingProvider};

    struct FixedGenerator {
        algorithm: Algorithm,
        candidates: Vec<ScoredBook>,
    }

    #[async_trait]
    impl RecommendationGenerator for FixedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ScoredBook>> {
            Ok(self
                .candidates
                .iter()
                .filter(|c| !request.exclude.contains(&c.book.id))
                .take(request.count)
                .cloned()
                .collect())
        }

        fn algorithm(&self) -> Algorithm {
            self.algorithm
        }
    }

    fn book_summary(id: Uuid) -> BookSummary {
        BookSummary {
            id,
            title: "t".to_string(),
            authors: vec![],
            categories: vec!["Fiction".to_string()],
            language: Some("en".to_string()),
            average_rating: 4.0,
            ratings_count: 5,
            view_count: 40,
            download_count: 2,
            published_at: Some(Utc::now()),
            cover_image: None,
        }
    }

    fn scored(id: Uuid, score: f32) -> ScoredBook {
        ScoredBook {
            book: book_summary(id),
            score,
            reasons: vec!["test".to_string()],
        }
    }

    struct Fixture {
        books: Arc<InMemoryBookProvider>,
        vectors: Arc<InMemoryVectorStore>,
        store: Arc<InMemoryRecommendationStore>,
        profiles: Arc<InMemoryProfileStore>,
        reading: Arc<InMemoryReadingProvider>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                books: Arc::new(InMemoryBookProvider::new()),
                vectors: Arc::new(InMemoryVectorStore::new()),
                store: Arc::new(InMemoryRecommendationStore::new()),
                profiles: Arc::new(InMemoryProfileStore::new()),
                reading: Arc::new(InMemoryReadingProvider::new()),
            }
        }

        async fn seed_popular(&self, n: usize) -> Vec<Uuid> {
            let mut ids = Vec::new();
            for index in 0..n {
                let id = Uuid::new_v4();
                self.books.add_book(book_summary(id));
                self.vectors
                    .upsert(&BookVector {
                        book_id: id,
                        content_vector: vec![1.0],
                        genre_vector: vec![1.0],
                        author_vector: vec![1.0],
                        metadata_vector: vec![0.1, 1.0, 0.5],
                        popularity_score: 0.9 - index as f32 * 0.1,
                        quality_score: 0.8,
                        recency_score: 0.5,
                        view_count: 0,
                        download_count: 0,
                        rating_average: 0.0,
                        rating_count: 0,
                        last_updated: Utc::now(),
                    })
                    .await
                    .unwrap();
                ids.push(id);
            }
            ids
        }

        fn orchestrator(
            &self,
            primary: Option<Arc<dyn RecommendationGenerator>>,
        ) -> RecommendationOrchestrator {
            let fallback: Arc<dyn RecommendationGenerator> = Arc::new(PopularityGenerator::new(
                self.vectors.clone(),
                self.books.clone(),
            ));
            let mut generators: HashMap<Algorithm, Arc<dyn RecommendationGenerator>> =
                HashMap::new();
            if let Some(primary) = primary {
                generators.insert(primary.algorithm(), primary);
            }
            generators.insert(Algorithm::Popularity, fallback.clone());
            RecommendationOrchestrator::new(
                generators,
                fallback,
                self.store.clone(),
                self.profiles.clone(),
                self.reading.clone(),
                Arc::new(EventBus::new()),
                "recommendation-service",
            )
        }
    }

    #[tokio::test]
    async fn test_backfills_when_primary_comes_up_short() {
        let fixture = Fixture::new();
        fixture.seed_popular(5).await;

        // Primary can only produce two candidates
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let primary: Arc<dyn RecommendationGenerator> = Arc::new(FixedGenerator {
            algorithm: Algorithm::ContentBased,
            candidates: vec![scored(a, 0.9), scored(b, 0.7)],
        });

        let orchestrator = fixture.orchestrator(Some(primary));
        let outcome = orchestrator
            .generate_personalized_recommendations(
                Uuid::new_v4(),
                Algorithm::ContentBased,
                5,
                RecommendationContext::General,
            )
            .await
            .unwrap();

        assert_eq!(outcome.books.len(), 5);
        assert_eq!(outcome.algorithm_used, Algorithm::ContentBased);
        assert_eq!(outcome.books[0].book.id, a);
        assert_eq!(outcome.books[1].book.id, b);
        assert!(outcome.set_id.is_some());
        assert_eq!(fixture.store.set_count(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_popularity_on_empty_primary() {
        let fixture = Fixture::new();
        fixture.seed_popular(3).await;

        let primary: Arc<dyn RecommendationGenerator> = Arc::new(FixedGenerator {
            algorithm: Algorithm::Collaborative,
            candidates: vec![],
        });

        let orchestrator = fixture.orchestrator(Some(primary));
        let outcome = orchestrator
            .generate_personalized_recommendations(
                Uuid::new_v4(),
                Algorithm::Collaborative,
                5,
                RecommendationContext::General,
            )
            .await
            .unwrap();

        // Non-empty because popular books exist
        assert!(!outcome.books.is_empty());
        assert_eq!(outcome.algorithm_used, Algorithm::Popularity);
    }

    #[tokio::test]
    async fn test_result_never_exceeds_count_or_contains_exclusions() {
        let fixture = Fixture::new();
        let ids = fixture.seed_popular(6).await;

        // The user already completed the two most popular books
        let user = Uuid::new_v4();
        let now = Utc::now();
        for &book_id in &ids[..2] {
            fixture.reading.add_record(data_providers::ReadingRecord {
                user_id: user,
                book_id,
                status: data_providers::ReadingStatus::Completed,
                progress_percent: 100.0,
                started_at: now,
                finished_at: Some(now),
                last_read_at: now,
            });
        }

        let orchestrator = fixture.orchestrator(None);
        let outcome = orchestrator
            .generate_personalized_recommendations(
                user,
                Algorithm::Popularity,
                3,
                RecommendationContext::General,
            )
            .await
            .unwrap();

        assert!(outcome.books.len() <= 3);
        for scored in &outcome.books {
            assert!(!ids[..2].contains(&scored.book.id));
        }
    }

    #[tokio::test]
    async fn test_confidence_is_mean_of_item_scores() {
        let fixture = Fixture::new();
        let primary: Arc<dyn RecommendationGenerator> = Arc::new(FixedGenerator {
            algorithm: Algorithm::ContentBased,
            candidates: vec![scored(Uuid::new_v4(), 0.8), scored(Uuid::new_v4(), 0.4)],
        });

        let orchestrator = fixture.orchestrator(Some(primary));
        let outcome = orchestrator
            .generate_personalized_recommendations(
                Uuid::new_v4(),
                Algorithm::ContentBased,
                2,
                RecommendationContext::General,
            )
            .await
            .unwrap();

        assert!((outcome.confidence_score - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_disabled_recommendations_yield_empty_without_persisting() {
        let fixture = Fixture::new();
        fixture.seed_popular(3).await;

        let user = Uuid::new_v4();
        let mut profile = UserProfile::default_for(user);
        profile.enable_recommendations = false;
        fixture.profiles.upsert(&profile).await.unwrap();

        let orchestrator = fixture.orchestrator(None);
        let outcome = orchestrator
            .generate_personalized_recommendations(
                user,
                Algorithm::Popularity,
                5,
                RecommendationContext::General,
            )
            .await
            .unwrap();

        assert!(outcome.books.is_empty());
        assert!(outcome.set_id.is_none());
        assert_eq!(fixture.store.set_count(), 0);
    }

    #[test]
    fn test_merge_candidates_dedups_and_truncates() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let merged = merge_candidates(
            vec![scored(a, 0.9), scored(b, 0.8)],
            vec![scored(a, 0.5), scored(c, 0.4)],
            &HashSet::new(),
            2,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].book.id, a);
        assert_eq!(merged[1].book.id, b);
    }
}
