//! End-to-end recommendation pipeline over in-memory stores: vector
//! refresh → similarity rebuild → generation → orchestration → persisted
//! set, without a database.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use data_providers::{
    BookDataProvider, BookSummary, InMemoryBookProvider, InMemoryReadingProvider, ReadingRecord,
    ReadingStatus,
};
use event_bus::{EventBus, EventType};
use recommendation_service::db::memory::{
    InMemoryInteractionStore, InMemoryProfileStore, InMemoryRecommendationStore,
    InMemorySimilarityStore, InMemoryVectorStore,
};
use recommendation_service::db::{ProfileStore, RecommendationStore, SimilarityStore, VectorStore};
use recommendation_service::models::{
    Algorithm, RecommendationContext, UserProfile,
};
use recommendation_service::services::{
    CollaborativeGenerator, ContentBasedGenerator, DefaultVectorizer, FeatureVectorStore,
    HybridGenerator, HybridWeights, MatrixBuildOptions, MatrixBuilder, PopularityGenerator,
    RecommendationGenerator, RecommendationOrchestrator,
};

struct Platform {
    books: Arc<InMemoryBookProvider>,
    reading: Arc<InMemoryReadingProvider>,
    vectors: Arc<InMemoryVectorStore>,
    similarity: Arc<InMemorySimilarityStore>,
    interactions: Arc<InMemoryInteractionStore>,
    recommendations: Arc<InMemoryRecommendationStore>,
    profiles: Arc<InMemoryProfileStore>,
}

impl Platform {
    fn new() -> Self {
        Self {
            books: Arc::new(InMemoryBookProvider::new()),
            reading: Arc::new(InMemoryReadingProvider::new()),
            vectors: Arc::new(InMemoryVectorStore::new()),
            similarity: Arc::new(InMemorySimilarityStore::new()),
            interactions: Arc::new(InMemoryInteractionStore::new()),
            recommendations: Arc::new(InMemoryRecommendationStore::new()),
            profiles: Arc::new(InMemoryProfileStore::new()),
        }
    }

    fn add_book(&self, title: &str, genre: &str, views: i64, rating: f32) -> Uuid {
        let id = Uuid::new_v4();
        self.books.add_book(BookSummary {
            id,
            title: title.to_string(),
            authors: vec!["Buchi Emecheta".to_string()],
            categories: vec![genre.to_string()],
            language: Some("en".to_string()),
            average_rating: rating,
            ratings_count: if rating > 0.0 { 12 } else { 0 },
            view_count: views,
            download_count: views / 10,
            published_at: Some(Utc::now() - chrono::Duration::days(120)),
            cover_image: None,
        });
        id
    }

    async fn refresh_vectors_and_matrix(&self) {
        let vector_service = FeatureVectorStore::new(
            self.books.clone(),
            self.vectors.clone(),
            Arc::new(DefaultVectorizer::new("en")),
        );
        vector_service.refresh_all(None).await.unwrap();

        let builder = MatrixBuilder::new(self.vectors.clone(), self.similarity.clone());
        builder
            .rebuild(&MatrixBuildOptions::default())
            .await
            .unwrap();
    }

    fn orchestrator(&self) -> RecommendationOrchestrator {
        let popularity = Arc::new(PopularityGenerator::new(
            self.vectors.clone(),
            self.books.clone(),
        ));
        let content_based: Arc<dyn RecommendationGenerator> = Arc::new(ContentBasedGenerator::new(
            self.books.clone(),
            self.reading.clone(),
            self.similarity.clone(),
        ));
        let collaborative: Arc<dyn RecommendationGenerator> = Arc::new(CollaborativeGenerator::new(
            self.interactions.clone(),
            self.books.clone(),
            popularity.clone(),
        ));
        let popularity_dyn: Arc<dyn RecommendationGenerator> = popularity;
        let hybrid: Arc<dyn RecommendationGenerator> = Arc::new(HybridGenerator::new(
            content_based.clone(),
            collaborative.clone(),
            popularity_dyn.clone(),
            HybridWeights::balanced(),
        ));

        let mut generators: HashMap<Algorithm, Arc<dyn RecommendationGenerator>> = HashMap::new();
        generators.insert(Algorithm::ContentBased, content_based);
        generators.insert(Algorithm::Collaborative, collaborative);
        generators.insert(Algorithm::Popularity, popularity_dyn.clone());
        generators.insert(Algorithm::Hybrid, hybrid);

        RecommendationOrchestrator::new(
            generators,
            popularity_dyn,
            self.recommendations.clone(),
            self.profiles.clone(),
            self.reading.clone(),
            Arc::new(EventBus::new()),
            "recommendation-service",
        )
    }
}

#[tokio::test]
async fn test_full_pipeline_produces_persisted_set() {
    let platform = Platform::new();
    for index in 0..8 {
        platform.add_book(
            &format!("Fiction Volume {}", index),
            "Fiction",
            100 - index * 10,
            4.0,
        );
    }
    platform.refresh_vectors_and_matrix().await;

    let orchestrator = platform.orchestrator();
    let user = Uuid::new_v4();
    let outcome = orchestrator
        .generate_personalized_recommendations(
            user,
            Algorithm::Hybrid,
            5,
            RecommendationContext::General,
        )
        .await
        .unwrap();

    assert_eq!(outcome.books.len(), 5);
    assert!(outcome.confidence_score > 0.0);
    assert!(outcome.set_id.is_some());
    assert_eq!(platform.recommendations.set_count(), 1);

    // The persisted set mirrors the returned ranking
    let sets = platform
        .recommendations
        .sets_since(Utc::now() - chrono::Duration::hours(1), None, Some(user))
        .await
        .unwrap();
    assert_eq!(sets.len(), 1);
    let items = platform
        .recommendations
        .items_for_sets(&[sets[0].id])
        .await
        .unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items[0].rank, 1);
    assert_eq!(items[0].book_id, outcome.books[0].book.id);
}

#[tokio::test]
async fn test_content_based_backfills_from_popularity() {
    let platform = Platform::new();

    // Two Fiction books the user hasn't read, plus unrelated popular books
    platform.add_book("Fiction One", "Fiction", 40, 4.2);
    platform.add_book("Fiction Two", "Fiction", 35, 4.0);
    platform.add_book("Tech Hit", "Technology", 90, 4.5);
    platform.add_book("Science Hit", "Science", 85, 4.4);
    platform.add_book("History Hit", "History", 80, 4.3);
    platform.refresh_vectors_and_matrix().await;

    let user = Uuid::new_v4();
    platform
        .profiles
        .upsert(&UserProfile {
            preferred_genres: vec!["Fiction".to_string()],
            ..UserProfile::default_for(user)
        })
        .await
        .unwrap();

    let orchestrator = platform.orchestrator();
    let outcome = orchestrator
        .generate_personalized_recommendations(
            user,
            Algorithm::ContentBased,
            5,
            RecommendationContext::General,
        )
        .await
        .unwrap();

    // Two genre matches plus popularity backfill fills the request
    assert_eq!(outcome.books.len(), 5);
    assert_eq!(outcome.algorithm_used, Algorithm::ContentBased);

    let unique: std::collections::HashSet<Uuid> =
        outcome.books.iter().map(|s| s.book.id).collect();
    assert_eq!(unique.len(), 5, "no duplicate books in a set");
}

#[tokio::test]
async fn test_completed_books_never_recommended() {
    let platform = Platform::new();
    let read = platform.add_book("Already Read", "Fiction", 100, 4.8);
    for index in 0..4 {
        platform.add_book(&format!("Unread {}", index), "Fiction", 50 - index, 4.0);
    }
    platform.refresh_vectors_and_matrix().await;

    let user = Uuid::new_v4();
    let now = Utc::now();
    platform.reading.add_record(ReadingRecord {
        user_id: user,
        book_id: read,
        status: ReadingStatus::Completed,
        progress_percent: 100.0,
        started_at: now,
        finished_at: Some(now),
        last_read_at: now,
    });

    let orchestrator = platform.orchestrator();
    for algorithm in Algorithm::all() {
        let outcome = orchestrator
            .generate_personalized_recommendations(
                user,
                algorithm,
                10,
                RecommendationContext::General,
            )
            .await
            .unwrap();
        assert!(
            outcome.books.iter().all(|s| s.book.id != read),
            "{} recommended an already-read book",
            algorithm
        );
    }
}

#[tokio::test]
async fn test_similarity_rows_power_content_recommendations() {
    let platform = Platform::new();
    let seed = platform.add_book("Things Fall Apart", "Fiction", 60, 4.6);
    let neighbor = platform.add_book("Arrow of God", "Fiction", 40, 4.4);
    platform.add_book("Unrelated Manual", "Technology", 10, 3.0);
    platform.refresh_vectors_and_matrix().await;

    // Same-genre neighbor ranks above the unrelated book in the matrix
    let similar = platform.similarity.most_similar(seed, 5).await.unwrap();
    assert!(!similar.is_empty());
    assert_eq!(similar[0].similar_book_id, neighbor);

    // And a reader who finished the seed gets the neighbor
    let user = Uuid::new_v4();
    let now = Utc::now();
    platform.reading.add_record(ReadingRecord {
        user_id: user,
        book_id: seed,
        status: ReadingStatus::Completed,
        progress_percent: 100.0,
        started_at: now,
        finished_at: Some(now),
        last_read_at: now,
    });

    let orchestrator = platform.orchestrator();
    let outcome = orchestrator
        .generate_personalized_recommendations(
            user,
            Algorithm::ContentBased,
            2,
            RecommendationContext::PostCompletion,
        )
        .await
        .unwrap();

    assert!(outcome.books.iter().any(|s| s.book.id == neighbor));
    assert!(outcome
        .books
        .iter()
        .find(|s| s.book.id == neighbor)
        .unwrap()
        .reasons
        .iter()
        .any(|r| r.contains("recent reading")));
}

#[tokio::test]
async fn test_recommendations_generated_event_published() {
    let platform = Platform::new();
    platform.add_book("Popular", "Fiction", 50, 4.0);
    platform.refresh_vectors_and_matrix().await;

    let bus = Arc::new(EventBus::new());
    let events = Arc::new(std::sync::Mutex::new(Vec::new()));
    {
        let events = events.clone();
        bus.subscribe(
            EventType::RecommendationsGenerated,
            "capture",
            Arc::new(move |event| {
                events.lock().unwrap().push(event.clone());
                Ok(())
            }),
        );
    }

    let popularity = Arc::new(PopularityGenerator::new(
        platform.vectors.clone(),
        platform.books.clone(),
    ));
    let popularity_dyn: Arc<dyn RecommendationGenerator> = popularity;
    let orchestrator = RecommendationOrchestrator::new(
        HashMap::new(),
        popularity_dyn,
        platform.recommendations.clone(),
        platform.profiles.clone(),
        platform.reading.clone(),
        bus,
        "recommendation-service",
    );

    let user = Uuid::new_v4();
    orchestrator
        .generate_personalized_recommendations(
            user,
            Algorithm::Popularity,
            3,
            RecommendationContext::General,
        )
        .await
        .unwrap();

    let captured = events.lock().unwrap();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].user_id, Some(user));
    assert_eq!(captured[0].source_service, "recommendation-service");
}

#[tokio::test]
async fn test_max_view_count_drives_popularity_normalization() {
    let platform = Platform::new();
    let top = platform.add_book("Chart Topper", "Fiction", 200, 4.0);
    platform.add_book("Middling", "Fiction", 100, 4.0);

    let vector_service = FeatureVectorStore::new(
        platform.books.clone(),
        platform.vectors.clone(),
        Arc::new(DefaultVectorizer::new("en")),
    );
    vector_service.refresh_all(None).await.unwrap();

    assert_eq!(platform.books.max_view_count().await.unwrap(), 200);
    let top_vector = platform.vectors.get(top).await.unwrap().unwrap();
    assert_eq!(top_vector.popularity_score, 1.0);
}
