//! Service graph construction.
//!
//! Builds every store, provider, and service from an explicit [`Config`]
//! and database pool, and wires the event subscribers. Both the HTTP binary
//! and `coko-admin` start from here, so side effects (vector refresh on
//! book completion, cache invalidation) are registered in exactly one
//! place.

use data_providers::{BookDataProvider, PgBookProvider, PgReadingProvider, ReadingDataProvider};
use event_bus::{EventBus, EventType};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::{
    InteractionStore, PgInteractionStore, PgProfileStore, PgRecommendationStore,
    PgSimilarityStore, PgTrendingStore, PgVectorStore, ProfileStore, RecommendationStore,
    SimilarityStore, TrendingStore, VectorStore,
};
use crate::error::Result;
use crate::jobs::{JobPayload, JobQueue, JobWorker};
use crate::models::Algorithm;
use crate::services::{
    AnalysisService, CleanupService, CollaborativeGenerator, ContentBasedGenerator,
    DefaultVectorizer, FeatureVectorStore, HybridGenerator, HybridWeights, InteractionTracker,
    MatrixBuilder, PopularityGenerator, RecommendationCache, RecommendationGenerator,
    RecommendationOrchestrator, TrendingAlgorithm, TrendingService,
};

pub struct ServiceContext {
    pub config: Config,
    pub bus: Arc<EventBus>,
    pub cache: Option<RecommendationCache>,
    pub queue: Option<JobQueue>,

    pub books: Arc<dyn BookDataProvider>,
    pub reading: Arc<dyn ReadingDataProvider>,
    pub trending_store: Arc<dyn TrendingStore>,
    pub profiles: Arc<dyn ProfileStore>,

    pub vectors: Arc<FeatureVectorStore>,
    pub matrix: Arc<MatrixBuilder>,
    pub orchestrator: Arc<RecommendationOrchestrator>,
    pub trending: Arc<TrendingService>,
    pub tracker: Arc<InteractionTracker>,
    pub analysis: Arc<AnalysisService>,
    pub cleanup: Arc<CleanupService>,
}

impl ServiceContext {
    pub async fn build(config: Config, pool: PgPool) -> Result<Self> {
        let bus = Arc::new(EventBus::new());

        // Redis layers are optional at startup: the service degrades to
        // uncached, inline-only operation when Redis is down.
        let cache = match RecommendationCache::new(&config.redis.url, &config.recommendation).await
        {
            Ok(cache) => Some(cache),
            Err(err) => {
                warn!(error = %err, "Redis cache unavailable, running uncached");
                None
            }
        };
        let queue = match JobQueue::new(&config.redis.url).await {
            Ok(queue) => Some(queue),
            Err(err) => {
                warn!(error = %err, "Job queue unavailable, async dispatch disabled");
                None
            }
        };

        let books: Arc<dyn BookDataProvider> = Arc::new(PgBookProvider::new(pool.clone()));
        let reading: Arc<dyn ReadingDataProvider> = Arc::new(PgReadingProvider::new(pool.clone()));

        let vector_store: Arc<dyn VectorStore> = Arc::new(PgVectorStore::new(pool.clone()));
        let similarity_store: Arc<dyn SimilarityStore> =
            Arc::new(PgSimilarityStore::new(pool.clone()));
        let recommendation_store: Arc<dyn RecommendationStore> =
            Arc::new(PgRecommendationStore::new(pool.clone()));
        let interaction_store: Arc<dyn InteractionStore> =
            Arc::new(PgInteractionStore::new(pool.clone()));
        let profile_store: Arc<dyn ProfileStore> = Arc::new(PgProfileStore::new(pool.clone()));
        let trending_store: Arc<dyn TrendingStore> = Arc::new(PgTrendingStore::new(pool));

        let vectors = Arc::new(FeatureVectorStore::new(
            books.clone(),
            vector_store.clone(),
            Arc::new(DefaultVectorizer::new(config.app.primary_language.clone())),
        ));
        let matrix = Arc::new(MatrixBuilder::new(
            vector_store.clone(),
            similarity_store.clone(),
        ));

        let popularity = Arc::new(PopularityGenerator::new(vector_store.clone(), books.clone()));
        let content_based: Arc<dyn RecommendationGenerator> = Arc::new(ContentBasedGenerator::new(
            books.clone(),
            reading.clone(),
            similarity_store.clone(),
        ));
        let collaborative: Arc<dyn RecommendationGenerator> = Arc::new(CollaborativeGenerator::new(
            interaction_store.clone(),
            books.clone(),
            popularity.clone(),
        ));
        let weights = HybridWeights::new(
            config.recommendation.hybrid_content_weight,
            config.recommendation.hybrid_collaborative_weight,
            config.recommendation.hybrid_popularity_weight,
        );
        if let Err(err) = weights.validate() {
            return Err(crate::error::AppError::Validation(err));
        }
        let popularity_dyn: Arc<dyn RecommendationGenerator> = popularity.clone();
        let hybrid: Arc<dyn RecommendationGenerator> = Arc::new(HybridGenerator::new(
            content_based.clone(),
            collaborative.clone(),
            popularity_dyn.clone(),
            weights,
        ));

        let mut generators: HashMap<Algorithm, Arc<dyn RecommendationGenerator>> = HashMap::new();
        generators.insert(Algorithm::ContentBased, content_based);
        generators.insert(Algorithm::Collaborative, collaborative);
        generators.insert(Algorithm::Popularity, popularity_dyn.clone());
        generators.insert(Algorithm::Hybrid, hybrid);

        let orchestrator = Arc::new(RecommendationOrchestrator::new(
            generators,
            popularity_dyn,
            recommendation_store.clone(),
            profile_store.clone(),
            reading.clone(),
            bus.clone(),
            config.app.service_name.clone(),
        ));

        let trending = Arc::new(TrendingService::new(
            interaction_store.clone(),
            trending_store.clone(),
            TrendingAlgorithm::default(),
        ));

        let tracker = Arc::new(InteractionTracker::new(
            interaction_store.clone(),
            cache.clone(),
            bus.clone(),
            config.app.service_name.clone(),
        ));

        let analysis = Arc::new(AnalysisService::new(
            recommendation_store.clone(),
            interaction_store.clone(),
            vector_store.clone(),
            books.clone(),
        ));

        let cleanup = Arc::new(CleanupService::new(
            recommendation_store,
            interaction_store,
            vector_store,
            similarity_store,
            trending_store.clone(),
            books.clone(),
        ));

        let context = Self {
            config,
            bus,
            cache,
            queue,
            books,
            reading,
            trending_store,
            profiles: profile_store,
            vectors,
            matrix,
            orchestrator,
            trending,
            tracker,
            analysis,
            cleanup,
        };
        context.register_subscribers();
        Ok(context)
    }

    /// Explicit side-effect wiring: what reacts to which domain event lives
    /// here, not scattered through write paths.
    fn register_subscribers(&self) {
        if let Some(queue) = self.queue.clone() {
            self.bus.subscribe(
                EventType::BookCompleted,
                "vector-refresh-on-completion",
                Arc::new(move |event| {
                    let book_id = event
                        .data
                        .get("book_id")
                        .and_then(|v| v.as_str())
                        .and_then(|s| Uuid::parse_str(s).ok())
                        .ok_or_else(|| anyhow::anyhow!("book.completed without book_id"))?;
                    let queue = queue.clone();
                    tokio::spawn(async move {
                        if let Err(err) = queue.enqueue(&JobPayload::RefreshVector { book_id }).await
                        {
                            warn!(book_id = %book_id, error = %err, "Failed to enqueue vector refresh");
                        }
                    });
                    Ok(())
                }),
            );
        }

        if let Some(cache) = self.cache.clone() {
            self.bus.subscribe(
                EventType::ReadingGoalCompleted,
                "stats-invalidation-on-goal",
                Arc::new(move |event| {
                    let user_id = event
                        .user_id
                        .ok_or_else(|| anyhow::anyhow!("goal.completed without user_id"))?;
                    let cache = cache.clone();
                    tokio::spawn(async move {
                        if let Err(err) = cache.invalidate_user(user_id).await {
                            warn!(user_id = %user_id, error = %err, "Cache invalidation failed");
                        }
                    });
                    Ok(())
                }),
            );
        }

        info!("Event subscribers registered");
    }

    /// Worker for the Redis job queue; errors if the queue is unreachable.
    pub fn worker(&self) -> Result<JobWorker> {
        let queue = self
            .queue
            .clone()
            .ok_or_else(|| crate::error::AppError::QueueUnavailable("Redis not reachable".into()))?;
        Ok(JobWorker::new(
            queue,
            self.vectors.clone(),
            self.matrix.clone(),
            self.trending.clone(),
            self.config.recommendation.similarity_staleness_days,
        ))
    }
}
