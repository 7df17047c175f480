pub mod analysis;
pub mod cache;
pub mod cleanup;
pub mod feedback;
pub mod generators;
pub mod orchestrator;
pub mod similarity;
pub mod trending;
pub mod vectors;

pub use analysis::{AnalysisReport, AnalysisService, UserSegments};
pub use cache::RecommendationCache;
pub use cleanup::{CleanupOptions, CleanupService, CleanupSummary};
pub use feedback::InteractionTracker;
pub use generators::{
    CollaborativeGenerator, ContentBasedGenerator, GenerationRequest, HybridGenerator,
    HybridWeights, PopularityGenerator, RecommendationGenerator,
};
pub use orchestrator::RecommendationOrchestrator;
pub use similarity::{cosine_similarity, MatrixBuildOptions, MatrixBuildSummary, MatrixBuilder};
pub use trending::{TrendingAlgorithm, TrendingService, TrendingSummary};
pub use vectors::{BookVectorizer, DefaultVectorizer, FeatureVectorStore, RefreshSummary};
