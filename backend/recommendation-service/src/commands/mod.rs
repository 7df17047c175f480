//! `coko-admin` subcommand implementations.
//!
//! Each command validates its flags before touching any data, runs inline
//! by default, and enqueues to the job queue when `--async` is given.
//! Commands are the one layer that surfaces hard failures: they return
//! errors (non-zero exit) instead of degrading.

pub mod analyze_recommendations;
pub mod calculate_similarity;
pub mod cleanup_recommendations;
pub mod update_trending;

pub use analyze_recommendations::AnalyzeRecommendationsArgs;
pub use calculate_similarity::CalculateSimilarityArgs;
pub use cleanup_recommendations::CleanupRecommendationsArgs;
pub use update_trending::UpdateTrendingArgs;
