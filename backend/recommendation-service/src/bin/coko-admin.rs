//! Management CLI for the recommendation service.
//!
//! Batch maintenance that the HTTP surface deliberately does not expose:
//! similarity rebuilds, trending snapshots, engagement analysis, retention
//! cleanup, and the queue worker. Exit code 0 on success, non-zero on any
//! unhandled failure.

use anyhow::Result;
use clap::{Parser, Subcommand};

use recommendation_service::commands::{
    analyze_recommendations, calculate_similarity, cleanup_recommendations, update_trending,
    AnalyzeRecommendationsArgs, CalculateSimilarityArgs, CleanupRecommendationsArgs,
    UpdateTrendingArgs,
};
use recommendation_service::{Config, ServiceContext};

#[derive(Parser)]
#[command(
    name = "coko-admin",
    version,
    about = "Coko recommendation service administration",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the book similarity matrix
    CalculateSimilarity(CalculateSimilarityArgs),

    /// Recompute trending snapshots
    UpdateTrending(UpdateTrendingArgs),

    /// Report recommendation engagement metrics
    AnalyzeRecommendations(AnalyzeRecommendationsArgs),

    /// Retention cleanup across recommendation state
    CleanupRecommendations(CleanupRecommendationsArgs),

    /// Drain the background job queue
    Worker,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log level comes from RUST_LOG; batch output itself goes to stdout.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_target(false)
        .init();

    let config = Config::from_env()?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;

    let context = ServiceContext::build(config, pool).await?;

    match cli.command {
        Commands::CalculateSimilarity(args) => {
            calculate_similarity::execute(args, &context).await?
        }
        Commands::UpdateTrending(args) => update_trending::execute(args, &context).await?,
        Commands::AnalyzeRecommendations(args) => {
            analyze_recommendations::execute(args, &context).await?
        }
        Commands::CleanupRecommendations(args) => {
            cleanup_recommendations::execute(args, &context).await?
        }
        Commands::Worker => {
            let worker = context.worker()?;
            worker.run().await?;
        }
    }

    Ok(())
}
