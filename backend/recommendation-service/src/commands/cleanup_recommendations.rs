use anyhow::{bail, Result};
use clap::Args;

use crate::services::CleanupOptions;
use crate::startup::ServiceContext;

/// Retention cleanup across recommendation state.
#[derive(Debug, Args)]
pub struct CleanupRecommendationsArgs {
    /// Retention window in days (important interactions get twice this)
    #[arg(long, default_value_t = 90)]
    pub days: i64,

    /// Purge recommendation sets past retention
    #[arg(long)]
    pub recommendations: bool,

    /// Purge interactions past retention
    #[arg(long)]
    pub interactions: bool,

    /// Remove vectors for books no longer in the catalog
    #[arg(long)]
    pub vectors: bool,

    /// Purge similarity rows past retention
    #[arg(long)]
    pub similarity: bool,

    /// Purge superseded trending rows past retention
    #[arg(long)]
    pub trending: bool,

    /// All of the above
    #[arg(long)]
    pub all: bool,

    /// Rows per delete batch
    #[arg(long, default_value_t = 500)]
    pub batch_size: i64,

    /// Count without deleting
    #[arg(long)]
    pub dry_run: bool,

    /// Required for actual deletion
    #[arg(long)]
    pub force: bool,

    /// Also flush the service's Redis keys
    #[arg(long)]
    pub clear_cache: bool,
}

pub async fn execute(args: CleanupRecommendationsArgs, context: &ServiceContext) -> Result<()> {
    let options = CleanupOptions {
        days: args.days,
        recommendations: args.recommendations || args.all,
        interactions: args.interactions || args.all,
        vectors: args.vectors || args.all,
        similarity: args.similarity || args.all,
        trending: args.trending || args.all,
        batch_size: args.batch_size,
        dry_run: args.dry_run,
    };

    // Validation before any mutation
    if args.days <= 0 {
        bail!("--days must be positive");
    }
    if args.batch_size <= 0 {
        bail!("--batch-size must be positive");
    }
    if !options.any_entity() && !args.clear_cache {
        bail!(
            "Nothing selected: pass at least one of --recommendations, --interactions, \
             --vectors, --similarity, --trending, --all, or --clear-cache"
        );
    }
    if options.any_entity() && !args.dry_run && !args.force {
        bail!("Refusing to delete without --force (use --dry-run to preview)");
    }

    if options.any_entity() {
        let summary = context.cleanup.run(&options).await?;
        let label = if args.dry_run { "would delete" } else { "deleted" };
        println!("Cleanup ({} days retention), {}:", args.days, label);
        println!("  recommendation sets: {}", summary.recommendation_sets);
        println!("  interactions:        {}", summary.interactions);
        println!("  vectors:             {}", summary.vectors);
        println!("  similarity rows:     {}", summary.similarity_rows);
        println!("  trending rows:       {}", summary.trending_rows);
        println!("  total:               {}", summary.total());
    }

    if args.clear_cache {
        match &context.cache {
            Some(cache) if !args.dry_run => {
                let cleared = cache.clear_all().await?;
                println!("Cleared {} cache keys", cleared);
            }
            Some(_) => println!("Cache clear skipped (dry run)"),
            None => bail!("--clear-cache requested but Redis is unavailable"),
        }
    }

    Ok(())
}
