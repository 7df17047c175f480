use anyhow::{bail, Result};
use clap::Args;
use uuid::Uuid;

use crate::jobs::JobPayload;
use crate::services::MatrixBuildOptions;
use crate::startup::ServiceContext;

/// Rebuild the book similarity matrix.
#[derive(Debug, Args)]
pub struct CalculateSimilarityArgs {
    /// Source books per transaction batch
    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,

    /// Minimum similarity persisted
    #[arg(long, default_value_t = 0.1)]
    pub threshold: f32,

    /// Restrict to these books (comma-separated UUIDs)
    #[arg(long, value_delimiter = ',')]
    pub book_ids: Option<Vec<Uuid>>,

    /// Enqueue to the job queue instead of running inline
    #[arg(long = "async")]
    pub run_async: bool,

    /// Purge rows older than the staleness window afterwards
    #[arg(long)]
    pub clean_old: bool,

    /// Refresh book vectors before computing similarities
    #[arg(long)]
    pub update_vectors: bool,

    /// Compute without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Recalculate everything, ignoring row freshness
    #[arg(long)]
    pub force: bool,

    /// Per-book progress output
    #[arg(long)]
    pub verbose: bool,
}

impl CalculateSimilarityArgs {
    fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.threshold) {
            bail!("--threshold must be in [-1, 1], got {}", self.threshold);
        }
        if self.batch_size == 0 {
            bail!("--batch-size must be positive");
        }
        if let Some(ids) = &self.book_ids {
            if ids.is_empty() {
                bail!("--book-ids given but empty");
            }
        }
        if self.run_async && self.dry_run {
            bail!("--async and --dry-run are mutually exclusive");
        }
        Ok(())
    }
}

pub async fn execute(args: CalculateSimilarityArgs, context: &ServiceContext) -> Result<()> {
    args.validate()?;

    if args.run_async {
        let queue = context
            .queue
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Job queue unavailable, cannot dispatch --async"))?;
        queue
            .enqueue(&JobPayload::RebuildSimilarity {
                threshold: args.threshold,
                batch_size: args.batch_size,
                book_ids: args.book_ids.clone(),
                clean_old: args.clean_old,
                update_vectors: args.update_vectors,
            })
            .await?;
        println!("Similarity rebuild enqueued");
        return Ok(());
    }

    if args.update_vectors {
        let summary = context.vectors.refresh_all(args.book_ids.clone()).await?;
        println!(
            "Vectors refreshed: {} ok, {} failed",
            summary.refreshed, summary.failed
        );
    }

    let summary = context
        .matrix
        .rebuild(&MatrixBuildOptions {
            threshold: args.threshold,
            batch_size: args.batch_size,
            book_ids: args.book_ids.clone(),
            dry_run: args.dry_run,
        })
        .await?;

    if args.verbose {
        println!(
            "Processed {} source books, {} failures",
            summary.sources_processed, summary.failures
        );
    }
    println!(
        "Similarity rebuild{}: {} pairs at threshold {}",
        if args.dry_run { " (dry run)" } else { "" },
        summary.pairs_kept,
        args.threshold
    );

    if args.clean_old && !args.dry_run {
        if args.force {
            // A forced rebuild already rewrote every requested row set;
            // nothing left to age out for those sources.
            println!("--force: skipping staleness purge, rows were just recalculated");
        } else {
            let purged = context
                .matrix
                .purge_stale(context.config.recommendation.similarity_staleness_days)
                .await?;
            println!("Purged {} stale similarity rows", purged);
        }
    }

    Ok(())
}
