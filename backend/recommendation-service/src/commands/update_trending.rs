use anyhow::{bail, Result};
use chrono::{Duration, Utc};
use clap::Args;
use std::str::FromStr;

use crate::db::TrendingStore as _;
use crate::jobs::JobPayload;
use crate::models::{TrendPeriod, TrendType};
use crate::startup::ServiceContext;

/// Skip recomputation when the active snapshot is younger than this,
/// unless --force.
const FRESH_SNAPSHOT_MINUTES: i64 = 60;

/// Recompute trending snapshots.
#[derive(Debug, Args)]
pub struct UpdateTrendingArgs {
    /// daily | weekly | monthly (default: all)
    #[arg(long)]
    pub period: Option<String>,

    /// most_viewed | most_downloaded | highest_rated | rising (default: all)
    #[arg(long)]
    pub trend_type: Option<String>,

    /// Snapshot size
    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Interaction floor for inclusion
    #[arg(long, default_value_t = 10)]
    pub min_interactions: i64,

    /// Enqueue to the job queue instead of running inline
    #[arg(long = "async")]
    pub run_async: bool,

    /// Recompute even when the active snapshot is fresh
    #[arg(long)]
    pub force: bool,

    /// Compute without writing
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: UpdateTrendingArgs, context: &ServiceContext) -> Result<()> {
    // Flag validation happens before any mutation
    let periods: Vec<TrendPeriod> = match &args.period {
        Some(raw) => vec![TrendPeriod::from_str(raw)?],
        None => TrendPeriod::all().to_vec(),
    };
    let trend_types: Vec<TrendType> = match &args.trend_type {
        Some(raw) => vec![TrendType::from_str(raw)?],
        None => TrendType::all().to_vec(),
    };
    if args.limit == 0 {
        bail!("--limit must be positive");
    }
    if args.min_interactions < 0 {
        bail!("--min-interactions must be non-negative");
    }
    if args.run_async && args.dry_run {
        bail!("--async and --dry-run are mutually exclusive");
    }

    for period in &periods {
        for trend_type in &trend_types {
            if args.run_async {
                let queue = context.queue.as_ref().ok_or_else(|| {
                    anyhow::anyhow!("Job queue unavailable, cannot dispatch --async")
                })?;
                queue
                    .enqueue(&JobPayload::UpdateTrending {
                        period: *period,
                        trend_type: *trend_type,
                        limit: args.limit,
                        min_interactions: args.min_interactions,
                    })
                    .await?;
                println!("Enqueued trending update {}/{}", period, trend_type);
                continue;
            }

            if !args.force && !args.dry_run {
                let active = context.trending_store.get_active(*period, *trend_type, 1).await?;
                if let Some(head) = active.first() {
                    let age = Utc::now() - head.computed_at;
                    if age < Duration::minutes(FRESH_SNAPSHOT_MINUTES) {
                        println!(
                            "Skipping {}/{}: snapshot is {}m old (use --force)",
                            period,
                            trend_type,
                            age.num_minutes()
                        );
                        continue;
                    }
                }
            }

            let summary = context
                .trending
                .update(
                    *period,
                    *trend_type,
                    args.limit,
                    args.min_interactions,
                    args.dry_run,
                )
                .await?;
            println!(
                "Trending {}/{}{}: {} of {} candidates ranked",
                period,
                trend_type,
                if args.dry_run { " (dry run)" } else { "" },
                summary.persisted,
                summary.candidates
            );
        }
    }

    Ok(())
}
