use anyhow::Result;
use clap::Args;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::{Algorithm, TrendPeriod};
use crate::startup::ServiceContext;

/// Report recommendation engagement metrics.
#[derive(Debug, Args)]
pub struct AnalyzeRecommendationsArgs {
    /// daily | weekly | monthly
    #[arg(long, default_value = "weekly")]
    pub period: String,

    /// Restrict to one algorithm
    #[arg(long)]
    pub algorithm: Option<String>,

    /// Restrict to one user
    #[arg(long)]
    pub user_id: Option<Uuid>,

    /// Include the quality metrics breakdown
    #[arg(long)]
    pub detailed: bool,

    /// Write the report as JSON to this path
    #[arg(long)]
    pub export: Option<String>,

    /// Per-algorithm engagement comparison
    #[arg(long)]
    pub compare_algorithms: bool,

    /// Active-user segmentation
    #[arg(long)]
    pub user_segments: bool,
}

pub async fn execute(args: AnalyzeRecommendationsArgs, context: &ServiceContext) -> Result<()> {
    let period = TrendPeriod::from_str(&args.period)?;
    let algorithm = args
        .algorithm
        .as_deref()
        .map(Algorithm::from_str)
        .transpose()?;

    let report = context
        .analysis
        .summarize(period, algorithm, args.user_id)
        .await?;

    println!("Recommendation analysis ({} window)", period);
    println!("  sets served:     {}", report.total_sets);
    println!("  items served:    {}", report.total_items);
    println!("  CTR:             {:.3}", report.ctr);
    println!("  download rate:   {:.3}", report.download_rate);
    println!("  avg feedback:    {:.2}", report.avg_feedback);
    println!("  avg confidence:  {:.3}", report.avg_confidence);
    if args.detailed {
        println!("  diversity:       {:.3}", report.diversity_score);
        println!("  novelty:         {:.3}", report.novelty_score);
    }

    if args.compare_algorithms {
        let comparison = context.analysis.compare_algorithms(period).await?;
        println!("\nPer-algorithm comparison:");
        for metrics in &comparison {
            println!(
                "  {:<14} sets={:<5} items={:<6} ctr={:.3} dl={:.3} fb={:.2} (+{:.2}/-{:.2})",
                metrics.algorithm.as_str(),
                metrics.sets,
                metrics.items_served,
                metrics.ctr,
                metrics.download_rate,
                metrics.avg_feedback,
                metrics.positive_feedback_rate,
                metrics.negative_feedback_rate,
            );
        }
    }

    if args.user_segments {
        let segments = context.analysis.user_segments(period).await?;
        println!("\nActive user segments:");
        println!("  power:   {}", segments.power);
        println!("  regular: {}", segments.regular);
        println!("  casual:  {}", segments.casual);
        println!("  total:   {}", segments.total_active);
    }

    if let Some(path) = &args.export {
        let json = serde_json::to_string_pretty(&report)?;
        std::fs::write(path, json)?;
        println!("\nReport exported to {}", path);
    }

    Ok(())
}
