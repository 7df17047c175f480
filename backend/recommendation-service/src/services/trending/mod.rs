//! Trending snapshot computation.
//!
//! Aggregates the interaction window per book, scores it with exponential
//! time decay, and replaces the active (period, trend_type) snapshot. Old
//! rows are flipped inactive rather than deleted; the cleanup pass purges
//! them after a grace window.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{InteractionAggregate, InteractionStore, TrendingStore};
use crate::error::Result;
use crate::models::{TrendPeriod, TrendType, TrendingBook};

/// Decay and weighting parameters for trending scores.
#[derive(Debug, Clone)]
pub struct TrendingAlgorithm {
    /// Decay rate (lambda): higher = faster decay. Range (0, 1].
    pub decay_rate: f64,
    /// Faster decay used for the `rising` trend type.
    pub rising_decay_rate: f64,
}

impl Default for TrendingAlgorithm {
    fn default() -> Self {
        Self {
            decay_rate: 0.01,
            rising_decay_rate: 0.05,
        }
    }
}

impl TrendingAlgorithm {
    /// e^(-lambda * age_hours)
    pub fn decay_factor(&self, decay_rate: f64, age_hours: f64) -> f64 {
        (-decay_rate * age_hours.max(0.0)).exp()
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        for rate in [self.decay_rate, self.rising_decay_rate] {
            if rate <= 0.0 || rate > 1.0 {
                return Err(format!("Decay rate must be in (0, 1], got {}", rate));
            }
        }
        Ok(())
    }

    /// Score one book's window aggregate for the given trend type.
    ///
    /// Engagement counts are weighted by intent (views light, downloads and
    /// purchases heavy) and decayed by the age of the latest interaction.
    pub fn score(
        &self,
        aggregate: &InteractionAggregate,
        trend_type: TrendType,
        now: DateTime<Utc>,
    ) -> f64 {
        let age_hours = aggregate
            .last_interaction
            .map(|last| (now - last).num_minutes() as f64 / 60.0)
            .unwrap_or(f64::MAX);

        match trend_type {
            TrendType::MostViewed => {
                aggregate.views as f64 * self.decay_factor(self.decay_rate, age_hours)
            }
            TrendType::MostDownloaded => {
                aggregate.downloads as f64 * self.decay_factor(self.decay_rate, age_hours)
            }
            TrendType::HighestRated => {
                // Rating quality, scaled by how many readers backed it
                aggregate.avg_rating() as f64 * (1.0 + (aggregate.ratings as f64).ln_1p())
            }
            TrendType::Rising => {
                let engagement = aggregate.views as f64
                    + aggregate.ratings as f64 * 2.0
                    + aggregate.bookmarks as f64 * 3.0
                    + aggregate.downloads as f64 * 5.0
                    + aggregate.purchases as f64 * 8.0;
                engagement * self.decay_factor(self.rising_decay_rate, age_hours)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrendingSummary {
    pub candidates: usize,
    pub persisted: usize,
}

pub struct TrendingService {
    interactions: Arc<dyn InteractionStore>,
    store: Arc<dyn TrendingStore>,
    algorithm: TrendingAlgorithm,
}

impl TrendingService {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        store: Arc<dyn TrendingStore>,
        algorithm: TrendingAlgorithm,
    ) -> Self {
        Self {
            interactions,
            store,
            algorithm,
        }
    }

    /// Recompute one (period, trend_type) snapshot.
    pub async fn update(
        &self,
        period: TrendPeriod,
        trend_type: TrendType,
        limit: usize,
        min_interactions: i64,
        dry_run: bool,
    ) -> Result<TrendingSummary> {
        let now = Utc::now();
        let since = now - Duration::hours(period.hours());
        let aggregates = self.interactions.aggregates_since(since).await?;

        let mut ranked = rank_aggregates(&self.algorithm, &aggregates, trend_type, min_interactions, now);
        ranked.truncate(limit);

        let summary = TrendingSummary {
            candidates: aggregates.len(),
            persisted: ranked.len(),
        };

        if ranked.is_empty() {
            warn!(
                period = %period,
                trend_type = %trend_type,
                min_interactions = min_interactions,
                "No books met the trending floor"
            );
        }

        if dry_run {
            return Ok(summary);
        }

        let rows: Vec<TrendingBook> = ranked
            .into_iter()
            .enumerate()
            .map(|(index, (aggregate, score))| TrendingBook {
                id: Uuid::new_v4(),
                book_id: aggregate.book_id,
                period,
                trend_type,
                rank: (index + 1) as i32,
                score,
                interaction_count: aggregate.total(),
                avg_rating: aggregate.avg_rating(),
                is_active: true,
                computed_at: now,
            })
            .collect();

        self.store.replace_snapshot(period, trend_type, &rows).await?;

        info!(
            period = %period,
            trend_type = %trend_type,
            persisted = summary.persisted,
            "Trending snapshot replaced"
        );
        Ok(summary)
    }
}

/// Score, floor-filter, and order aggregates; ties broken by book id.
fn rank_aggregates(
    algorithm: &TrendingAlgorithm,
    aggregates: &[InteractionAggregate],
    trend_type: TrendType,
    min_interactions: i64,
    now: DateTime<Utc>,
) -> Vec<(InteractionAggregate, f64)> {
    let mut ranked: Vec<(InteractionAggregate, f64)> = aggregates
        .iter()
        .filter(|a| a.total() >= min_interactions)
        .map(|a| (a.clone(), algorithm.score(a, trend_type, now)))
        .filter(|(_, score)| *score > 0.0)
        .collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.book_id.cmp(&b.0.book_id))
    });
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{InMemoryInteractionStore, InMemoryTrendingStore};
    use crate::db::{InteractionStore as _, TrendingStore as _};
    use crate::models::{InteractionType, UserInteraction};

    fn aggregate(views: i64, downloads: i64, age_hours: i64, now: DateTime<Utc>) -> InteractionAggregate {
        InteractionAggregate {
            book_id: Uuid::new_v4(),
            views,
            downloads,
            last_interaction: Some(now - Duration::hours(age_hours)),
            ..Default::default()
        }
    }

    #[test]
    fn test_decay_favors_recent_engagement() {
        let algorithm = TrendingAlgorithm::default();
        let now = Utc::now();

        let old_hot = aggregate(1000, 0, 500, now);
        let new_warm = aggregate(100, 0, 1, now);

        let old_score = algorithm.score(&old_hot, TrendType::Rising, now);
        let new_score = algorithm.score(&new_warm, TrendType::Rising, now);
        assert!(new_score > old_score);
    }

    #[test]
    fn test_trend_types_rank_different_signals() {
        let algorithm = TrendingAlgorithm::default();
        let now = Utc::now();

        let viewed = aggregate(100, 1, 1, now);
        let downloaded = aggregate(5, 50, 1, now);

        assert!(
            algorithm.score(&viewed, TrendType::MostViewed, now)
                > algorithm.score(&downloaded, TrendType::MostViewed, now)
        );
        assert!(
            algorithm.score(&downloaded, TrendType::MostDownloaded, now)
                > algorithm.score(&viewed, TrendType::MostDownloaded, now)
        );
    }

    #[test]
    fn test_validate_rejects_bad_decay() {
        let mut algorithm = TrendingAlgorithm::default();
        assert!(algorithm.validate().is_ok());
        algorithm.decay_rate = 0.0;
        assert!(algorithm.validate().is_err());
        algorithm.decay_rate = 1.5;
        assert!(algorithm.validate().is_err());
    }

    #[test]
    fn test_min_interactions_floor() {
        let algorithm = TrendingAlgorithm::default();
        let now = Utc::now();
        let aggregates = vec![aggregate(2, 0, 1, now), aggregate(50, 0, 1, now)];

        let ranked = rank_aggregates(&algorithm, &aggregates, TrendType::MostViewed, 10, now);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].0.views, 50);
    }

    #[tokio::test]
    async fn test_update_replaces_snapshot_with_contiguous_ranks() {
        let interactions = Arc::new(InMemoryInteractionStore::new());
        let store = Arc::new(InMemoryTrendingStore::new());
        let now = Utc::now();

        // Two books with different view volumes in the last day
        for (views, _) in [(5usize, ()), (15usize, ())] {
            let book_id = Uuid::new_v4();
            for _ in 0..views {
                interactions
                    .record(&UserInteraction {
                        id: Uuid::new_v4(),
                        user_id: Uuid::new_v4(),
                        book_id,
                        interaction_type: InteractionType::View,
                        recommendation_id: None,
                        rating_value: None,
                        metadata: serde_json::Value::Null,
                        created_at: now - Duration::hours(1),
                    })
                    .await
                    .unwrap();
            }
        }

        let service = TrendingService::new(
            interactions,
            store.clone(),
            TrendingAlgorithm::default(),
        );

        let summary = service
            .update(TrendPeriod::Daily, TrendType::MostViewed, 10, 3, false)
            .await
            .unwrap();
        assert_eq!(summary.persisted, 2);

        let active = store
            .get_active(TrendPeriod::Daily, TrendType::MostViewed, 10)
            .await
            .unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].rank, 1);
        assert_eq!(active[1].rank, 2);
        assert!(active[0].score >= active[1].score);
        assert!(active.iter().all(|row| row.interaction_count >= 3));

        // A second update supersedes rather than appends
        service
            .update(TrendPeriod::Daily, TrendType::MostViewed, 10, 3, false)
            .await
            .unwrap();
        let active = store
            .get_active(TrendPeriod::Daily, TrendType::MostViewed, 10)
            .await
            .unwrap();
        assert_eq!(active.len(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_persists_nothing() {
        let interactions = Arc::new(InMemoryInteractionStore::new());
        let store = Arc::new(InMemoryTrendingStore::new());
        let service = TrendingService::new(
            interactions,
            store.clone(),
            TrendingAlgorithm::default(),
        );

        service
            .update(TrendPeriod::Weekly, TrendType::Rising, 10, 0, true)
            .await
            .unwrap();
        let active = store
            .get_active(TrendPeriod::Weekly, TrendType::Rising, 10)
            .await
            .unwrap();
        assert!(active.is_empty());
    }
}
