//! Offline recommendation analytics.
//!
//! Engagement metrics (CTR, download rate, feedback rates) per algorithm,
//! plus the soft quality metrics (diversity, novelty) that are measured
//! over served sets but never enforced at generation time.

use chrono::{DateTime, Duration, Utc};
use data_providers::BookDataProvider;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::{InteractionStore, RecommendationStore, VectorStore};
use crate::error::Result;
use crate::models::{Algorithm, InteractionType, TrendPeriod};

/// Served sets sampled for the diversity/novelty metrics.
const QUALITY_SAMPLE_SETS: usize = 20;

const POWER_READER_FLOOR: i64 = 50;
const REGULAR_READER_FLOOR: i64 = 10;

#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmMetrics {
    pub algorithm: Algorithm,
    pub sets: usize,
    pub items_served: usize,
    pub attributed_views: usize,
    pub attributed_downloads: usize,
    pub ctr: f64,
    pub download_rate: f64,
    pub feedback_count: usize,
    pub avg_feedback: f64,
    pub positive_feedback_rate: f64,
    pub negative_feedback_rate: f64,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub since: DateTime<Utc>,
    pub period: TrendPeriod,
    pub algorithm: Option<Algorithm>,
    pub user_id: Option<Uuid>,
    pub total_sets: usize,
    pub total_items: usize,
    pub ctr: f64,
    pub download_rate: f64,
    pub avg_feedback: f64,
    pub avg_confidence: f64,
    pub diversity_score: f64,
    pub novelty_score: f64,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct UserSegments {
    pub power: usize,
    pub regular: usize,
    pub casual: usize,
    pub total_active: usize,
}

pub struct AnalysisService {
    recommendations: Arc<dyn RecommendationStore>,
    interactions: Arc<dyn InteractionStore>,
    vectors: Arc<dyn VectorStore>,
    books: Arc<dyn BookDataProvider>,
}

impl AnalysisService {
    pub fn new(
        recommendations: Arc<dyn RecommendationStore>,
        interactions: Arc<dyn InteractionStore>,
        vectors: Arc<dyn VectorStore>,
        books: Arc<dyn BookDataProvider>,
    ) -> Self {
        Self {
            recommendations,
            interactions,
            vectors,
            books,
        }
    }

    pub async fn summarize(
        &self,
        period: TrendPeriod,
        algorithm: Option<Algorithm>,
        user_id: Option<Uuid>,
    ) -> Result<AnalysisReport> {
        let since = Utc::now() - Duration::hours(period.hours());
        let sets = self.recommendations.sets_since(since, algorithm, user_id).await?;
        let set_ids: Vec<Uuid> = sets.iter().map(|s| s.id).collect();
        let items = self.recommendations.items_for_sets(&set_ids).await?;
        let item_ids: HashSet<Uuid> = items.iter().map(|i| i.id).collect();

        let attributed = self.interactions.attributed_since(since).await?;
        let views = attributed
            .iter()
            .filter(|a| item_ids.contains(&a.recommendation_id))
            .filter(|a| a.interaction_type == InteractionType::View)
            .count();
        let downloads = attributed
            .iter()
            .filter(|a| item_ids.contains(&a.recommendation_id))
            .filter(|a| a.interaction_type == InteractionType::Download)
            .count();

        let feedback = self.interactions.feedback_since(since).await?;
        let ratings: Vec<i16> = feedback
            .iter()
            .filter(|f| item_ids.contains(&f.recommendation_id))
            .map(|f| f.rating)
            .collect();

        let (diversity_score, novelty_score) = self.quality_metrics(&sets, &items).await?;

        Ok(AnalysisReport {
            since,
            period,
            algorithm,
            user_id,
            total_sets: sets.len(),
            total_items: items.len(),
            ctr: rate(views, items.len()),
            download_rate: rate(downloads, items.len()),
            avg_feedback: mean_i16(&ratings),
            avg_confidence: mean_f32(sets.iter().map(|s| s.confidence_score)),
            diversity_score,
            novelty_score,
        })
    }

    /// Per-algorithm engagement comparison over the window.
    pub async fn compare_algorithms(&self, period: TrendPeriod) -> Result<Vec<AlgorithmMetrics>> {
        let since = Utc::now() - Duration::hours(period.hours());
        let sets = self.recommendations.sets_since(since, None, None).await?;
        let set_ids: Vec<Uuid> = sets.iter().map(|s| s.id).collect();
        let items = self.recommendations.items_for_sets(&set_ids).await?;

        let set_algorithm: HashMap<Uuid, Algorithm> =
            sets.iter().map(|s| (s.id, s.algorithm)).collect();
        let item_algorithm: HashMap<Uuid, Algorithm> = items
            .iter()
            .filter_map(|i| set_algorithm.get(&i.set_id).map(|a| (i.id, *a)))
            .collect();

        let attributed = self.interactions.attributed_since(since).await?;
        let feedback = self.interactions.feedback_since(since).await?;

        let mut metrics: Vec<AlgorithmMetrics> = Vec::new();
        for algorithm in Algorithm::all() {
            let algo_sets: Vec<_> = sets.iter().filter(|s| s.algorithm == algorithm).collect();
            if algo_sets.is_empty() {
                continue;
            }
            let items_served = items
                .iter()
                .filter(|i| item_algorithm.get(&i.id) == Some(&algorithm))
                .count();

            let views = attributed
                .iter()
                .filter(|a| item_algorithm.get(&a.recommendation_id) == Some(&algorithm))
                .filter(|a| a.interaction_type == InteractionType::View)
                .count();
            let downloads = attributed
                .iter()
                .filter(|a| item_algorithm.get(&a.recommendation_id) == Some(&algorithm))
                .filter(|a| a.interaction_type == InteractionType::Download)
                .count();

            let ratings: Vec<i16> = feedback
                .iter()
                .filter(|f| item_algorithm.get(&f.recommendation_id) == Some(&algorithm))
                .map(|f| f.rating)
                .collect();
            let positive = ratings.iter().filter(|&&r| r >= 4).count();
            let negative = ratings.iter().filter(|&&r| r <= 2).count();

            metrics.push(AlgorithmMetrics {
                algorithm,
                sets: algo_sets.len(),
                items_served,
                attributed_views: views,
                attributed_downloads: downloads,
                ctr: rate(views, items_served),
                download_rate: rate(downloads, items_served),
                feedback_count: ratings.len(),
                avg_feedback: mean_i16(&ratings),
                positive_feedback_rate: rate(positive, ratings.len()),
                negative_feedback_rate: rate(negative, ratings.len()),
                avg_confidence: mean_f32(algo_sets.iter().map(|s| s.confidence_score)),
            });
        }
        Ok(metrics)
    }

    /// Bucket active users by interaction volume over the window.
    pub async fn user_segments(&self, period: TrendPeriod) -> Result<UserSegments> {
        let since = Utc::now() - Duration::hours(period.hours());
        let activity = self.interactions.user_activity_since(since).await?;

        let mut segments = UserSegments {
            power: 0,
            regular: 0,
            casual: 0,
            total_active: activity.len(),
        };
        for (_, count) in activity {
            if count >= POWER_READER_FLOOR {
                segments.power += 1;
            } else if count >= REGULAR_READER_FLOOR {
                segments.regular += 1;
            } else {
                segments.casual += 1;
            }
        }
        Ok(segments)
    }

    /// Diversity and novelty over a sample of recent served sets.
    async fn quality_metrics(
        &self,
        sets: &[crate::models::RecommendationSet],
        items: &[crate::models::Recommendation],
    ) -> Result<(f64, f64)> {
        let sampled_sets: HashSet<Uuid> = sets.iter().take(QUALITY_SAMPLE_SETS).map(|s| s.id).collect();
        let book_ids: Vec<Uuid> = items
            .iter()
            .filter(|i| sampled_sets.contains(&i.set_id))
            .map(|i| i.book_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();

        if book_ids.is_empty() {
            return Ok((0.0, 0.0));
        }

        let books = self.books.get_books_by_ids(&book_ids).await?;
        let genre_lists: Vec<Vec<String>> = books.iter().map(|b| b.categories.clone()).collect();
        let diversity = diversity_score(&genre_lists);

        let vectors = self.vectors.get_many(&book_ids).await?;
        let popularities: Vec<f32> = vectors.iter().map(|v| v.popularity_score).collect();
        let novelty = novelty_score(&popularities);

        Ok((diversity, novelty))
    }
}

fn rate(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn mean_i16(values: &[i16]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64
    }
}

fn mean_f32(values: impl Iterator<Item = f32>) -> f64 {
    let collected: Vec<f32> = values.collect();
    if collected.is_empty() {
        0.0
    } else {
        collected.iter().map(|&v| v as f64).sum::<f64>() / collected.len() as f64
    }
}

/// Mean pairwise Jaccard distance between genre sets; 0 for fewer than two
/// books, 1.0 when no two books share a genre.
pub fn diversity_score(genre_lists: &[Vec<String>]) -> f64 {
    if genre_lists.len() < 2 {
        return 0.0;
    }
    let sets: Vec<HashSet<&String>> = genre_lists
        .iter()
        .map(|genres| genres.iter().collect())
        .collect();

    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..sets.len() {
        for j in (i + 1)..sets.len() {
            let intersection = sets[i].intersection(&sets[j]).count();
            let union = sets[i].union(&sets[j]).count();
            let distance = if union == 0 {
                0.0
            } else {
                1.0 - intersection as f64 / union as f64
            };
            total += distance;
            pairs += 1;
        }
    }
    total / pairs as f64
}

/// 1 minus mean popularity: recommending only blockbusters scores near 0.
pub fn novelty_score(popularities: &[f32]) -> f64 {
    if popularities.is_empty() {
        return 0.0;
    }
    let mean = popularities.iter().map(|&p| p as f64).sum::<f64>() / popularities.len() as f64;
    (1.0 - mean).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn genres(lists: &[&[&str]]) -> Vec<Vec<String>> {
        lists
            .iter()
            .map(|genres| genres.iter().map(|g| g.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_diversity_disjoint_genres() {
        let lists = genres(&[&["Fiction"], &["Science"], &["History"]]);
        assert_eq!(diversity_score(&lists), 1.0);
    }

    #[test]
    fn test_diversity_identical_genres() {
        let lists = genres(&[&["Fiction"], &["Fiction"]]);
        assert_eq!(diversity_score(&lists), 0.0);
    }

    #[test]
    fn test_diversity_needs_two_books() {
        assert_eq!(diversity_score(&genres(&[&["Fiction"]])), 0.0);
        assert_eq!(diversity_score(&[]), 0.0);
    }

    #[test]
    fn test_novelty_score() {
        assert_eq!(novelty_score(&[]), 0.0);
        assert_eq!(novelty_score(&[1.0, 1.0]), 0.0);
        assert_eq!(novelty_score(&[0.0, 0.0]), 1.0);
        assert!((novelty_score(&[0.4, 0.6]) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rate_handles_zero_denominator() {
        assert_eq!(rate(5, 0), 0.0);
        assert_eq!(rate(5, 10), 0.5);
    }
}
