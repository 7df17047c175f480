//! Recommendation generators.
//!
//! Pluggable scoring strategies sharing one contract: given a user, their
//! preference profile, and an exclusion set, return at most `count` scored
//! candidates. Generators degrade to fewer (or zero) candidates instead of
//! failing, so the orchestrator can always backfill from another strategy.

use async_trait::async_trait;
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{Algorithm, RecommendationContext, ScoredBook, UserProfile};

mod collaborative;
mod content_based;
mod hybrid;
mod popularity;

pub use collaborative::CollaborativeGenerator;
pub use content_based::ContentBasedGenerator;
pub use hybrid::{HybridGenerator, HybridWeights};
pub use popularity::PopularityGenerator;

/// Input shared by every generator invocation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub user_id: Uuid,
    pub profile: UserProfile,
    /// Already read or already recommended; never returned.
    pub exclude: HashSet<Uuid>,
    pub count: usize,
    pub context: RecommendationContext,
}

impl GenerationRequest {
    pub fn new(
        user_id: Uuid,
        profile: UserProfile,
        exclude: HashSet<Uuid>,
        count: usize,
        context: RecommendationContext,
    ) -> Self {
        Self {
            user_id,
            profile,
            exclude,
            count,
            context,
        }
    }
}

#[async_trait]
pub trait RecommendationGenerator: Send + Sync {
    /// Scored candidates, descending, at most `request.count`, none from
    /// the exclusion set. Missing upstream data yields fewer candidates,
    /// not an error.
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ScoredBook>>;

    fn algorithm(&self) -> Algorithm;
}

/// Sort descending by score, ties broken by book id for determinism, then
/// truncate.
pub(crate) fn rank_and_truncate(mut candidates: Vec<ScoredBook>, count: usize) -> Vec<ScoredBook> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.book.id.cmp(&b.book.id))
    });
    candidates.truncate(count);
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use data_providers::BookSummary;

    fn scored(id: Uuid, score: f32) -> ScoredBook {
        ScoredBook {
            book: BookSummary {
                id,
                title: "t".to_string(),
                authors: vec![],
                categories: vec![],
                language: None,
                average_rating: 0.0,
                ratings_count: 0,
                view_count: 0,
                download_count: 0,
                published_at: Some(Utc::now()),
                cover_image: None,
            },
            score,
            reasons: vec![],
        }
    }

    #[test]
    fn test_rank_and_truncate_orders_and_limits() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let ranked = rank_and_truncate(vec![scored(a, 0.2), scored(b, 0.9), scored(c, 0.5)], 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].book.id, b);
        assert_eq!(ranked[1].book.id, c);
    }

    #[test]
    fn test_rank_ties_broken_by_id() {
        let mut ids = [Uuid::new_v4(), Uuid::new_v4()];
        ids.sort();
        let ranked = rank_and_truncate(vec![scored(ids[1], 0.5), scored(ids[0], 0.5)], 2);
        assert_eq!(ranked[0].book.id, ids[0]);
    }
}
