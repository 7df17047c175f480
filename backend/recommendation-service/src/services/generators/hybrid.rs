use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::{rank_and_truncate, GenerationRequest, RecommendationGenerator};
use crate::error::Result;
use crate::models::{Algorithm, ScoredBook};

/// Blend weights for the hybrid strategy. Weights are relative; they are
/// normalized over the strategies that actually produced candidates.
#[derive(Debug, Clone, Copy)]
pub struct HybridWeights {
    pub content: f32,
    pub collaborative: f32,
    pub popularity: f32,
}

impl HybridWeights {
    pub fn balanced() -> Self {
        Self {
            content: 0.5,
            collaborative: 0.3,
            popularity: 0.2,
        }
    }

    pub fn new(content: f32, collaborative: f32, popularity: f32) -> Self {
        Self {
            content,
            collaborative,
            popularity,
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.content < 0.0 || self.collaborative < 0.0 || self.popularity < 0.0 {
            return Err("Hybrid weights must be non-negative".to_string());
        }
        if self.content + self.collaborative + self.popularity <= 0.0 {
            return Err("At least one hybrid weight must be positive".to_string());
        }
        Ok(())
    }
}

impl Default for HybridWeights {
    fn default() -> Self {
        Self::balanced()
    }
}

/// Weighted combination of the individual strategies. A strategy that fails
/// or returns nothing simply contributes no score.
pub struct HybridGenerator {
    content: Arc<dyn RecommendationGenerator>,
    collaborative: Arc<dyn RecommendationGenerator>,
    popularity: Arc<dyn RecommendationGenerator>,
    weights: HybridWeights,
}

impl HybridGenerator {
    pub fn new(
        content: Arc<dyn RecommendationGenerator>,
        collaborative: Arc<dyn RecommendationGenerator>,
        popularity: Arc<dyn RecommendationGenerator>,
        weights: HybridWeights,
    ) -> Self {
        Self {
            content,
            collaborative,
            popularity,
            weights,
        }
    }

    async fn run_strategy(
        &self,
        strategy: &Arc<dyn RecommendationGenerator>,
        request: &GenerationRequest,
    ) -> Vec<ScoredBook> {
        // Each strategy sees a widened count so the blend has material to
        // work with before truncation.
        let widened = GenerationRequest {
            count: request.count * 2,
            ..request.clone()
        };
        match strategy.generate(&widened).await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(
                    algorithm = %strategy.algorithm(),
                    error = %err,
                    "Hybrid component failed, contributing nothing"
                );
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl RecommendationGenerator for HybridGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ScoredBook>> {
        let components: [(f32, Vec<ScoredBook>); 3] = [
            (
                self.weights.content,
                self.run_strategy(&self.content, request).await,
            ),
            (
                self.weights.collaborative,
                self.run_strategy(&self.collaborative, request).await,
            ),
            (
                self.weights.popularity,
                self.run_strategy(&self.popularity, request).await,
            ),
        ];

        let mut blended: HashMap<Uuid, ScoredBook> = HashMap::new();
        for (weight, candidates) in components {
            if weight <= 0.0 {
                continue;
            }
            for candidate in candidates {
                let contribution = (candidate.score * weight).clamp(0.0, 1.0);
                match blended.get_mut(&candidate.book.id) {
                    Some(existing) => {
                        existing.score = (existing.score + contribution).clamp(0.0, 1.0);
                        for reason in candidate.reasons {
                            if !existing.reasons.contains(&reason) {
                                existing.reasons.push(reason);
                            }
                        }
                    }
                    None => {
                        blended.insert(
                            candidate.book.id,
                            ScoredBook {
                                score: contribution,
                                ..candidate
                            },
                        );
                    }
                }
            }
        }

        Ok(rank_and_truncate(
            blended.into_values().collect(),
            request.count,
        ))
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Hybrid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecommendationContext, UserProfile};
    use chrono::Utc;
    use data_providers::BookSummary;
    use std::collections::HashSet;

    struct FixedGenerator {
        algorithm: Algorithm,
        candidates: Vec<ScoredBook>,
    }

    #[async_trait]
    impl RecommendationGenerator for FixedGenerator {
        async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ScoredBook>> {
            Ok(self
                .candidates
                .iter()
                .filter(|c| !request.exclude.contains(&c.book.id))
                .take(request.count)
                .cloned()
                .collect())
        }

        fn algorithm(&self) -> Algorithm {
            self.algorithm
        }
    }

    fn scored(id: Uuid, score: f32, reason: &str) -> ScoredBook {
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
            reasons: vec![reason.to_string()],
        }
    }

    fn fixed(algorithm: Algorithm, candidates: Vec<ScoredBook>) -> Arc<dyn RecommendationGenerator> {
        Arc::new(FixedGenerator {
            algorithm,
            candidates,
        })
    }

    fn request(count: usize) -> GenerationRequest {
        let user = Uuid::new_v4();
        GenerationRequest::new(
            user,
            UserProfile::default_for(user),
            HashSet::new(),
            count,
            RecommendationContext::General,
        )
    }

    #[tokio::test]
    async fn test_weighted_blend() {
        let shared = Uuid::new_v4();
        let content_only = Uuid::new_v4();

        let generator = HybridGenerator::new(
            fixed(
                Algorithm::ContentBased,
                vec![scored(shared, 1.0, "content"), scored(content_only, 0.4, "content")],
            ),
            fixed(Algorithm::Collaborative, vec![scored(shared, 1.0, "peers")]),
            fixed(Algorithm::Popularity, vec![]),
            HybridWeights::balanced(),
        );

        let result = generator.generate(&request(5)).await.unwrap();
        assert_eq!(result.len(), 2);

        // shared book: 1.0 * 0.5 + 1.0 * 0.3 = 0.8, reasons merged
        assert_eq!(result[0].book.id, shared);
        assert!((result[0].score - 0.8).abs() < 1e-6);
        assert_eq!(result[0].reasons.len(), 2);

        // content-only book: 0.4 * 0.5 = 0.2
        assert!((result[1].score - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_score_clamped_to_one() {
        let shared = Uuid::new_v4();
        let generator = HybridGenerator::new(
            fixed(Algorithm::ContentBased, vec![scored(shared, 1.0, "a")]),
            fixed(Algorithm::Collaborative, vec![scored(shared, 1.0, "b")]),
            fixed(Algorithm::Popularity, vec![scored(shared, 1.0, "c")]),
            HybridWeights::new(0.8, 0.8, 0.8),
        );

        let result = generator.generate(&request(1)).await.unwrap();
        assert_eq!(result[0].score, 1.0);
    }

    #[tokio::test]
    async fn test_empty_components_yield_empty() {
        let generator = HybridGenerator::new(
            fixed(Algorithm::ContentBased, vec![]),
            fixed(Algorithm::Collaborative, vec![]),
            fixed(Algorithm::Popularity, vec![]),
            HybridWeights::balanced(),
        );
        assert!(generator.generate(&request(5)).await.unwrap().is_empty());
    }

    #[test]
    fn test_weights_validation() {
        assert!(HybridWeights::balanced().validate().is_ok());
        assert!(HybridWeights::new(-0.1, 0.5, 0.5).validate().is_err());
        assert!(HybridWeights::new(0.0, 0.0, 0.0).validate().is_err());
    }
}
