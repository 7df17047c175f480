use async_trait::async_trait;
use data_providers::BookDataProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::{rank_and_truncate, GenerationRequest, RecommendationGenerator};
use crate::db::VectorStore;
use crate::error::Result;
use crate::models::{Algorithm, ScoredBook};

const POPULARITY_WEIGHT: f32 = 0.7;
const QUALITY_WEIGHT: f32 = 0.3;

pub const POPULAR_REASON: &str = "Popular among readers.";

/// Ranks by corpus-wide popularity and quality, independent of the
/// requesting user beyond exclusions. Also the orchestrator's fallback.
pub struct PopularityGenerator {
    vectors: Arc<dyn VectorStore>,
    books: Arc<dyn BookDataProvider>,
}

impl PopularityGenerator {
    pub fn new(vectors: Arc<dyn VectorStore>, books: Arc<dyn BookDataProvider>) -> Self {
        Self { vectors, books }
    }
}

#[async_trait]
impl RecommendationGenerator for PopularityGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ScoredBook>> {
        let exclude: Vec<Uuid> = request.exclude.iter().copied().collect();

        let top = self
            .vectors
            .top_by_popularity((request.count * 2) as i64, &exclude)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "Vector store unavailable for popularity ranking");
                Vec::new()
            });

        if top.is_empty() {
            // Cold start: no vectors computed yet, rank straight off the
            // catalog counters.
            return self.generate_from_catalog(request, &exclude).await;
        }

        let scores: HashMap<Uuid, f32> = top
            .iter()
            .map(|v| {
                let score = (v.popularity_score * POPULARITY_WEIGHT
                    + v.quality_score * QUALITY_WEIGHT)
                    .clamp(0.0, 1.0);
                (v.book_id, score)
            })
            .collect();

        let ids: Vec<Uuid> = top.iter().map(|v| v.book_id).collect();
        let books = self.books.get_books_by_ids(&ids).await.unwrap_or_else(|err| {
            warn!(error = %err, "Catalog lookup failed for popularity candidates");
            Vec::new()
        });

        let candidates: Vec<ScoredBook> = books
            .into_iter()
            .filter(|book| !request.exclude.contains(&book.id))
            .filter(|book| scores.get(&book.id).copied().unwrap_or(0.0) > 0.0)
            .map(|book| {
                let score = scores.get(&book.id).copied().unwrap_or(0.0);
                ScoredBook {
                    book,
                    score,
                    reasons: vec![POPULAR_REASON.to_string()],
                }
            })
            .collect();

        Ok(rank_and_truncate(candidates, request.count))
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Popularity
    }
}

impl PopularityGenerator {
    async fn generate_from_catalog(
        &self,
        request: &GenerationRequest,
        exclude: &[Uuid],
    ) -> Result<Vec<ScoredBook>> {
        let books = self
            .books
            .get_popular_books(request.count as i64, exclude)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "Catalog popularity fallback failed");
                Vec::new()
            });

        let candidates: Vec<ScoredBook> = books
            .into_iter()
            .filter(|book| book.view_count > 0 || book.download_count > 0)
            .map(|book| {
                let quality = if book.ratings_count > 0 {
                    (book.average_rating / 5.0).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                // No corpus-normalized popularity available pre-vectors;
                // quality plus a floor keeps the ordering from the catalog.
                let score = (0.3 + quality * QUALITY_WEIGHT).clamp(0.0, 1.0);
                ScoredBook {
                    book,
                    score,
                    reasons: vec![POPULAR_REASON.to_string()],
                }
            })
            .collect();

        Ok(rank_and_truncate(candidates, request.count))
    }
}
