use async_trait::async_trait;
use data_providers::BookDataProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{rank_and_truncate, GenerationRequest, PopularityGenerator, RecommendationGenerator};
use crate::db::InteractionStore;
use crate::error::Result;
use crate::models::{Algorithm, ScoredBook};

/// Seed interactions considered per user.
const MAX_SEED_BOOKS: i64 = 20;
/// Peer users considered.
const MAX_PEERS: i64 = 25;
/// Peers required before collaborative scoring is trusted.
const MIN_PEERS: usize = 3;
/// Candidate pool pulled from peer interactions.
const PEER_BOOK_POOL: i64 = 100;

pub const PEER_REASON: &str = "Readers like you also read this.";

/// User-user collaborative filtering over shared interaction patterns.
///
/// Score: for each candidate, the interaction weight accumulated across
/// peers, normalized by the heaviest candidate. Degrades to the popularity
/// generator when too few peers exist.
pub struct CollaborativeGenerator {
    interactions: Arc<dyn InteractionStore>,
    books: Arc<dyn BookDataProvider>,
    fallback: Arc<PopularityGenerator>,
}

impl CollaborativeGenerator {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        books: Arc<dyn BookDataProvider>,
        fallback: Arc<PopularityGenerator>,
    ) -> Self {
        Self {
            interactions,
            books,
            fallback,
        }
    }
}

#[async_trait]
impl RecommendationGenerator for CollaborativeGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ScoredBook>> {
        let seeds = self
            .interactions
            .recent_books_for_user(request.user_id, MAX_SEED_BOOKS)
            .await
            .unwrap_or_else(|err| {
                warn!(user_id = %request.user_id, error = %err, "Seed lookup failed");
                Vec::new()
            });

        if seeds.is_empty() {
            info!(user_id = %request.user_id, "No interaction history, degrading to popularity");
            return self.fallback.generate(request).await;
        }

        let peers = self
            .interactions
            .peers_for_books(request.user_id, &seeds, MAX_PEERS)
            .await
            .unwrap_or_else(|err| {
                warn!(user_id = %request.user_id, error = %err, "Peer lookup failed");
                Vec::new()
            });

        if peers.len() < MIN_PEERS {
            info!(
                user_id = %request.user_id,
                peers = peers.len(),
                "Insufficient peer data, degrading to popularity"
            );
            return self.fallback.generate(request).await;
        }

        let peer_ids: Vec<Uuid> = peers.iter().map(|(id, _)| *id).collect();
        let weighted = self
            .interactions
            .weighted_books_for_users(&peer_ids, PEER_BOOK_POOL)
            .await
            .unwrap_or_else(|err| {
                warn!(error = %err, "Peer book aggregation failed");
                Vec::new()
            });

        let filtered: Vec<(Uuid, f64)> = weighted
            .into_iter()
            .filter(|(book_id, _)| !request.exclude.contains(book_id))
            .filter(|(book_id, _)| !seeds.contains(book_id))
            .collect();

        if filtered.is_empty() {
            return self.fallback.generate(request).await;
        }

        let max_weight = filtered
            .iter()
            .map(|(_, w)| *w)
            .fold(f64::MIN, f64::max)
            .max(1.0);
        let scores: HashMap<Uuid, f32> = filtered
            .iter()
            .map(|(book_id, weight)| (*book_id, ((*weight / max_weight) as f32).clamp(0.0, 1.0)))
            .collect();

        let ids: Vec<Uuid> = filtered.iter().map(|(id, _)| *id).collect();
        let books = self.books.get_books_by_ids(&ids).await.unwrap_or_else(|err| {
            warn!(error = %err, "Catalog lookup failed for peer candidates");
            Vec::new()
        });

        let candidates: Vec<ScoredBook> = books
            .into_iter()
            .map(|book| {
                let score = scores.get(&book.id).copied().unwrap_or(0.0);
                ScoredBook {
                    book,
                    score,
                    reasons: vec![PEER_REASON.to_string()],
                }
            })
            .collect();

        Ok(rank_and_truncate(candidates, request.count))
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::Collaborative
    }
}
