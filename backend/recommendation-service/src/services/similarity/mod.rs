//! Book-to-book similarity matrix.
//!
//! Pairwise cosine similarity over combined feature vectors, precomputed and
//! persisted so "similar books" lookups are O(1) at serving time. Batching
//! bounds transaction size for the O(n²) pairwise pass; each source book's
//! row set is rewritten in one transaction.

use chrono::{Duration, Utc};
use ndarray::ArrayView1;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{SimilarityStore, VectorStore};
use crate::error::Result;
use crate::models::SimilarityEntry;

pub const COSINE_ALGORITHM: &str = "cosine";

/// Cosine similarity in [-1, 1] with zero-padding to equal length.
///
/// Degenerate vectors (zero norm) yield 0.0 rather than an error, so one
/// corrupt vector cannot poison a batch.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let len = a.len().max(b.len());
    if len == 0 {
        return 0.0;
    }

    let mut padded_a = a.to_vec();
    padded_a.resize(len, 0.0);
    let mut padded_b = b.to_vec();
    padded_b.resize(len, 0.0);

    let va = ArrayView1::from(padded_a.as_slice());
    let vb = ArrayView1::from(padded_b.as_slice());

    let norm_a = va.dot(&va).sqrt();
    let norm_b = vb.dot(&vb).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (va.dot(&vb) / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

#[derive(Debug, Clone)]
pub struct MatrixBuildOptions {
    /// Only pairs scoring at or above this are persisted.
    pub threshold: f32,
    /// Source books per progress batch.
    pub batch_size: usize,
    /// Restrict the rebuild to these source books; `None` = whole corpus.
    pub book_ids: Option<Vec<Uuid>>,
    /// Compute without writing.
    pub dry_run: bool,
}

impl Default for MatrixBuildOptions {
    fn default() -> Self {
        Self {
            threshold: 0.1,
            batch_size: 100,
            book_ids: None,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatrixBuildSummary {
    pub sources_processed: usize,
    pub pairs_kept: usize,
    pub failures: usize,
}

pub struct MatrixBuilder {
    vectors: Arc<dyn VectorStore>,
    store: Arc<dyn SimilarityStore>,
}

impl MatrixBuilder {
    pub fn new(vectors: Arc<dyn VectorStore>, store: Arc<dyn SimilarityStore>) -> Self {
        Self { vectors, store }
    }

    /// Rebuild similarity rows for the requested source books against the
    /// whole corpus.
    ///
    /// Similarity is symmetric, so both directed rows are written: a full
    /// rebuild covers the reverse direction when the other book's turn
    /// comes; a subset rebuild upserts reverse rows explicitly so lookups
    /// from unchanged books stay fresh. A failure on one source book is
    /// logged and skipped.
    pub async fn rebuild(&self, options: &MatrixBuildOptions) -> Result<MatrixBuildSummary> {
        let corpus_ids = self.vectors.all_ids().await?;
        if corpus_ids.is_empty() {
            warn!("No book vectors present, nothing to rebuild");
            return Ok(MatrixBuildSummary::default());
        }

        let source_ids = match &options.book_ids {
            Some(ids) => ids.clone(),
            None => corpus_ids.clone(),
        };
        let subset_rebuild = options.book_ids.is_some();

        // The pairwise pass needs every combined vector; materialize once.
        let corpus = self.vectors.get_many(&corpus_ids).await?;
        let combined: HashMap<Uuid, Vec<f32>> = corpus
            .iter()
            .map(|v| (v.book_id, v.combined()))
            .collect();

        let mut summary = MatrixBuildSummary::default();
        let now = Utc::now();

        for batch in source_ids.chunks(options.batch_size.max(1)) {
            for &source_id in batch {
                let source = match combined.get(&source_id) {
                    Some(vector) => vector,
                    None => {
                        summary.failures += 1;
                        warn!(book_id = %source_id, "No vector for source book, skipping");
                        continue;
                    }
                };

                let mut entries = Vec::new();
                for (&other_id, other) in &combined {
                    if other_id == source_id {
                        continue;
                    }
                    let score = cosine_similarity(source, other);
                    if score >= options.threshold {
                        entries.push(SimilarityEntry {
                            book_id: source_id,
                            similar_book_id: other_id,
                            similarity_score: score,
                            algorithm_type: COSINE_ALGORITHM.to_string(),
                            last_calculated: now,
                        });
                    }
                }

                summary.pairs_kept += entries.len();
                summary.sources_processed += 1;

                if options.dry_run {
                    continue;
                }

                if let Err(err) = self.store.replace_for_book(source_id, &entries).await {
                    summary.failures += 1;
                    warn!(book_id = %source_id, error = %err, "Failed to persist similarity rows");
                    continue;
                }

                if subset_rebuild && !entries.is_empty() {
                    let reversed: Vec<SimilarityEntry> = entries
                        .iter()
                        .map(|e| SimilarityEntry {
                            book_id: e.similar_book_id,
                            similar_book_id: e.book_id,
                            similarity_score: e.similarity_score,
                            algorithm_type: e.algorithm_type.clone(),
                            last_calculated: e.last_calculated,
                        })
                        .collect();
                    if let Err(err) = self.store.upsert_entries(&reversed).await {
                        warn!(book_id = %source_id, error = %err, "Failed to upsert reverse rows");
                    }
                }
            }
        }

        if summary.pairs_kept == 0 {
            warn!(
                threshold = options.threshold,
                "Similarity rebuild kept no pairs at this threshold"
            );
        }

        info!(
            sources = summary.sources_processed,
            pairs = summary.pairs_kept,
            failures = summary.failures,
            dry_run = options.dry_run,
            "Similarity rebuild complete"
        );
        Ok(summary)
    }

    /// Delete rows older than the staleness window.
    pub async fn purge_stale(&self, staleness_days: i64) -> Result<u64> {
        let cutoff = Utc::now() - Duration::days(staleness_days);
        let purged = self.store.purge_stale(cutoff).await?;
        info!(purged = purged, staleness_days = staleness_days, "Purged stale similarity rows");
        Ok(purged)
    }

    pub async fn count_stale(&self, staleness_days: i64) -> Result<i64> {
        let cutoff = Utc::now() - Duration::days(staleness_days);
        self.store.count_stale(cutoff).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::{InMemorySimilarityStore, InMemoryVectorStore};
    use crate::models::BookVector;

    fn vector(book_id: Uuid, genre: &[f32], popularity: f32) -> BookVector {
        BookVector {
            book_id,
            content_vector: vec![],
            genre_vector: genre.to_vec(),
            author_vector: vec![0.5],
            metadata_vector: vec![0.2, 1.0, 0.3],
            popularity_score: popularity,
            quality_score: 0.5,
            recency_score: 0.5,
            view_count: 0,
            download_count: 0,
            rating_average: 0.0,
            rating_count: 0,
            last_updated: Utc::now(),
        }
    }

    #[test]
    fn test_cosine_symmetry() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![0.5, 0.1, 0.9];
        assert_eq!(cosine_similarity(&a, &b), cosine_similarity(&b, &a));
    }

    #[test]
    fn test_cosine_self_similarity() {
        let a = vec![0.3, 0.7, 0.1];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_vectors() {
        let zero = vec![0.0, 0.0];
        let a = vec![1.0, 1.0];
        assert_eq!(cosine_similarity(&zero, &a), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cosine_zero_pads_unequal_lengths() {
        let short = vec![1.0, 0.0];
        let long = vec![1.0, 0.0, 0.0, 0.0];
        assert!((cosine_similarity(&short, &long) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_shared_features_score_higher_than_disjoint() {
        let a = vector(Uuid::new_v4(), &[1.0, 0.0, 0.0], 0.9);
        let b = vector(Uuid::new_v4(), &[1.0, 0.0, 0.0], 0.1);
        let c = vector(Uuid::new_v4(), &[0.0, 0.0, 1.0], 0.9);

        let same_genre = cosine_similarity(&a.combined(), &b.combined());
        let other_genre = cosine_similarity(&a.combined(), &c.combined());

        // Identical genres but different popularity: close to but below 1.0
        assert!(same_genre < 1.0);
        assert!(same_genre > other_genre);
    }

    #[tokio::test]
    async fn test_rebuild_respects_threshold() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let store = Arc::new(InMemorySimilarityStore::new());

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        vectors.upsert(&vector(a, &[1.0, 0.0, 0.0], 0.5)).await.unwrap();
        vectors.upsert(&vector(b, &[1.0, 0.1, 0.0], 0.5)).await.unwrap();
        vectors.upsert(&vector(c, &[0.0, 0.0, 1.0], 0.5)).await.unwrap();

        let builder = MatrixBuilder::new(vectors, store.clone());
        let summary = builder
            .rebuild(&MatrixBuildOptions {
                threshold: 0.9,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(summary.sources_processed, 3);
        // Every persisted row satisfies the threshold
        for source in [a, b, c] {
            for entry in store.most_similar(source, 10).await.unwrap() {
                assert!(entry.similarity_score >= 0.9);
            }
        }
        // a and b are near-duplicates; both directions present
        assert!(!store.most_similar(a, 10).await.unwrap().is_empty());
        assert!(!store.most_similar(b, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rebuild_high_threshold_keeps_nothing() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let store = Arc::new(InMemorySimilarityStore::new());

        vectors
            .upsert(&vector(Uuid::new_v4(), &[1.0, 0.0, 0.0], 0.2))
            .await
            .unwrap();
        vectors
            .upsert(&vector(Uuid::new_v4(), &[0.0, 1.0, 0.0], 0.9))
            .await
            .unwrap();

        let builder = MatrixBuilder::new(vectors, store.clone());
        let summary = builder
            .rebuild(&MatrixBuildOptions {
                threshold: 0.999,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(summary.pairs_kept, 0);
        assert_eq!(summary.failures, 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let store = Arc::new(InMemorySimilarityStore::new());

        vectors
            .upsert(&vector(Uuid::new_v4(), &[1.0, 0.0], 0.5))
            .await
            .unwrap();
        vectors
            .upsert(&vector(Uuid::new_v4(), &[1.0, 0.0], 0.5))
            .await
            .unwrap();

        let builder = MatrixBuilder::new(vectors, store.clone());
        let summary = builder
            .rebuild(&MatrixBuildOptions {
                dry_run: true,
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(summary.pairs_kept > 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_subset_rebuild_writes_reverse_rows() {
        let vectors = Arc::new(InMemoryVectorStore::new());
        let store = Arc::new(InMemorySimilarityStore::new());

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        vectors.upsert(&vector(a, &[1.0, 0.0], 0.5)).await.unwrap();
        vectors.upsert(&vector(b, &[1.0, 0.05], 0.5)).await.unwrap();

        let builder = MatrixBuilder::new(vectors, store.clone());
        builder
            .rebuild(&MatrixBuildOptions {
                book_ids: Some(vec![a]),
                ..Default::default()
            })
            .await
            .unwrap();

        let forward = store.most_similar(a, 10).await.unwrap();
        let reverse = store.most_similar(b, 10).await.unwrap();
        assert_eq!(forward.len(), 1);
        assert_eq!(reverse.len(), 1);
        assert_eq!(forward[0].similarity_score, reverse[0].similarity_score);
    }
}
