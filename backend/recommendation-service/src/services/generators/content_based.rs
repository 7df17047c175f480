use async_trait::async_trait;
use data_providers::{BookDataProvider, BookSummary, ReadingDataProvider};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use super::{rank_and_truncate, GenerationRequest, RecommendationGenerator};
use crate::db::SimilarityStore;
use crate::error::Result;
use crate::models::{Algorithm, ScoredBook};

/// Completed books used as similarity seeds.
const MAX_SEED_BOOKS: usize = 5;
/// Similar books pulled per seed.
const SIMILAR_PER_SEED: i64 = 10;
/// Candidate pool fetched per preferred-genre query.
const GENRE_POOL_MULTIPLIER: usize = 3;

const GENRE_WEIGHT: f32 = 0.6;
const AUTHOR_WEIGHT: f32 = 0.4;
/// Similarity candidates are slightly discounted against exact preference
/// matches so stated preferences win ties.
const SIMILARITY_DISCOUNT: f32 = 0.95;

pub const RECENT_READING_REASON: &str = "Based on your recent reading.";

/// Ranks candidates by overlap with the user's stated preferences and by
/// similarity-matrix proximity to their recently completed books.
pub struct ContentBasedGenerator {
    books: Arc<dyn BookDataProvider>,
    reading: Arc<dyn ReadingDataProvider>,
    similarity: Arc<dyn SimilarityStore>,
}

struct Candidate {
    score: f32,
    reasons: Vec<String>,
}

impl ContentBasedGenerator {
    pub fn new(
        books: Arc<dyn BookDataProvider>,
        reading: Arc<dyn ReadingDataProvider>,
        similarity: Arc<dyn SimilarityStore>,
    ) -> Self {
        Self {
            books,
            reading,
            similarity,
        }
    }

    fn preference_score(&self, book: &BookSummary, request: &GenerationRequest) -> (f32, Vec<String>) {
        let profile = &request.profile;
        let mut reasons = Vec::new();

        let genre_overlap = if profile.preferred_genres.is_empty() {
            0.0
        } else {
            let matched: Vec<&String> = book
                .categories
                .iter()
                .filter(|c| {
                    profile
                        .preferred_genres
                        .iter()
                        .any(|g| g.eq_ignore_ascii_case(c))
                })
                .collect();
            if let Some(genre) = matched.first() {
                reasons.push(format!("Matches your interest in {}.", genre));
            }
            matched.len() as f32 / profile.preferred_genres.len() as f32
        };

        let author_match = if book.authors.iter().any(|a| {
            profile
                .preferred_authors
                .iter()
                .any(|p| p.eq_ignore_ascii_case(a))
        }) {
            reasons.push("By an author you like.".to_string());
            1.0
        } else {
            0.0
        };

        let score = (genre_overlap * GENRE_WEIGHT + author_match * AUTHOR_WEIGHT).clamp(0.0, 1.0);
        (score, reasons)
    }

    /// Candidates from the preferred-genre catalog slice.
    async fn preference_candidates(
        &self,
        request: &GenerationRequest,
        aggregated: &mut HashMap<Uuid, Candidate>,
        summaries: &mut HashMap<Uuid, BookSummary>,
    ) {
        if request.profile.preferred_genres.is_empty() {
            return;
        }

        let pool = (request.count * GENRE_POOL_MULTIPLIER) as i64;
        let books = match self
            .books
            .get_books_by_category(&request.profile.preferred_genres, pool)
            .await
        {
            Ok(books) => books,
            Err(err) => {
                warn!(error = %err, "Preferred-genre lookup failed");
                return;
            }
        };

        for book in books {
            if request.exclude.contains(&book.id) {
                continue;
            }
            let (score, reasons) = self.preference_score(&book, request);
            if score <= 0.0 {
                continue;
            }
            merge_candidate(aggregated, book.id, score, reasons);
            summaries.entry(book.id).or_insert(book);
        }
    }

    /// Candidates near the user's recently completed books in the
    /// similarity matrix.
    async fn similarity_candidates(
        &self,
        request: &GenerationRequest,
        aggregated: &mut HashMap<Uuid, Candidate>,
        summaries: &mut HashMap<Uuid, BookSummary>,
    ) {
        let completed = match self.reading.get_user_completed_books(request.user_id).await {
            Ok(records) => records,
            Err(err) => {
                warn!(user_id = %request.user_id, error = %err, "Reading history unavailable");
                return;
            }
        };

        let mut similar_ids = Vec::new();
        for record in completed.iter().take(MAX_SEED_BOOKS) {
            let entries = match self
                .similarity
                .most_similar(record.book_id, SIMILAR_PER_SEED)
                .await
            {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(book_id = %record.book_id, error = %err, "Similarity lookup failed");
                    continue;
                }
            };
            for entry in entries {
                if request.exclude.contains(&entry.similar_book_id) {
                    continue;
                }
                let score = (entry.similarity_score * SIMILARITY_DISCOUNT).clamp(0.0, 1.0);
                merge_candidate(
                    aggregated,
                    entry.similar_book_id,
                    score,
                    vec![RECENT_READING_REASON.to_string()],
                );
                similar_ids.push(entry.similar_book_id);
            }
        }

        let missing: Vec<Uuid> = similar_ids
            .into_iter()
            .filter(|id| !summaries.contains_key(id))
            .collect();
        if missing.is_empty() {
            return;
        }
        match self.books.get_books_by_ids(&missing).await {
            Ok(books) => {
                for book in books {
                    summaries.entry(book.id).or_insert(book);
                }
            }
            Err(err) => warn!(error = %err, "Catalog lookup failed for similar books"),
        }
    }
}

fn merge_candidate(
    aggregated: &mut HashMap<Uuid, Candidate>,
    book_id: Uuid,
    score: f32,
    reasons: Vec<String>,
) {
    let entry = aggregated.entry(book_id).or_insert(Candidate {
        score: 0.0,
        reasons: Vec::new(),
    });
    if score > entry.score {
        entry.score = score;
    }
    for reason in reasons {
        if !entry.reasons.contains(&reason) {
            entry.reasons.push(reason);
        }
    }
}

#[async_trait]
impl RecommendationGenerator for ContentBasedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<ScoredBook>> {
        let mut aggregated: HashMap<Uuid, Candidate> = HashMap::new();
        let mut summaries: HashMap<Uuid, BookSummary> = HashMap::new();

        self.preference_candidates(request, &mut aggregated, &mut summaries)
            .await;
        self.similarity_candidates(request, &mut aggregated, &mut summaries)
            .await;

        let candidates: Vec<ScoredBook> = aggregated
            .into_iter()
            .filter_map(|(book_id, candidate)| {
                summaries.remove(&book_id).map(|book| ScoredBook {
                    book,
                    score: candidate.score,
                    reasons: candidate.reasons,
                })
            })
            .collect();

        Ok(rank_and_truncate(candidates, request.count))
    }

    fn algorithm(&self) -> Algorithm {
        Algorithm::ContentBased
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemorySimilarityStore;
    use crate::models::{RecommendationContext, SimilarityEntry, UserProfile};
    use chrono::Utc;
    use data_providers::{InMemoryBookProvider, InMemoryReadingProvider, ReadingRecord, ReadingStatus};
    use std::collections::HashSet;

    fn seed_book(
        provider: &InMemoryBookProvider,
        title: &str,
        categories: Vec<&str>,
        authors: Vec<&str>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        provider.add_book(BookSummary {
            id,
            title: title.to_string(),
            authors: authors.into_iter().map(String::from).collect(),
            categories: categories.into_iter().map(String::from).collect(),
            language: Some("en".to_string()),
            average_rating: 4.0,
            ratings_count: 8,
            view_count: 25,
            download_count: 2,
            published_at: Some(Utc::now()),
            cover_image: None,
        });
        id
    }

    fn profile_with_genres(user_id: Uuid, genres: Vec<&str>) -> UserProfile {
        UserProfile {
            preferred_genres: genres.into_iter().map(String::from).collect(),
            ..UserProfile::default_for(user_id)
        }
    }

    #[tokio::test]
    async fn test_preferred_genre_candidates() {
        let books = Arc::new(InMemoryBookProvider::new());
        let fiction = seed_book(&books, "Nervous Conditions", vec!["Fiction"], vec![]);
        let _science = seed_book(&books, "Cells", vec!["Science"], vec![]);

        let user = Uuid::new_v4();
        let generator = ContentBasedGenerator::new(
            books,
            Arc::new(InMemoryReadingProvider::new()),
            Arc::new(InMemorySimilarityStore::new()),
        );

        let request = GenerationRequest::new(
            user,
            profile_with_genres(user, vec!["Fiction"]),
            HashSet::new(),
            5,
            RecommendationContext::General,
        );
        let result = generator.generate(&request).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].book.id, fiction);
        assert!(result[0].reasons[0].contains("Fiction"));
    }

    #[tokio::test]
    async fn test_similarity_seeds_from_completed_books() {
        let books = Arc::new(InMemoryBookProvider::new());
        let read = seed_book(&books, "Seed", vec!["Fiction"], vec![]);
        let similar = seed_book(&books, "Neighbor", vec!["Fiction"], vec![]);

        let reading = Arc::new(InMemoryReadingProvider::new());
        let user = Uuid::new_v4();
        let now = Utc::now();
        reading.add_record(ReadingRecord {
            user_id: user,
            book_id: read,
            status: ReadingStatus::Completed,
            progress_percent: 100.0,
            started_at: now,
            finished_at: Some(now),
            last_read_at: now,
        });

        let similarity = Arc::new(InMemorySimilarityStore::new());
        similarity
            .replace_for_book(
                read,
                &[SimilarityEntry {
                    book_id: read,
                    similar_book_id: similar,
                    similarity_score: 0.8,
                    algorithm_type: "cosine".to_string(),
                    last_calculated: now,
                }],
            )
            .await
            .unwrap();

        let generator = ContentBasedGenerator::new(books, reading, similarity);
        // Exclude the already-read seed itself
        let request = GenerationRequest::new(
            user,
            UserProfile::default_for(user),
            [read].into_iter().collect(),
            5,
            RecommendationContext::General,
        );
        let result = generator.generate(&request).await.unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].book.id, similar);
        assert_eq!(result[0].reasons, vec![RECENT_READING_REASON.to_string()]);
        assert!((result[0].score - 0.8 * SIMILARITY_DISCOUNT).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_no_data_returns_empty_not_error() {
        let user = Uuid::new_v4();
        let generator = ContentBasedGenerator::new(
            Arc::new(InMemoryBookProvider::new()),
            Arc::new(InMemoryReadingProvider::new()),
            Arc::new(InMemorySimilarityStore::new()),
        );
        let request = GenerationRequest::new(
            user,
            UserProfile::default_for(user),
            HashSet::new(),
            5,
            RecommendationContext::General,
        );
        assert!(generator.generate(&request).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_author_preference_boost() {
        let books = Arc::new(InMemoryBookProvider::new());
        let by_author = seed_book(
            &books,
            "Purple Hibiscus",
            vec!["Fiction"],
            vec!["Chimamanda Ngozi Adichie"],
        );
        let other = seed_book(&books, "Plain Fiction", vec!["Fiction"], vec!["Someone Else"]);

        let user = Uuid::new_v4();
        let mut profile = profile_with_genres(user, vec!["Fiction"]);
        profile.preferred_authors = vec!["Chimamanda Ngozi Adichie".to_string()];

        let generator = ContentBasedGenerator::new(
            books,
            Arc::new(InMemoryReadingProvider::new()),
            Arc::new(InMemorySimilarityStore::new()),
        );
        let request =
            GenerationRequest::new(user, profile, HashSet::new(), 5, RecommendationContext::General);
        let result = generator.generate(&request).await.unwrap();

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].book.id, by_author);
        assert_eq!(result[1].book.id, other);
        assert!(result[0].score > result[1].score);
    }
}
