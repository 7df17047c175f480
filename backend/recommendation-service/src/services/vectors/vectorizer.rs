use chrono::{DateTime, Utc};
use data_providers::BookSummary;

/// Controlled genre vocabulary. Order is part of the vector layout; append
/// only, never reorder.
pub const GENRE_VOCABULARY: [&str; 16] = [
    "Fiction",
    "Non-fiction",
    "Education",
    "Science",
    "Technology",
    "History",
    "Biography",
    "Children",
    "Poetry",
    "Business",
    "Health",
    "Religion",
    "Romance",
    "Mystery",
    "Self-help",
    "Culture",
];

pub const CONTENT_DIM: usize = 32;
pub const GENRE_DIM: usize = GENRE_VOCABULARY.len();
pub const AUTHOR_DIM: usize = 4;
pub const METADATA_DIM: usize = 3;

/// Turns catalog metadata into the fixed-length sub-vectors of a book
/// vector.
///
/// The default implementation is deliberately coarse (hashed title tokens,
/// hash-bucketed authors); a learned embedding can replace it behind this
/// trait without touching similarity computation or the generators.
pub trait BookVectorizer: Send + Sync {
    fn content_vector(&self, book: &BookSummary) -> Vec<f32>;
    fn genre_vector(&self, book: &BookSummary) -> Vec<f32>;
    fn author_vector(&self, book: &BookSummary) -> Vec<f32>;
    fn metadata_vector(&self, book: &BookSummary, recency_score: f32) -> Vec<f32>;
}

/// view_count / max_view_count across the corpus, clamped to [0, 1].
pub fn popularity_score(view_count: i64, max_view_count: i64) -> f32 {
    if max_view_count <= 0 || view_count <= 0 {
        return 0.0;
    }
    (view_count as f32 / max_view_count as f32).clamp(0.0, 1.0)
}

/// average rating / 5, clamped. Zero ratings yield 0.
pub fn quality_score(average_rating: f32, rating_count: i64) -> f32 {
    if rating_count == 0 {
        return 0.0;
    }
    (average_rating / 5.0).clamp(0.0, 1.0)
}

/// max(0, 1 - days_since_publication / 365). Unknown publication date → 0.
pub fn recency_score(published_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> f32 {
    match published_at {
        Some(published) => {
            let days = (now - published).num_days() as f32;
            (1.0 - days / 365.0).max(0.0)
        }
        None => 0.0,
    }
}

fn fnv1a(input: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|x| *x /= norm);
    }
}

pub struct DefaultVectorizer {
    primary_language: String,
}

impl DefaultVectorizer {
    pub fn new(primary_language: impl Into<String>) -> Self {
        Self {
            primary_language: primary_language.into(),
        }
    }
}

impl BookVectorizer for DefaultVectorizer {
    /// Hashed bag-of-words over title tokens, L2-normalized.
    fn content_vector(&self, book: &BookSummary) -> Vec<f32> {
        let mut vector = vec![0.0f32; CONTENT_DIM];
        for token in book
            .title
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 1)
        {
            let bucket = (fnv1a(&token.to_lowercase()) % CONTENT_DIM as u64) as usize;
            vector[bucket] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }

    /// Membership over the controlled vocabulary; unknown categories are
    /// dropped.
    fn genre_vector(&self, book: &BookSummary) -> Vec<f32> {
        let mut vector = vec![0.0f32; GENRE_DIM];
        for category in &book.categories {
            if let Some(index) = GENRE_VOCABULARY
                .iter()
                .position(|genre| genre.eq_ignore_ascii_case(category))
            {
                vector[index] = 1.0;
            }
        }
        vector
    }

    /// Coarse hash buckets over author names. A placeholder, not an
    /// embedding; collisions between unrelated authors are expected.
    fn author_vector(&self, book: &BookSummary) -> Vec<f32> {
        let mut vector = vec![0.0f32; AUTHOR_DIM];
        for author in &book.authors {
            let bucket = (fnv1a(&author.to_lowercase()) % AUTHOR_DIM as u64) as usize;
            vector[bucket] += 1.0;
        }
        l2_normalize(&mut vector);
        vector
    }

    /// [normalized title length, language-match flag, recency score]
    fn metadata_vector(&self, book: &BookSummary, recency_score: f32) -> Vec<f32> {
        let title_length = (book.title.len() as f32 / 100.0).min(1.0);
        let language_match = match &book.language {
            Some(language) if language.eq_ignore_ascii_case(&self.primary_language) => 1.0,
            _ => 0.0,
        };
        vec![title_length, language_match, recency_score]
    }
}
