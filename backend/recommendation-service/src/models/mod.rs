use chrono::{DateTime, Utc};
use data_providers::BookSummary;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

/// Recommendation strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    ContentBased,
    Collaborative,
    Popularity,
    Hybrid,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ContentBased => "content_based",
            Self::Collaborative => "collaborative",
            Self::Popularity => "popularity",
            Self::Hybrid => "hybrid",
        }
    }

    pub fn all() -> [Algorithm; 4] {
        [
            Self::ContentBased,
            Self::Collaborative,
            Self::Popularity,
            Self::Hybrid,
        ]
    }
}

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Algorithm {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "content_based" => Ok(Self::ContentBased),
            "collaborative" => Ok(Self::Collaborative),
            "popularity" => Ok(Self::Popularity),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(AppError::Validation(format!("Unknown algorithm: {}", other))),
        }
    }
}

/// Why a recommendation set was generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationContext {
    General,
    PostCompletion,
    GoalCompleted,
}

impl RecommendationContext {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::PostCompletion => "post_completion",
            Self::GoalCompleted => "goal_completed",
        }
    }
}

impl std::fmt::Display for RecommendationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RecommendationContext {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "general" => Ok(Self::General),
            "post_completion" => Ok(Self::PostCompletion),
            "goal_completed" => Ok(Self::GoalCompleted),
            other => Err(AppError::Validation(format!("Unknown context: {}", other))),
        }
    }
}

/// User action on a book, optionally tied to a served recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InteractionType {
    View,
    Download,
    Rating,
    Bookmark,
    Purchase,
}

impl InteractionType {
    /// Weight used by collaborative scoring and trending aggregation.
    pub fn weight(&self) -> f64 {
        match self {
            Self::View => 1.0,
            Self::Rating => 2.0,
            Self::Bookmark => 3.0,
            Self::Download => 5.0,
            Self::Purchase => 8.0,
        }
    }

    /// Important interactions get extended retention during cleanup.
    pub fn is_important(&self) -> bool {
        matches!(self, Self::Rating | Self::Bookmark | Self::Purchase)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Download => "download",
            Self::Rating => "rating",
            Self::Bookmark => "bookmark",
            Self::Purchase => "purchase",
        }
    }
}

impl std::fmt::Display for InteractionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for InteractionType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Self::View),
            "download" => Ok(Self::Download),
            "rating" => Ok(Self::Rating),
            "bookmark" => Ok(Self::Bookmark),
            "purchase" => Ok(Self::Purchase),
            other => Err(AppError::Validation(format!(
                "Unknown interaction type: {}",
                other
            ))),
        }
    }
}

/// Trending snapshot window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl TrendPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn hours(&self) -> i64 {
        match self {
            Self::Daily => 24,
            Self::Weekly => 24 * 7,
            Self::Monthly => 24 * 30,
        }
    }

    pub fn all() -> [TrendPeriod; 3] {
        [Self::Daily, Self::Weekly, Self::Monthly]
    }
}

impl std::fmt::Display for TrendPeriod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TrendPeriod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(AppError::Validation(format!("Unknown period: {}", other))),
        }
    }
}

/// What a trending snapshot ranks by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendType {
    MostViewed,
    MostDownloaded,
    HighestRated,
    Rising,
}

impl TrendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MostViewed => "most_viewed",
            Self::MostDownloaded => "most_downloaded",
            Self::HighestRated => "highest_rated",
            Self::Rising => "rising",
        }
    }

    pub fn all() -> [TrendType; 4] {
        [
            Self::MostViewed,
            Self::MostDownloaded,
            Self::HighestRated,
            Self::Rising,
        ]
    }
}

impl std::fmt::Display for TrendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TrendType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "most_viewed" => Ok(Self::MostViewed),
            "most_downloaded" => Ok(Self::MostDownloaded),
            "highest_rated" => Ok(Self::HighestRated),
            "rising" => Ok(Self::Rising),
            other => Err(AppError::Validation(format!("Unknown trend type: {}", other))),
        }
    }
}

/// Per-book feature representation. Exactly one row per book.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookVector {
    pub book_id: Uuid,
    pub content_vector: Vec<f32>,
    pub genre_vector: Vec<f32>,
    pub author_vector: Vec<f32>,
    pub metadata_vector: Vec<f32>,
    pub popularity_score: f32,
    pub quality_score: f32,
    pub recency_score: f32,
    pub view_count: i64,
    pub download_count: i64,
    pub rating_average: f32,
    pub rating_count: i64,
    pub last_updated: DateTime<Utc>,
}

impl BookVector {
    /// Similarity input: all sub-vectors concatenated, then the derived
    /// scores. Callers zero-pad the shorter of two combined vectors.
    pub fn combined(&self) -> Vec<f32> {
        let mut combined = Vec::with_capacity(
            self.content_vector.len()
                + self.genre_vector.len()
                + self.author_vector.len()
                + self.metadata_vector.len()
                + 3,
        );
        combined.extend_from_slice(&self.content_vector);
        combined.extend_from_slice(&self.genre_vector);
        combined.extend_from_slice(&self.author_vector);
        combined.extend_from_slice(&self.metadata_vector);
        combined.push(self.popularity_score);
        combined.push(self.quality_score);
        combined.push(self.recency_score);
        combined
    }
}

/// One directed row of the similarity matrix.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimilarityEntry {
    pub book_id: Uuid,
    pub similar_book_id: Uuid,
    pub similarity_score: f32,
    pub algorithm_type: String,
    pub last_calculated: DateTime<Utc>,
}

/// Header of one generated recommendation batch. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationSet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub algorithm: Algorithm,
    pub context: RecommendationContext,
    pub confidence_score: f32,
    pub created_at: DateTime<Utc>,
}

/// One ranked item in a recommendation set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub set_id: Uuid,
    pub book_id: Uuid,
    pub rank: i32,
    pub score: f32,
    pub reasons: Vec<String>,
}

/// Append-only user action record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInteraction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub interaction_type: InteractionType,
    pub recommendation_id: Option<Uuid>,
    pub rating_value: Option<f32>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Explicit 1-5 relevance rating of a served recommendation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationFeedback {
    pub id: Uuid,
    pub user_id: Uuid,
    pub recommendation_id: Uuid,
    pub rating: i16,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationFrequency {
    Daily,
    Weekly,
    Monthly,
}

impl RecommendationFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::str::FromStr for RecommendationFrequency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            other => Err(AppError::Validation(format!(
                "Unknown recommendation frequency: {}",
                other
            ))),
        }
    }
}

/// Per-user preference snapshot, read by every generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: Uuid,
    pub preferred_genres: Vec<String>,
    pub preferred_authors: Vec<String>,
    pub preferred_languages: Vec<String>,
    pub reading_level: Option<String>,
    pub enable_recommendations: bool,
    pub recommendation_frequency: RecommendationFrequency,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Profile used when a user has never saved preferences.
    pub fn default_for(user_id: Uuid) -> Self {
        Self {
            user_id,
            preferred_genres: Vec::new(),
            preferred_authors: Vec::new(),
            preferred_languages: Vec::new(),
            reading_level: None,
            enable_recommendations: true,
            recommendation_frequency: RecommendationFrequency::Weekly,
            updated_at: Utc::now(),
        }
    }
}

/// One row of a (period, trend_type) trending snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendingBook {
    pub id: Uuid,
    pub book_id: Uuid,
    pub period: TrendPeriod,
    pub trend_type: TrendType,
    pub rank: i32,
    pub score: f64,
    pub interaction_count: i64,
    pub avg_rating: f32,
    pub is_active: bool,
    pub computed_at: DateTime<Utc>,
}

/// Generator output: a candidate with its score and human-readable reasons.
#[derive(Debug, Clone)]
pub struct ScoredBook {
    pub book: BookSummary,
    pub score: f32,
    pub reasons: Vec<String>,
}

/// Orchestrator result handed to the HTTP layer. `set_id` is absent when
/// nothing was persisted (empty result, or recommendations disabled).
#[derive(Debug, Clone)]
pub struct RecommendationOutcome {
    pub set_id: Option<Uuid>,
    pub books: Vec<ScoredBook>,
    pub algorithm_used: Algorithm,
    pub confidence_score: f32,
}
