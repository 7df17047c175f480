//! Storage traits and repositories.
//!
//! The service layer talks to these traits only; `Pg*` implementations own
//! the SQL, and the in-memory implementations in [`memory`] back tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Algorithm, BookVector, InteractionType, Recommendation, RecommendationFeedback,
    RecommendationSet, SimilarityEntry, TrendPeriod, TrendType, TrendingBook, UserInteraction,
    UserProfile,
};

mod interaction_repo;
pub mod memory;
mod profile_repo;
mod recommendation_repo;
mod similarity_repo;
mod trending_repo;
mod vector_repo;

pub use interaction_repo::PgInteractionStore;
pub use profile_repo::PgProfileStore;
pub use recommendation_repo::PgRecommendationStore;
pub use similarity_repo::PgSimilarityStore;
pub use trending_repo::PgTrendingStore;
pub use vector_repo::PgVectorStore;

/// Per-book interaction rollup over a time window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionAggregate {
    pub book_id: Uuid,
    pub views: i64,
    pub downloads: i64,
    pub ratings: i64,
    pub bookmarks: i64,
    pub purchases: i64,
    pub rating_sum: f64,
    pub last_interaction: Option<DateTime<Utc>>,
}

impl InteractionAggregate {
    pub fn total(&self) -> i64 {
        self.views + self.downloads + self.ratings + self.bookmarks + self.purchases
    }

    pub fn avg_rating(&self) -> f32 {
        if self.ratings == 0 {
            0.0
        } else {
            (self.rating_sum / self.ratings as f64) as f32
        }
    }
}

/// An interaction attributed to a served recommendation.
#[derive(Debug, Clone)]
pub struct AttributedInteraction {
    pub recommendation_id: Uuid,
    pub interaction_type: InteractionType,
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn get(&self, book_id: Uuid) -> Result<Option<BookVector>>;
    async fn upsert(&self, vector: &BookVector) -> Result<()>;
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<BookVector>>;
    async fn all_ids(&self) -> Result<Vec<Uuid>>;
    /// Highest-popularity vectors, exclusion-filtered, id-ascending on ties.
    async fn top_by_popularity(&self, limit: i64, exclude: &[Uuid]) -> Result<Vec<BookVector>>;
    async fn delete(&self, book_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait SimilarityStore: Send + Sync {
    /// Atomically replace every outgoing row for `book_id`. A concurrent
    /// reader sees either the old or the new row set, never a mix.
    async fn replace_for_book(&self, book_id: Uuid, entries: &[SimilarityEntry]) -> Result<()>;
    /// Upsert individual directed rows without touching the rest of their
    /// source books' row sets (used for reverse rows in subset rebuilds).
    async fn upsert_entries(&self, entries: &[SimilarityEntry]) -> Result<()>;
    /// Rows for `book_id`, score-descending, similar id ascending on ties.
    async fn most_similar(&self, book_id: Uuid, limit: i64) -> Result<Vec<SimilarityEntry>>;
    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<u64>;
    async fn count_stale(&self, cutoff: DateTime<Utc>) -> Result<i64>;
    async fn count(&self) -> Result<i64>;
}

#[async_trait]
pub trait RecommendationStore: Send + Sync {
    async fn insert_set(&self, set: &RecommendationSet, items: &[Recommendation]) -> Result<()>;
    async fn recent_recommended_book_ids(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Uuid>>;
    async fn sets_since(
        &self,
        since: DateTime<Utc>,
        algorithm: Option<Algorithm>,
        user_id: Option<Uuid>,
    ) -> Result<Vec<RecommendationSet>>;
    async fn items_for_sets(&self, set_ids: &[Uuid]) -> Result<Vec<Recommendation>>;
    async fn count_sets_older_than(&self, cutoff: DateTime<Utc>) -> Result<i64>;
    async fn purge_sets_older_than(&self, cutoff: DateTime<Utc>, batch_size: i64) -> Result<u64>;
}

#[async_trait]
pub trait InteractionStore: Send + Sync {
    async fn record(&self, interaction: &UserInteraction) -> Result<()>;
    async fn record_feedback(&self, feedback: &RecommendationFeedback) -> Result<()>;
    /// Books the user recently interacted with, most recent first.
    async fn recent_books_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Uuid>>;
    /// Users (other than `user_id`) who interacted with any of `book_ids`,
    /// with the number of shared books, highest overlap first.
    async fn peers_for_books(
        &self,
        user_id: Uuid,
        book_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<(Uuid, i64)>>;
    /// Books interacted with by any of `user_ids`, weighted by interaction
    /// type, heaviest first.
    async fn weighted_books_for_users(
        &self,
        user_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<(Uuid, f64)>>;
    async fn aggregates_since(&self, since: DateTime<Utc>) -> Result<Vec<InteractionAggregate>>;
    async fn attributed_since(&self, since: DateTime<Utc>) -> Result<Vec<AttributedInteraction>>;
    async fn feedback_since(&self, since: DateTime<Utc>) -> Result<Vec<RecommendationFeedback>>;
    /// (user, interaction count) pairs over the window, for segmentation.
    async fn user_activity_since(&self, since: DateTime<Utc>) -> Result<Vec<(Uuid, i64)>>;
    async fn count_purgeable(
        &self,
        routine_cutoff: DateTime<Utc>,
        important_cutoff: DateTime<Utc>,
    ) -> Result<(i64, i64)>;
    async fn purge(
        &self,
        routine_cutoff: DateTime<Utc>,
        important_cutoff: DateTime<Utc>,
    ) -> Result<u64>;
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserProfile>>;
    async fn upsert(&self, profile: &UserProfile) -> Result<()>;
}

#[async_trait]
pub trait TrendingStore: Send + Sync {
    /// Atomically supersede the active snapshot for (period, trend_type):
    /// old rows are flipped inactive, new rows inserted active.
    async fn replace_snapshot(
        &self,
        period: TrendPeriod,
        trend_type: TrendType,
        rows: &[TrendingBook],
    ) -> Result<()>;
    async fn get_active(
        &self,
        period: TrendPeriod,
        trend_type: TrendType,
        limit: i64,
    ) -> Result<Vec<TrendingBook>>;
    async fn count_inactive_older_than(&self, cutoff: DateTime<Utc>) -> Result<i64>;
    async fn purge_inactive_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
