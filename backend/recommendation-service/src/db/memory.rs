//! In-memory store implementations.
//!
//! Behavior-compatible with the Postgres repositories (ordering, exclusion,
//! retention rules); used as fixtures by unit and integration tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use super::{
    AttributedInteraction, InteractionAggregate, InteractionStore, ProfileStore,
    RecommendationStore, SimilarityStore, TrendingStore, VectorStore,
};
use crate::error::Result;
use crate::models::{
    Algorithm, BookVector, Recommendation, RecommendationFeedback, RecommendationSet,
    SimilarityEntry, TrendPeriod, TrendType, TrendingBook, UserInteraction, UserProfile,
};

#[derive(Default)]
pub struct InMemoryVectorStore {
    vectors: RwLock<HashMap<Uuid, BookVector>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vectors.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn get(&self, book_id: Uuid) -> Result<Option<BookVector>> {
        Ok(self.vectors.read().unwrap().get(&book_id).cloned())
    }

    async fn upsert(&self, vector: &BookVector) -> Result<()> {
        self.vectors
            .write()
            .unwrap()
            .insert(vector.book_id, vector.clone());
        Ok(())
    }

    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<BookVector>> {
        let vectors = self.vectors.read().unwrap();
        Ok(ids.iter().filter_map(|id| vectors.get(id).cloned()).collect())
    }

    async fn all_ids(&self) -> Result<Vec<Uuid>> {
        let mut ids: Vec<Uuid> = self.vectors.read().unwrap().keys().copied().collect();
        ids.sort();
        Ok(ids)
    }

    async fn top_by_popularity(&self, limit: i64, exclude: &[Uuid]) -> Result<Vec<BookVector>> {
        let mut vectors: Vec<BookVector> = self
            .vectors
            .read()
            .unwrap()
            .values()
            .filter(|v| !exclude.contains(&v.book_id))
            .cloned()
            .collect();
        vectors.sort_by(|a, b| {
            b.popularity_score
                .partial_cmp(&a.popularity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.book_id.cmp(&b.book_id))
        });
        vectors.truncate(limit as usize);
        Ok(vectors)
    }

    async fn delete(&self, book_id: Uuid) -> Result<bool> {
        Ok(self.vectors.write().unwrap().remove(&book_id).is_some())
    }
}

#[derive(Default)]
pub struct InMemorySimilarityStore {
    entries: RwLock<HashMap<Uuid, Vec<SimilarityEntry>>>,
}

impl InMemorySimilarityStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SimilarityStore for InMemorySimilarityStore {
    async fn replace_for_book(&self, book_id: Uuid, entries: &[SimilarityEntry]) -> Result<()> {
        self.entries
            .write()
            .unwrap()
            .insert(book_id, entries.to_vec());
        Ok(())
    }

    async fn upsert_entries(&self, entries: &[SimilarityEntry]) -> Result<()> {
        let mut map = self.entries.write().unwrap();
        for entry in entries {
            let rows = map.entry(entry.book_id).or_default();
            if let Some(existing) = rows
                .iter_mut()
                .find(|e| e.similar_book_id == entry.similar_book_id)
            {
                *existing = entry.clone();
            } else {
                rows.push(entry.clone());
            }
        }
        Ok(())
    }

    async fn most_similar(&self, book_id: Uuid, limit: i64) -> Result<Vec<SimilarityEntry>> {
        let mut entries = self
            .entries
            .read()
            .unwrap()
            .get(&book_id)
            .cloned()
            .unwrap_or_default();
        entries.sort_by(|a, b| {
            b.similarity_score
                .partial_cmp(&a.similarity_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.similar_book_id.cmp(&b.similar_book_id))
        });
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn purge_stale(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut map = self.entries.write().unwrap();
        let mut purged = 0u64;
        for entries in map.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.last_calculated >= cutoff);
            purged += (before - entries.len()) as u64;
        }
        map.retain(|_, entries| !entries.is_empty());
        Ok(purged)
    }

    async fn count_stale(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .entries
            .read()
            .unwrap()
            .values()
            .flatten()
            .filter(|e| e.last_calculated < cutoff)
            .count() as i64)
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.entries.read().unwrap().values().map(Vec::len).sum::<usize>() as i64)
    }
}

#[derive(Default)]
pub struct InMemoryRecommendationStore {
    sets: RwLock<Vec<RecommendationSet>>,
    items: RwLock<Vec<Recommendation>>,
}

impl InMemoryRecommendationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_count(&self) -> usize {
        self.sets.read().unwrap().len()
    }
}

#[async_trait]
impl RecommendationStore for InMemoryRecommendationStore {
    async fn insert_set(&self, set: &RecommendationSet, items: &[Recommendation]) -> Result<()> {
        self.sets.write().unwrap().push(set.clone());
        self.items.write().unwrap().extend(items.iter().cloned());
        Ok(())
    }

    async fn recent_recommended_book_ids(
        &self,
        user_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Uuid>> {
        let sets = self.sets.read().unwrap();
        let set_ids: Vec<Uuid> = sets
            .iter()
            .filter(|s| s.user_id == user_id && s.created_at >= since)
            .map(|s| s.id)
            .collect();
        let items = self.items.read().unwrap();
        let mut book_ids: Vec<Uuid> = items
            .iter()
            .filter(|i| set_ids.contains(&i.set_id))
            .map(|i| i.book_id)
            .collect();
        book_ids.sort();
        book_ids.dedup();
        Ok(book_ids)
    }

    async fn sets_since(
        &self,
        since: DateTime<Utc>,
        algorithm: Option<Algorithm>,
        user_id: Option<Uuid>,
    ) -> Result<Vec<RecommendationSet>> {
        let mut sets: Vec<RecommendationSet> = self
            .sets
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.created_at >= since)
            .filter(|s| algorithm.map(|a| s.algorithm == a).unwrap_or(true))
            .filter(|s| user_id.map(|u| s.user_id == u).unwrap_or(true))
            .cloned()
            .collect();
        sets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sets)
    }

    async fn items_for_sets(&self, set_ids: &[Uuid]) -> Result<Vec<Recommendation>> {
        let mut items: Vec<Recommendation> = self
            .items
            .read()
            .unwrap()
            .iter()
            .filter(|i| set_ids.contains(&i.set_id))
            .cloned()
            .collect();
        items.sort_by(|a, b| a.set_id.cmp(&b.set_id).then(a.rank.cmp(&b.rank)));
        Ok(items)
    }

    async fn count_sets_older_than(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .sets
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.created_at < cutoff)
            .count() as i64)
    }

    async fn purge_sets_older_than(
        &self,
        cutoff: DateTime<Utc>,
        _batch_size: i64,
    ) -> Result<u64> {
        let mut sets = self.sets.write().unwrap();
        let purged_ids: Vec<Uuid> = sets
            .iter()
            .filter(|s| s.created_at < cutoff)
            .map(|s| s.id)
            .collect();
        sets.retain(|s| s.created_at >= cutoff);
        self.items
            .write()
            .unwrap()
            .retain(|i| !purged_ids.contains(&i.set_id));
        Ok(purged_ids.len() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryInteractionStore {
    interactions: RwLock<Vec<UserInteraction>>,
    feedback: RwLock<Vec<RecommendationFeedback>>,
}

impl InMemoryInteractionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interaction_count(&self) -> usize {
        self.interactions.read().unwrap().len()
    }
}

#[async_trait]
impl InteractionStore for InMemoryInteractionStore {
    async fn record(&self, interaction: &UserInteraction) -> Result<()> {
        self.interactions.write().unwrap().push(interaction.clone());
        Ok(())
    }

    async fn record_feedback(&self, feedback: &RecommendationFeedback) -> Result<()> {
        self.feedback.write().unwrap().push(feedback.clone());
        Ok(())
    }

    async fn recent_books_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Uuid>> {
        let interactions = self.interactions.read().unwrap();
        let mut latest: HashMap<Uuid, DateTime<Utc>> = HashMap::new();
        for interaction in interactions.iter().filter(|i| i.user_id == user_id) {
            let entry = latest.entry(interaction.book_id).or_insert(interaction.created_at);
            if interaction.created_at > *entry {
                *entry = interaction.created_at;
            }
        }
        let mut books: Vec<(Uuid, DateTime<Utc>)> = latest.into_iter().collect();
        books.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(books.into_iter().take(limit as usize).map(|(id, _)| id).collect())
    }

    async fn peers_for_books(
        &self,
        user_id: Uuid,
        book_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<(Uuid, i64)>> {
        let interactions = self.interactions.read().unwrap();
        let mut shared: HashMap<Uuid, std::collections::HashSet<Uuid>> = HashMap::new();
        for interaction in interactions
            .iter()
            .filter(|i| i.user_id != user_id && book_ids.contains(&i.book_id))
        {
            shared
                .entry(interaction.user_id)
                .or_default()
                .insert(interaction.book_id);
        }
        let mut peers: Vec<(Uuid, i64)> = shared
            .into_iter()
            .map(|(user, books)| (user, books.len() as i64))
            .collect();
        peers.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        peers.truncate(limit as usize);
        Ok(peers)
    }

    async fn weighted_books_for_users(
        &self,
        user_ids: &[Uuid],
        limit: i64,
    ) -> Result<Vec<(Uuid, f64)>> {
        let interactions = self.interactions.read().unwrap();
        let mut weights: HashMap<Uuid, f64> = HashMap::new();
        for interaction in interactions.iter().filter(|i| user_ids.contains(&i.user_id)) {
            *weights.entry(interaction.book_id).or_insert(0.0) +=
                interaction.interaction_type.weight();
        }
        let mut books: Vec<(Uuid, f64)> = weights.into_iter().collect();
        books.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        books.truncate(limit as usize);
        Ok(books)
    }

    async fn aggregates_since(&self, since: DateTime<Utc>) -> Result<Vec<InteractionAggregate>> {
        let interactions = self.interactions.read().unwrap();
        let mut aggregates: HashMap<Uuid, InteractionAggregate> = HashMap::new();
        for interaction in interactions.iter().filter(|i| i.created_at >= since) {
            let aggregate = aggregates
                .entry(interaction.book_id)
                .or_insert_with(|| InteractionAggregate {
                    book_id: interaction.book_id,
                    ..Default::default()
                });
            match interaction.interaction_type {
                crate::models::InteractionType::View => aggregate.views += 1,
                crate::models::InteractionType::Download => aggregate.downloads += 1,
                crate::models::InteractionType::Rating => {
                    aggregate.ratings += 1;
                    aggregate.rating_sum += interaction.rating_value.unwrap_or(0.0) as f64;
                }
                crate::models::InteractionType::Bookmark => aggregate.bookmarks += 1,
                crate::models::InteractionType::Purchase => aggregate.purchases += 1,
            }
            if aggregate
                .last_interaction
                .map(|last| interaction.created_at > last)
                .unwrap_or(true)
            {
                aggregate.last_interaction = Some(interaction.created_at);
            }
        }
        Ok(aggregates.into_values().collect())
    }

    async fn attributed_since(&self, since: DateTime<Utc>) -> Result<Vec<AttributedInteraction>> {
        Ok(self
            .interactions
            .read()
            .unwrap()
            .iter()
            .filter(|i| i.created_at >= since)
            .filter_map(|i| {
                i.recommendation_id.map(|recommendation_id| AttributedInteraction {
                    recommendation_id,
                    interaction_type: i.interaction_type,
                })
            })
            .collect())
    }

    async fn feedback_since(&self, since: DateTime<Utc>) -> Result<Vec<RecommendationFeedback>> {
        Ok(self
            .feedback
            .read()
            .unwrap()
            .iter()
            .filter(|f| f.created_at >= since)
            .cloned()
            .collect())
    }

    async fn user_activity_since(&self, since: DateTime<Utc>) -> Result<Vec<(Uuid, i64)>> {
        let interactions = self.interactions.read().unwrap();
        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for interaction in interactions.iter().filter(|i| i.created_at >= since) {
            *counts.entry(interaction.user_id).or_insert(0) += 1;
        }
        let mut activity: Vec<(Uuid, i64)> = counts.into_iter().collect();
        activity.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        Ok(activity)
    }

    async fn count_purgeable(
        &self,
        routine_cutoff: DateTime<Utc>,
        important_cutoff: DateTime<Utc>,
    ) -> Result<(i64, i64)> {
        let interactions = self.interactions.read().unwrap();
        let routine = interactions
            .iter()
            .filter(|i| !i.interaction_type.is_important() && i.created_at < routine_cutoff)
            .count() as i64;
        let important = interactions
            .iter()
            .filter(|i| i.interaction_type.is_important() && i.created_at < important_cutoff)
            .count() as i64;
        Ok((routine, important))
    }

    async fn purge(
        &self,
        routine_cutoff: DateTime<Utc>,
        important_cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let mut interactions = self.interactions.write().unwrap();
        let before = interactions.len();
        interactions.retain(|i| {
            if i.interaction_type.is_important() {
                i.created_at >= important_cutoff
            } else {
                i.created_at >= routine_cutoff
            }
        });
        Ok((before - interactions.len()) as u64)
    }
}

#[derive(Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<Uuid, UserProfile>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self.profiles.read().unwrap().get(&user_id).cloned())
    }

    async fn upsert(&self, profile: &UserProfile) -> Result<()> {
        self.profiles
            .write()
            .unwrap()
            .insert(profile.user_id, profile.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryTrendingStore {
    rows: RwLock<Vec<TrendingBook>>,
}

impl InMemoryTrendingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrendingStore for InMemoryTrendingStore {
    async fn replace_snapshot(
        &self,
        period: TrendPeriod,
        trend_type: TrendType,
        rows: &[TrendingBook],
    ) -> Result<()> {
        let mut all = self.rows.write().unwrap();
        for row in all
            .iter_mut()
            .filter(|r| r.period == period && r.trend_type == trend_type && r.is_active)
        {
            row.is_active = false;
        }
        all.extend(rows.iter().cloned());
        Ok(())
    }

    async fn get_active(
        &self,
        period: TrendPeriod,
        trend_type: TrendType,
        limit: i64,
    ) -> Result<Vec<TrendingBook>> {
        let mut rows: Vec<TrendingBook> = self
            .rows
            .read()
            .unwrap()
            .iter()
            .filter(|r| r.period == period && r.trend_type == trend_type && r.is_active)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.rank);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn count_inactive_older_than(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .rows
            .read()
            .unwrap()
            .iter()
            .filter(|r| !r.is_active && r.computed_at < cutoff)
            .count() as i64)
    }

    async fn purge_inactive_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.write().unwrap();
        let before = rows.len();
        rows.retain(|r| r.is_active || r.computed_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}
