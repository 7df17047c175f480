//! Feedback and interaction tracking.
//!
//! Recording closes the loop between served recommendations and observed
//! behavior. Failures here are logged and swallowed: viewing a book must
//! succeed even when tracking does not.

use chrono::Utc;
use event_bus::{EventBus, EventType};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::db::InteractionStore;
use crate::error::{AppError, Result};
use crate::models::{InteractionType, RecommendationFeedback, UserInteraction};
use crate::services::cache::RecommendationCache;

pub struct InteractionTracker {
    interactions: Arc<dyn InteractionStore>,
    cache: Option<RecommendationCache>,
    bus: Arc<EventBus>,
    service_name: String,
}

impl InteractionTracker {
    pub fn new(
        interactions: Arc<dyn InteractionStore>,
        cache: Option<RecommendationCache>,
        bus: Arc<EventBus>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            interactions,
            cache,
            bus,
            service_name: service_name.into(),
        }
    }

    /// Record a user interaction. Never fails the triggering action: all
    /// errors are logged and the interaction is dropped.
    pub async fn record_interaction(
        &self,
        user_id: Uuid,
        book_id: Uuid,
        interaction_type: InteractionType,
        recommendation_id: Option<Uuid>,
        rating_value: Option<f32>,
        metadata: serde_json::Value,
    ) -> Option<Uuid> {
        let interaction = UserInteraction {
            id: Uuid::new_v4(),
            user_id,
            book_id,
            interaction_type,
            recommendation_id,
            rating_value,
            metadata,
            created_at: Utc::now(),
        };

        if let Err(err) = self.interactions.record(&interaction).await {
            warn!(
                user_id = %user_id,
                book_id = %book_id,
                interaction_type = %interaction_type,
                error = %err,
                "Failed to record interaction"
            );
            return None;
        }

        if interaction_type == InteractionType::View {
            if let Some(cache) = &self.cache {
                if let Err(err) = cache.bump_view_counter(book_id).await {
                    warn!(book_id = %book_id, error = %err, "View counter bump failed");
                }
            }
        }

        self.bus.publish_event(
            EventType::InteractionRecorded,
            serde_json::json!({
                "book_id": book_id,
                "interaction_type": interaction_type.as_str(),
                "recommendation_id": recommendation_id,
            }),
            Some(user_id),
            &self.service_name,
        );

        Some(interaction.id)
    }

    /// Record explicit 1-5 feedback on a served recommendation.
    ///
    /// Range validation surfaces to the caller; storage failures are
    /// logged and swallowed like interaction recording.
    pub async fn record_feedback(
        &self,
        user_id: Uuid,
        recommendation_id: Uuid,
        rating: i16,
    ) -> Result<()> {
        if !(1..=5).contains(&rating) {
            return Err(AppError::Validation(format!(
                "Feedback rating must be between 1 and 5, got {}",
                rating
            )));
        }

        let feedback = RecommendationFeedback {
            id: Uuid::new_v4(),
            user_id,
            recommendation_id,
            rating,
            created_at: Utc::now(),
        };

        if let Err(err) = self.interactions.record_feedback(&feedback).await {
            warn!(
                user_id = %user_id,
                recommendation_id = %recommendation_id,
                error = %err,
                "Failed to record feedback"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::InMemoryInteractionStore;

    fn tracker(store: Arc<InMemoryInteractionStore>) -> InteractionTracker {
        InteractionTracker::new(store, None, Arc::new(EventBus::new()), "recommendation-service")
    }

    #[tokio::test]
    async fn test_record_interaction_persists_and_publishes() {
        let store = Arc::new(InMemoryInteractionStore::new());
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        {
            let seen = seen.clone();
            bus.subscribe(
                EventType::InteractionRecorded,
                "test",
                Arc::new(move |_| {
                    seen.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    Ok(())
                }),
            );
        }
        let tracker =
            InteractionTracker::new(store.clone(), None, bus, "recommendation-service");

        let id = tracker
            .record_interaction(
                Uuid::new_v4(),
                Uuid::new_v4(),
                InteractionType::View,
                None,
                None,
                serde_json::Value::Null,
            )
            .await;

        assert!(id.is_some());
        assert_eq!(store.interaction_count(), 1);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_feedback_rating_validation() {
        let store = Arc::new(InMemoryInteractionStore::new());
        let tracker = tracker(store);

        assert!(tracker
            .record_feedback(Uuid::new_v4(), Uuid::new_v4(), 0)
            .await
            .is_err());
        assert!(tracker
            .record_feedback(Uuid::new_v4(), Uuid::new_v4(), 6)
            .await
            .is_err());
        assert!(tracker
            .record_feedback(Uuid::new_v4(), Uuid::new_v4(), 4)
            .await
            .is_ok());
    }
}
