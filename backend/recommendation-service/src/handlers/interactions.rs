/// Interaction and feedback tracking handlers
///
/// Write paths for the feedback loop. Tracking failures never fail the
/// caller; both endpoints return 202 once the request is accepted.
use actix_web::{post, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::user_id_from;
use crate::error::Result;
use crate::models::InteractionType;
use crate::services::InteractionTracker;

pub struct InteractionHandlerState {
    pub tracker: Arc<InteractionTracker>,
}

#[derive(Debug, Deserialize)]
pub struct InteractionRequest {
    pub book_id: Uuid,
    pub interaction_type: String,
    pub recommendation_id: Option<Uuid>,
    pub rating_value: Option<f32>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct InteractionResponse {
    pub recorded: bool,
    pub interaction_id: Option<Uuid>,
}

/// POST /api/v1/interactions
#[post("/api/v1/interactions")]
pub async fn record_interaction(
    req: HttpRequest,
    body: web::Json<InteractionRequest>,
    state: web::Data<InteractionHandlerState>,
) -> Result<HttpResponse> {
    let user_id = user_id_from(&req)?;
    let interaction_type = InteractionType::from_str(&body.interaction_type)?;

    let interaction_id = state
        .tracker
        .record_interaction(
            user_id,
            body.book_id,
            interaction_type,
            body.recommendation_id,
            body.rating_value,
            body.metadata.clone(),
        )
        .await;

    Ok(HttpResponse::Accepted().json(InteractionResponse {
        recorded: interaction_id.is_some(),
        interaction_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackRequest {
    pub recommendation_id: Uuid,
    pub rating: i16,
}

#[derive(Debug, Serialize)]
pub struct FeedbackResponse {
    pub accepted: bool,
}

/// POST /api/v1/recommendations/feedback
#[post("/api/v1/recommendations/feedback")]
pub async fn record_feedback(
    req: HttpRequest,
    body: web::Json<FeedbackRequest>,
    state: web::Data<InteractionHandlerState>,
) -> Result<HttpResponse> {
    let user_id = user_id_from(&req)?;
    state
        .tracker
        .record_feedback(user_id, body.recommendation_id, body.rating)
        .await?;
    Ok(HttpResponse::Accepted().json(FeedbackResponse { accepted: true }))
}
