use actix_web::HttpRequest;
use uuid::Uuid;

use crate::error::AppError;

pub mod interactions;
pub mod profiles;
pub mod recommendations;

pub use interactions::{record_feedback, record_interaction, InteractionHandlerState};
pub use profiles::{get_profile, update_profile, ProfileHandlerState};
pub use recommendations::{
    get_recommendations, get_trending, RecommendationHandlerState, TrendingHandlerState,
};

/// Caller identity, set by the upstream gateway after authentication.
pub(crate) fn user_id_from(req: &HttpRequest) -> Result<Uuid, AppError> {
    let raw = req
        .headers()
        .get("X-User-Id")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing X-User-Id header".to_string()))?;
    Uuid::parse_str(raw)
        .map_err(|_| AppError::BadRequest(format!("Invalid X-User-Id header: {}", raw)))
}
