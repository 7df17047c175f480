/// Recommendation preference handlers
///
/// The explicit settings-update path for the per-user preference snapshot
/// every generator reads.
use actix_web::{get, put, web, HttpRequest, HttpResponse};
use chrono::Utc;
use event_bus::{EventBus, EventType};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use super::user_id_from;
use crate::db::ProfileStore;
use crate::error::Result;
use crate::models::{RecommendationFrequency, UserProfile};

pub struct ProfileHandlerState {
    pub profiles: Arc<dyn ProfileStore>,
    pub bus: Arc<EventBus>,
    pub service_name: String,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdateRequest {
    #[serde(default)]
    pub preferred_genres: Vec<String>,
    #[serde(default)]
    pub preferred_authors: Vec<String>,
    #[serde(default)]
    pub preferred_languages: Vec<String>,
    pub reading_level: Option<String>,
    pub enable_recommendations: Option<bool>,
    pub recommendation_frequency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub preferred_genres: Vec<String>,
    pub preferred_authors: Vec<String>,
    pub preferred_languages: Vec<String>,
    pub reading_level: Option<String>,
    pub enable_recommendations: bool,
    pub recommendation_frequency: String,
}

impl From<UserProfile> for ProfileResponse {
    fn from(profile: UserProfile) -> Self {
        Self {
            user_id: profile.user_id,
            preferred_genres: profile.preferred_genres,
            preferred_authors: profile.preferred_authors,
            preferred_languages: profile.preferred_languages,
            reading_level: profile.reading_level,
            enable_recommendations: profile.enable_recommendations,
            recommendation_frequency: profile.recommendation_frequency.as_str().to_string(),
        }
    }
}

/// GET /api/v1/recommendations/profile
#[get("/api/v1/recommendations/profile")]
pub async fn get_profile(
    req: HttpRequest,
    state: web::Data<ProfileHandlerState>,
) -> Result<HttpResponse> {
    let user_id = user_id_from(&req)?;
    let profile = state
        .profiles
        .get(user_id)
        .await?
        .unwrap_or_else(|| UserProfile::default_for(user_id));
    Ok(HttpResponse::Ok().json(ProfileResponse::from(profile)))
}

/// PUT /api/v1/recommendations/profile
#[put("/api/v1/recommendations/profile")]
pub async fn update_profile(
    req: HttpRequest,
    body: web::Json<ProfileUpdateRequest>,
    state: web::Data<ProfileHandlerState>,
) -> Result<HttpResponse> {
    let user_id = user_id_from(&req)?;

    let existing = state
        .profiles
        .get(user_id)
        .await?
        .unwrap_or_else(|| UserProfile::default_for(user_id));

    let profile = UserProfile {
        user_id,
        preferred_genres: body.preferred_genres.clone(),
        preferred_authors: body.preferred_authors.clone(),
        preferred_languages: body.preferred_languages.clone(),
        reading_level: body.reading_level.clone(),
        enable_recommendations: body
            .enable_recommendations
            .unwrap_or(existing.enable_recommendations),
        recommendation_frequency: match &body.recommendation_frequency {
            Some(raw) => RecommendationFrequency::from_str(raw)?,
            None => existing.recommendation_frequency,
        },
        updated_at: Utc::now(),
    };

    state.profiles.upsert(&profile).await?;

    state.bus.publish_event(
        EventType::ProfileUpdated,
        serde_json::json!({ "preferred_genres": profile.preferred_genres }),
        Some(user_id),
        &state.service_name,
    );

    Ok(HttpResponse::Ok().json(ProfileResponse::from(profile)))
}
