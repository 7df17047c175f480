/// Recommendation API handlers
///
/// HTTP surface for personalized recommendations and trending snapshots.
use actix_web::{get, web, HttpRequest, HttpResponse};
use data_providers::BookDataProvider;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::user_id_from;
use crate::db::TrendingStore;
use crate::error::Result;
use crate::models::{Algorithm, RecommendationContext, ScoredBook, TrendPeriod, TrendType};
use crate::services::RecommendationOrchestrator;

const MAX_LIMIT: usize = 100;

fn default_limit() -> usize {
    20
}

#[derive(Debug, Deserialize)]
pub struct RecommendationQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
    pub algorithm: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecommendedBook {
    pub id: Uuid,
    pub title: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub average_rating: f32,
    pub cover_image: Option<String>,
    pub score: f32,
    pub reasons: Vec<String>,
}

impl From<ScoredBook> for RecommendedBook {
    fn from(scored: ScoredBook) -> Self {
        Self {
            id: scored.book.id,
            title: scored.book.title,
            authors: scored.book.authors,
            categories: scored.book.categories,
            average_rating: scored.book.average_rating,
            cover_image: scored.book.cover_image,
            score: scored.score,
            reasons: scored.reasons,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendationResponse {
    pub books: Vec<RecommendedBook>,
    pub count: usize,
    pub algorithm_used: String,
    pub confidence_score: f32,
}

pub struct RecommendationHandlerState {
    pub orchestrator: Arc<RecommendationOrchestrator>,
}

/// GET /api/v1/recommendations
///
/// A valid caller always receives a list (possibly smaller than requested,
/// possibly popularity fallback), never an error page.
#[get("/api/v1/recommendations")]
pub async fn get_recommendations(
    req: HttpRequest,
    query: web::Query<RecommendationQuery>,
    state: web::Data<RecommendationHandlerState>,
) -> Result<HttpResponse> {
    let user_id = user_id_from(&req)?;
    let limit = query.limit.clamp(1, MAX_LIMIT);
    let algorithm = match &query.algorithm {
        Some(raw) => Algorithm::from_str(raw)?,
        None => Algorithm::Hybrid,
    };
    let context = match &query.context {
        Some(raw) => RecommendationContext::from_str(raw)?,
        None => RecommendationContext::General,
    };

    debug!(user_id = %user_id, limit = limit, algorithm = %algorithm, "Recommendation request");

    let outcome = state
        .orchestrator
        .generate_personalized_recommendations(user_id, algorithm, limit, context)
        .await?;

    let books: Vec<RecommendedBook> = outcome.books.into_iter().map(Into::into).collect();
    Ok(HttpResponse::Ok().json(RecommendationResponse {
        count: books.len(),
        books,
        algorithm_used: outcome.algorithm_used.as_str().to_string(),
        confidence_score: outcome.confidence_score,
    }))
}

#[derive(Debug, Deserialize)]
pub struct TrendingQuery {
    pub period: Option<String>,
    pub trend_type: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct TrendingEntry {
    pub rank: i32,
    pub book_id: Uuid,
    pub title: Option<String>,
    pub cover_image: Option<String>,
    pub score: f64,
    pub interaction_count: i64,
    pub avg_rating: f32,
}

#[derive(Debug, Serialize)]
pub struct TrendingResponse {
    pub period: String,
    pub trend_type: String,
    pub books: Vec<TrendingEntry>,
}

pub struct TrendingHandlerState {
    pub store: Arc<dyn TrendingStore>,
    pub books: Arc<dyn BookDataProvider>,
}

/// GET /api/v1/recommendations/trending
#[get("/api/v1/recommendations/trending")]
pub async fn get_trending(
    query: web::Query<TrendingQuery>,
    state: web::Data<TrendingHandlerState>,
) -> Result<HttpResponse> {
    let period = match &query.period {
        Some(raw) => TrendPeriod::from_str(raw)?,
        None => TrendPeriod::Weekly,
    };
    let trend_type = match &query.trend_type {
        Some(raw) => TrendType::from_str(raw)?,
        None => TrendType::Rising,
    };
    let limit = query.limit.clamp(1, MAX_LIMIT) as i64;

    let rows = state.store.get_active(period, trend_type, limit).await?;
    let book_ids: Vec<Uuid> = rows.iter().map(|r| r.book_id).collect();
    let summaries: HashMap<Uuid, _> = state
        .books
        .get_books_by_ids(&book_ids)
        .await
        .unwrap_or_default()
        .into_iter()
        .map(|b| (b.id, b))
        .collect();

    let books: Vec<TrendingEntry> = rows
        .into_iter()
        .map(|row| {
            let summary = summaries.get(&row.book_id);
            TrendingEntry {
                rank: row.rank,
                book_id: row.book_id,
                title: summary.map(|b| b.title.clone()),
                cover_image: summary.and_then(|b| b.cover_image.clone()),
                score: row.score,
                interaction_count: row.interaction_count,
                avg_rating: row.avg_rating,
            }
        })
        .collect();

    Ok(HttpResponse::Ok().json(TrendingResponse {
        period: period.as_str().to_string(),
        trend_type: trend_type.as_str().to_string(),
        books,
    }))
}
