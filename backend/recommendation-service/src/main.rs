use actix_web::{web, App, HttpServer};
use std::io;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use recommendation_service::handlers::{
    get_profile, get_recommendations, get_trending, record_feedback, record_interaction,
    update_profile, InteractionHandlerState, ProfileHandlerState, RecommendationHandlerState,
    TrendingHandlerState,
};
use recommendation_service::{Config, ServiceContext};

#[actix_web::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,actix_web=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().expect("Failed to load configuration");

    tracing::info!(
        "Starting {} v{}",
        config.app.service_name,
        env!("CARGO_PKG_VERSION")
    );
    tracing::info!("Environment: {}", config.app.env);

    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await
        .expect("Failed to create database pool");

    let port = config.app.port;
    let context = ServiceContext::build(config, db_pool)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let recommendation_state = web::Data::new(RecommendationHandlerState {
        orchestrator: context.orchestrator.clone(),
    });
    let trending_state = web::Data::new(TrendingHandlerState {
        store: context.trending_store.clone(),
        books: context.books.clone(),
    });
    let interaction_state = web::Data::new(InteractionHandlerState {
        tracker: context.tracker.clone(),
    });
    let profile_state = web::Data::new(ProfileHandlerState {
        profiles: context.profiles.clone(),
        bus: context.bus.clone(),
        service_name: context.config.app.service_name.clone(),
    });

    HttpServer::new(move || {
        App::new()
            .app_data(recommendation_state.clone())
            .app_data(trending_state.clone())
            .app_data(interaction_state.clone())
            .app_data(profile_state.clone())
            .route("/health", web::get().to(|| async { "OK" }))
            .service(get_recommendations)
            .service(get_trending)
            .service(get_profile)
            .service(update_profile)
            .service(record_interaction)
            .service(record_feedback)
    })
    .bind(format!("0.0.0.0:{}", port))?
    .run()
    .await
}
