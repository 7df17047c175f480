use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::str::FromStr;
use uuid::Uuid;

use super::ProfileStore;
use crate::error::Result;
use crate::models::{RecommendationFrequency, UserProfile};

type ProfileRow = (
    Uuid,
    Vec<String>,
    Vec<String>,
    Vec<String>,
    Option<String>,
    bool,
    String,
    DateTime<Utc>,
);

pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        let row = sqlx::query_as::<_, ProfileRow>(
            r#"
            SELECT user_id, preferred_genres, preferred_authors, preferred_languages,
                   reading_level, enable_recommendations, recommendation_frequency, updated_at
            FROM user_profiles
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(
            |(
                user_id,
                preferred_genres,
                preferred_authors,
                preferred_languages,
                reading_level,
                enable_recommendations,
                frequency,
                updated_at,
            )| {
                Ok(UserProfile {
                    user_id,
                    preferred_genres,
                    preferred_authors,
                    preferred_languages,
                    reading_level,
                    enable_recommendations,
                    recommendation_frequency: RecommendationFrequency::from_str(&frequency)?,
                    updated_at,
                })
            },
        )
        .transpose()
    }

    async fn upsert(&self, profile: &UserProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_profiles
                (user_id, preferred_genres, preferred_authors, preferred_languages,
                 reading_level, enable_recommendations, recommendation_frequency, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id) DO UPDATE SET
                preferred_genres = EXCLUDED.preferred_genres,
                preferred_authors = EXCLUDED.preferred_authors,
                preferred_languages = EXCLUDED.preferred_languages,
                reading_level = EXCLUDED.reading_level,
                enable_recommendations = EXCLUDED.enable_recommendations,
                recommendation_frequency = EXCLUDED.recommendation_frequency,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(profile.user_id)
        .bind(&profile.preferred_genres)
        .bind(&profile.preferred_authors)
        .bind(&profile.preferred_languages)
        .bind(profile.reading_level.as_deref())
        .bind(profile.enable_recommendations)
        .bind(profile.recommendation_frequency.as_str())
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
