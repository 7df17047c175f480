//! Read-only data provider interfaces
//!
//! The recommendation core never queries the catalog or reading schemas
//! directly; it consumes these traits instead. The Postgres implementations
//! here are the only place that knows those schemas, and they are strictly
//! read-only. In-memory implementations back unit and integration tests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

mod book;
mod memory;
mod reading;

pub use book::{BookDataProvider, PgBookProvider};
pub use memory::{InMemoryBookProvider, InMemoryReadingProvider};
pub use reading::{PgReadingProvider, ReadingDataProvider};

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

impl From<sqlx::Error> for ProviderError {
    fn from(err: sqlx::Error) -> Self {
        ProviderError::Database(err.to_string())
    }
}

/// Catalog view of a book, as exposed to consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookSummary {
    pub id: Uuid,
    pub title: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
    pub language: Option<String>,
    pub average_rating: f32,
    pub ratings_count: i64,
    pub view_count: i64,
    pub download_count: i64,
    pub published_at: Option<DateTime<Utc>>,
    pub cover_image: Option<String>,
}

/// Optional constraints for catalog search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    pub categories: Vec<String>,
    pub language: Option<String>,
    pub min_rating: Option<f32>,
}

/// Reading lifecycle state for one (user, book) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    InProgress,
    Completed,
    Abandoned,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReadingStatus {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "abandoned" => Ok(Self::Abandoned),
            other => Err(ProviderError::Database(format!(
                "Unknown reading status: {}",
                other
            ))),
        }
    }
}

/// One entry of a user's reading history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub status: ReadingStatus,
    pub progress_percent: f32,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub last_read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bookmark {
    pub user_id: Uuid,
    pub book_id: Uuid,
    pub position: i32,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_status_roundtrip() {
        for status in [
            ReadingStatus::InProgress,
            ReadingStatus::Completed,
            ReadingStatus::Abandoned,
        ] {
            let parsed: ReadingStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("finished".parse::<ReadingStatus>().is_err());
    }
}
