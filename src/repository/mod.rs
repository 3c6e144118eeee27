//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM with compile-time query checking
//! against SQLite through diesel-async's SyncConnectionWrapper.

pub mod diesel_models;
pub mod diesel_pool;
pub mod diesel_submission;
pub mod util;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{NewSubmission, Submission, SubmissionUpdate};

pub use diesel_models::{NewSubmissionRecord, SubmissionChangeset, SubmissionRecord};
pub use diesel_pool::{AsyncSqlitePool, DieselError};
pub use diesel_submission::DieselSubmissionRepository;

/// Persistence for upload submissions.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Insert a pending submission and return its id.
    async fn create(&self, new: &NewSubmission) -> Result<Uuid, DieselError>;

    /// Apply a status change. Returns false when the id is unknown.
    async fn update_status(&self, id: Uuid, update: &SubmissionUpdate) -> Result<bool, DieselError>;

    async fn get(&self, id: Uuid) -> Result<Option<Submission>, DieselError>;
}

/// Open the submission repository at `database_url`, creating its schema.
pub async fn open_submissions(database_url: &str) -> Result<DieselSubmissionRepository, DieselError> {
    if util::sqlite_path(database_url).is_none() {
        return Err(util::store_error(format!(
            "Unsupported database URL (SQLite only): {}",
            database_url
        )));
    }
    let repo = DieselSubmissionRepository::new(AsyncSqlitePool::new(database_url));
    repo.init_schema().await?;
    Ok(repo)
}

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
    })
}
