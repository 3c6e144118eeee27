//! Diesel-based submission repository for SQLite.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{RunQueryDsl, SimpleAsyncConnection};
use uuid::Uuid;

use super::diesel_models::{NewSubmissionRecord, SubmissionChangeset, SubmissionRecord};
use super::diesel_pool::{AsyncSqlitePool, DieselError};
use super::{parse_datetime, parse_datetime_opt, SubmissionStore};
use crate::models::{NewSubmission, Submission, SubmissionStatus, SubmissionUpdate};
use crate::schema::submissions;

/// Convert a database record to a domain model.
impl From<SubmissionRecord> for Submission {
    fn from(record: SubmissionRecord) -> Self {
        Submission {
            id: Uuid::parse_str(&record.id).unwrap_or_default(),
            name: record.name,
            email: record.email,
            event_name: record.event_name,
            status: SubmissionStatus::from_str(&record.status).unwrap_or(SubmissionStatus::Pending),
            file_size: record.file_size,
            beo_count: record.beo_count,
            download_url: record.download_url,
            error_message: record.error_message,
            created_at: parse_datetime(&record.created_at),
            completed_at: parse_datetime_opt(record.completed_at),
        }
    }
}

/// Diesel-based submission repository with compile-time query checking.
#[derive(Clone)]
pub struct DieselSubmissionRepository {
    pool: AsyncSqlitePool,
}

impl DieselSubmissionRepository {
    /// Create a new Diesel submission repository with an existing pool.
    pub fn new(pool: AsyncSqlitePool) -> Self {
        Self { pool }
    }

    /// Create the submissions table if it does not exist.
    pub async fn init_schema(&self) -> Result<(), DieselError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute(
            r#"CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL,
                event_name TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                file_size BIGINT,
                beo_count INTEGER,
                download_url TEXT,
                error_message TEXT,
                created_at TEXT NOT NULL,
                completed_at TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_submissions_status ON submissions(status);"#,
        )
        .await
    }

    /// Count submissions in a given status.
    pub async fn count_by_status(&self, status: SubmissionStatus) -> Result<u64, DieselError> {
        let mut conn = self.pool.get().await?;

        use diesel::dsl::count_star;
        let count: i64 = submissions::table
            .filter(submissions::status.eq(status.as_str()))
            .select(count_star())
            .first(&mut conn)
            .await?;

        Ok(count as u64)
    }
}

#[async_trait]
impl SubmissionStore for DieselSubmissionRepository {
    async fn create(&self, new: &NewSubmission) -> Result<Uuid, DieselError> {
        let mut conn = self.pool.get().await?;

        let id = Uuid::new_v4();
        let id_str = id.to_string();
        let created_at = Utc::now().to_rfc3339();

        diesel::insert_into(submissions::table)
            .values(NewSubmissionRecord {
                id: &id_str,
                name: &new.name,
                email: &new.email,
                event_name: new.event_name.as_deref(),
                status: SubmissionStatus::Pending.as_str(),
                file_size: Some(new.file_size),
                created_at: &created_at,
            })
            .execute(&mut conn)
            .await?;

        Ok(id)
    }

    async fn update_status(&self, id: Uuid, update: &SubmissionUpdate) -> Result<bool, DieselError> {
        let mut conn = self.pool.get().await?;

        let completed_at = update
            .status
            .is_terminal()
            .then(|| Utc::now().to_rfc3339());
        let changes = SubmissionChangeset {
            status: Some(update.status.as_str()),
            download_url: update.download_url.as_deref(),
            error_message: update.error_message.as_deref(),
            beo_count: update.beo_count,
            completed_at: completed_at.as_deref(),
        };

        let rows = diesel::update(submissions::table.find(id.to_string()))
            .set(&changes)
            .execute(&mut conn)
            .await?;

        Ok(rows > 0)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Submission>, DieselError> {
        let mut conn = self.pool.get().await?;

        submissions::table
            .find(id.to_string())
            .select(SubmissionRecord::as_select())
            .first::<SubmissionRecord>(&mut conn)
            .await
            .optional()
            .map(|opt| opt.map(Submission::from))
    }
}
