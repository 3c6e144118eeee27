//! Diesel ORM models for database tables.

use diesel::prelude::*;

use crate::schema;

/// Submission record from the database.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::submissions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SubmissionRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub event_name: Option<String>,
    pub status: String,
    pub file_size: Option<i64>,
    pub beo_count: Option<i32>,
    pub download_url: Option<String>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

/// New submission for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::submissions)]
pub struct NewSubmissionRecord<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub email: &'a str,
    pub event_name: Option<&'a str>,
    pub status: &'a str,
    pub file_size: Option<i64>,
    pub created_at: &'a str,
}

/// Partial update. `None` fields are skipped by diesel.
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = schema::submissions)]
pub struct SubmissionChangeset<'a> {
    pub status: Option<&'a str>,
    pub download_url: Option<&'a str>,
    pub error_message: Option<&'a str>,
    pub beo_count: Option<i32>,
    pub completed_at: Option<&'a str>,
}
