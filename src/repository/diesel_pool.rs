//! Diesel async connection management for SQLite.
//!
//! Uses diesel-async's SyncConnectionWrapper to provide an async interface
//! for SQLite. Since SQLite connections are lightweight, we create new
//! connections per request rather than pooling.

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::AsyncConnection;
use std::path::Path;

/// Diesel error type alias.
pub type DieselError = diesel::result::Error;

/// Async SQLite connection using SyncConnectionWrapper.
pub type AsyncSqliteConnection = SyncConnectionWrapper<SqliteConnection>;

/// Opens a fresh SQLite connection to the submissions database on demand.
#[derive(Clone)]
pub struct AsyncSqlitePool {
    path: String,
}

impl AsyncSqlitePool {
    /// `database_url` may be `sqlite:` prefixed or a bare path.
    pub fn new(database_url: &str) -> Self {
        let path = super::util::sqlite_path(database_url).unwrap_or(database_url);
        Self {
            path: path.to_string(),
        }
    }

    /// Create pool from a file path.
    pub fn from_path(db_path: &Path) -> Self {
        Self::new(&db_path.display().to_string())
    }

    /// Get a new connection.
    pub async fn get(&self) -> Result<AsyncSqliteConnection, DieselError> {
        AsyncSqliteConnection::establish(&self.path)
            .await
            .map_err(super::util::store_error)
    }
}
