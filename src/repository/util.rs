//! Helpers shared by the submission repository.

use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

/// Failure raised outside SQLite itself (connecting, unsupported URL).
#[derive(Debug)]
struct StoreFailure(String);

impl DatabaseErrorInformation for StoreFailure {
    fn message(&self) -> &str {
        &self.0
    }
    fn details(&self) -> Option<&str> {
        None
    }
    fn hint(&self) -> Option<&str> {
        None
    }
    fn table_name(&self) -> Option<&str> {
        None
    }
    fn column_name(&self) -> Option<&str> {
        None
    }
    fn constraint_name(&self) -> Option<&str> {
        None
    }
    fn statement_position(&self) -> Option<i32> {
        None
    }
}

/// Wrap a non-diesel failure so the repository keeps one error type.
pub fn store_error(e: impl std::fmt::Display) -> DieselError {
    DieselError::DatabaseError(DatabaseErrorKind::Unknown, Box::new(StoreFailure(e.to_string())))
}

/// Filesystem path of a SQLite URL (`sqlite://x`, `sqlite:x` or a bare path).
/// Other schemes yield `None`.
pub fn sqlite_path(url: &str) -> Option<&str> {
    if let Some(rest) = url.strip_prefix("sqlite://") {
        return Some(rest);
    }
    if let Some(rest) = url.strip_prefix("sqlite:") {
        return Some(rest);
    }
    (!url.contains("://")).then_some(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_keeps_message() {
        let err = store_error("disk full");
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_sqlite_path() {
        assert_eq!(sqlite_path("sqlite:/tmp/beo.db"), Some("/tmp/beo.db"));
        assert_eq!(sqlite_path("sqlite:///tmp/beo.db"), Some("/tmp/beo.db"));
        assert_eq!(sqlite_path("/tmp/beo.db"), Some("/tmp/beo.db"));
        assert_eq!(sqlite_path("postgres://localhost/beo"), None);
    }
}
