//! SQLite-backed store for processed feedback and generated insights.
//!
//! The database is the working store shared with the (external) ingestion and
//! NLP pipeline: that side writes `feedback` rows, this crate reads them in
//! windows and writes `insights`. WAL mode keeps concurrent reads cheap while
//! a scan is writing.

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use thiserror::Error;

pub mod feedback;
pub mod insights;

pub use insights::{InsightFilter, UpsertOutcome};

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Malformed JSON column: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed timestamp '{0}'")]
    Timestamp(String),

    #[error("Insight not found: {0}")]
    InsightNotFound(String),
}

pub struct FeedbackDb {
    conn: Connection,
}

impl FeedbackDb {
    /// Open (or create) the database at `path` and apply pending migrations.
    pub fn open_at<P: Into<PathBuf>>(path: P) -> Result<Self, DbError> {
        let path: PathBuf = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL for concurrent read performance during scans
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        Ok(Self { conn })
    }

    /// Open a database at an explicit path in read-only mode. Used by
    /// dashboard readers while a scan owns writes.
    pub fn open_readonly_at(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    ///
    /// `BEGIN IMMEDIATE` takes the write lock up front, so a read-check-write
    /// sequence inside the closure is atomic with respect to other writers.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }
}

/// Render a timestamp in the uniform column format (RFC 3339 UTC, millisecond
/// precision, `Z` suffix). Uniform rendering keeps string comparison in SQL
/// equivalent to chronological comparison.
pub(crate) fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp column back into `DateTime<Utc>`.
pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|_| DbError::Timestamp(s.to_string()))
}

#[cfg(test)]
pub mod test_utils {
    use super::FeedbackDb;

    /// Create a temporary database for testing.
    ///
    /// We leak the `TempDir` so the directory persists for the duration of
    /// the test; the OS cleans up test temp dirs. FK enforcement is disabled
    /// so unit tests can insert rows without satisfying every constraint.
    pub fn test_db() -> FeedbackDb {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = dir.path().join("test.db");
        std::mem::forget(dir);
        let db = FeedbackDb::open_at(path).expect("Failed to open test database");
        db.conn_ref()
            .execute_batch("PRAGMA foreign_keys = OFF;")
            .expect("disable FK for tests");
        db
    }
}

#[cfg(test)]
mod tests {
    use super::test_utils::test_db;
    use super::*;

    #[test]
    fn open_applies_schema() {
        let db = test_db();
        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM insights", [], |row| row.get(0))
            .expect("insights table queryable");
        assert_eq!(count, 0);
    }

    #[test]
    fn transaction_rolls_back_on_error() {
        let db = test_db();
        let result: Result<(), DbError> = db.with_transaction(|db| {
            db.conn_ref().execute(
                "INSERT INTO tenants (id, name, created_at) VALUES ('t1', 'Acme', '2026-01-01T00:00:00.000Z')",
                [],
            )?;
            Err(DbError::Migration("forced".into()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM tenants", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0, "insert should have rolled back");
    }

    #[test]
    fn readonly_handle_reads_but_rejects_writes() {
        use crate::db::InsightFilter;
        use crate::types::{InsightDraft, InsightType, Severity};

        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("pulse.db");

        let draft = InsightDraft {
            kind: InsightType::RecurringComplaint,
            severity: Severity::Medium,
            title: "Recurring Complaint: Delivery".to_string(),
            description: "6 customers mentioned issues with 'delivery'".to_string(),
            recommendation: "Review logistics processes.".to_string(),
            metrics: serde_json::json!({"occurrences": 6}),
            related_topics: vec!["delivery".to_string()],
            product_name: None,
            sample_feedbacks: Vec::new(),
        };

        {
            let writer = FeedbackDb::open_at(&path).expect("open writer");
            writer.upsert_tenant("t1", "Acme").unwrap();
            writer.upsert_insight(Some("t1"), &draft).unwrap();
        } // close so the WAL is checkpointed before the read-only open

        let reader = FeedbackDb::open_readonly_at(&path).expect("open read-only");
        assert!(reader.tenant_exists("t1").unwrap());
        let insights = reader.list_insights(&InsightFilter::default()).unwrap();
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].title, "Recurring Complaint: Delivery");

        assert!(
            reader.upsert_insight(Some("t1"), &draft).is_err(),
            "read-only handle must reject writes"
        );
    }

    #[test]
    fn timestamp_round_trip() {
        let now = Utc::now();
        let parsed = parse_ts(&ts(now)).expect("parse");
        assert_eq!(parsed.timestamp_millis(), now.timestamp_millis());
    }

    #[test]
    fn timestamp_rejects_garbage() {
        assert!(parse_ts("last tuesday").is_err());
    }
}
