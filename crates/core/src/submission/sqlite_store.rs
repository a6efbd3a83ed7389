//! SQLite-backed submission store implementation.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, params_from_iter, Connection};

use super::{
    NewSubmission, StatusUpdate, StoreError, Submission, SubmissionStatus, SubmissionStore,
};

const COLUMNS: &str = "name, owner, owner_email, owner_name, status, error_occurred, local_path, \
                       remote_path, checksum_failures, display_online, data_explorer, published_at, \
                       created_at, updated_at";

/// SQLite-backed submission store.
pub struct SqliteSubmissionStore {
    conn: Mutex<Connection>,
}

impl SqliteSubmissionStore {
    /// Create a new SQLite store, creating the database file and tables if needed.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory SQLite store (useful for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS submissions (
                name TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                owner_email TEXT,
                owner_name TEXT,
                status TEXT NOT NULL,
                error_occurred INTEGER NOT NULL DEFAULT 0,
                local_path TEXT,
                remote_path TEXT,
                checksum_failures INTEGER NOT NULL DEFAULT 0,
                display_online INTEGER NOT NULL DEFAULT 0,
                data_explorer INTEGER NOT NULL DEFAULT 0,
                published_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_submissions_status ON submissions(status, created_at);
            "#,
        )
        .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Database("connection mutex poisoned".to_string()))
    }

    fn row_to_submission(row: &rusqlite::Row) -> rusqlite::Result<Submission> {
        let status_str: String = row.get(4)?;
        let status: SubmissionStatus = status_str.parse().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?;

        let published_at: Option<String> = row.get(11)?;
        let created_at_str: String = row.get(12)?;
        let updated_at_str: String = row.get(13)?;

        Ok(Submission {
            name: row.get(0)?,
            owner: row.get(1)?,
            owner_email: row.get(2)?,
            owner_name: row.get(3)?,
            status,
            error_occurred: row.get(5)?,
            local_path: row.get::<_, Option<String>>(6)?.map(PathBuf::from),
            remote_path: row.get(7)?,
            checksum_failures: row.get(8)?,
            display_online: row.get(9)?,
            data_explorer: row.get(10)?,
            published_at: published_at.as_deref().and_then(parse_timestamp),
            // Timestamps are always written by this store; fall back rather than fail the row.
            created_at: parse_timestamp(&created_at_str).unwrap_or_else(Utc::now),
            updated_at: parse_timestamp(&updated_at_str).unwrap_or_else(Utc::now),
        })
    }

    fn fetch(conn: &Connection, name: &str) -> Result<Submission, StoreError> {
        let result = conn.query_row(
            &format!("SELECT {} FROM submissions WHERE name = ?", COLUMNS),
            params![name],
            Self::row_to_submission,
        );

        match result {
            Ok(submission) => Ok(submission),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(StoreError::Database(e.to_string())),
        }
    }
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    // Fixed width keeps lexical order equal to chronological order.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl SubmissionStore for SqliteSubmissionStore {
    fn create(&self, request: NewSubmission) -> Result<Submission, StoreError> {
        let conn = self.lock()?;

        let now = Utc::now();
        let created_at = request.created_at.unwrap_or(now);
        let status = SubmissionStatus::Intake;

        let result = conn.execute(
            &format!(
                "INSERT INTO submissions ({}) VALUES (?, ?, ?, ?, ?, 0, ?, ?, 0, 0, 0, NULL, ?, ?)",
                COLUMNS
            ),
            params![
                request.name,
                request.owner,
                request.owner_email,
                request.owner_name,
                status.as_str(),
                request
                    .local_path
                    .as_ref()
                    .map(|p| p.to_string_lossy().into_owned()),
                request.remote_path,
                format_timestamp(&created_at),
                format_timestamp(&now),
            ],
        );

        match result {
            Ok(_) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::AlreadyExists(request.name));
            }
            Err(e) => return Err(StoreError::Database(e.to_string())),
        }

        Self::fetch(&conn, &request.name)
    }

    fn get(&self, name: &str) -> Result<Option<Submission>, StoreError> {
        let conn = self.lock()?;
        match Self::fetch(&conn, name) {
            Ok(submission) => Ok(Some(submission)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list_by_status(&self, status: SubmissionStatus) -> Result<Vec<Submission>, StoreError> {
        let conn = self.lock()?;

        let names = status.stored_names();
        let sql = format!(
            "SELECT {} FROM submissions WHERE status IN ({}) ORDER BY created_at ASC, name ASC",
            COLUMNS,
            placeholders(names.len())
        );

        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let rows = stmt
            .query_map(params_from_iter(names.iter()), Self::row_to_submission)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let mut submissions = Vec::new();
        for row_result in rows {
            let submission = row_result.map_err(|e| StoreError::Database(e.to_string()))?;
            submissions.push(submission);
        }

        Ok(submissions)
    }

    fn update_status(&self, name: &str, update: &StatusUpdate) -> Result<Submission, StoreError> {
        let conn = self.lock()?;

        let current = Self::fetch(&conn, name)?;
        if update.status <= current.status {
            return Err(StoreError::InvalidTransition {
                name: name.to_string(),
                from: current.status,
                to: update.status,
            });
        }

        let now = Utc::now();
        let expected = current.status.stored_names();
        let sql = format!(
            "UPDATE submissions SET status = ?, \
                 display_online = COALESCE(?, display_online), \
                 data_explorer = COALESCE(?, data_explorer), \
                 published_at = COALESCE(?, published_at), \
                 checksum_failures = 0, \
                 updated_at = ? \
             WHERE name = ? AND status IN ({})",
            placeholders(expected.len())
        );

        let mut values: Vec<Box<dyn rusqlite::ToSql>> = vec![
            Box::new(update.status.as_str()),
            Box::new(update.display_online),
            Box::new(update.data_explorer),
            Box::new(update.published_at.as_ref().map(format_timestamp)),
            Box::new(format_timestamp(&now)),
            Box::new(name.to_string()),
        ];
        for stored in expected {
            values.push(Box::new(stored));
        }
        let param_refs: Vec<&dyn rusqlite::ToSql> = values.iter().map(|p| p.as_ref()).collect();

        let changed = conn
            .execute(&sql, param_refs.as_slice())
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if changed == 0 {
            // Another writer moved the status between our read and write.
            let now_current = Self::fetch(&conn, name)?;
            return Err(StoreError::InvalidTransition {
                name: name.to_string(),
                from: now_current.status,
                to: update.status,
            });
        }

        Self::fetch(&conn, name)
    }

    fn record_checksum_failure(&self, name: &str) -> Result<Submission, StoreError> {
        let conn = self.lock()?;

        let changed = conn
            .execute(
                "UPDATE submissions SET checksum_failures = checksum_failures + 1, updated_at = ? WHERE name = ?",
                params![format_timestamp(&Utc::now()), name],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }

        Self::fetch(&conn, name)
    }

    fn flag_error(&self, name: &str) -> Result<Submission, StoreError> {
        let conn = self.lock()?;

        let changed = conn
            .execute(
                "UPDATE submissions SET error_occurred = 1, updated_at = ? WHERE name = ?",
                params![format_timestamp(&Utc::now()), name],
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        if changed == 0 {
            return Err(StoreError::NotFound(name.to_string()));
        }

        Self::fetch(&conn, name)
    }
}
