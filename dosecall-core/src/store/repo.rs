//! Session repository
//!
//! Storage adapter for call sessions. The interesting contract here is
//! [`Database::apply_update`]: the read-merge-write of one canonical update
//! happens under a single connection lock, so two concurrent reconciliations
//! for the same call id can never interleave.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};
use crate::reconcile::{reconcile, Reconciled};
use crate::types::{CallSession, CallStatus, CanonicalUpdate, Direction};

/// Filter for listing call sessions.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Exact phone number match
    pub phone_number: Option<String>,
    /// Exact status match
    pub status: Option<CallStatus>,
    /// Only sessions created at or after this instant
    pub since: Option<DateTime<Utc>>,
    /// Only sessions created at or before this instant
    pub until: Option<DateTime<Utc>>,
}

/// Pagination window for listing call sessions.
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// Database handle (single connection, serialized writers)
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL mode for better concurrency between readers and the writer
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            ",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Run migrations on this database
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock();
        super::schema::run_migrations(&conn)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // A poisoned mutex means a writer panicked mid-operation; the
        // connection itself is still transactionally consistent.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ============================================
    // Create / read / update
    // ============================================

    /// Insert a new session. Fails with [`Error::DuplicateSession`] if the
    /// call id already exists; callers treat that as "fall through to update".
    pub fn create_session(&self, session: &CallSession) -> Result<CallSession> {
        let conn = self.lock();
        Self::insert_session(&conn, session)?;
        Ok(session.clone())
    }

    /// Point lookup by call id.
    pub fn get_session(&self, call_id: &str) -> Result<Option<CallSession>> {
        let conn = self.lock();
        Self::select_session(&conn, call_id)
    }

    /// Write a fully merged session. Fails with [`Error::SessionNotFound`]
    /// when the call id does not exist; the merge itself is the caller's
    /// responsibility (see [`Database::apply_update`] for the locked variant).
    pub fn update_session(&self, session: &CallSession) -> Result<CallSession> {
        let conn = self.lock();
        Self::write_session(&conn, session)?;
        Ok(session.clone())
    }

    /// Reconcile one canonical update against the stored session and persist
    /// the result, all under one connection lock.
    ///
    /// Creates the session when the call id is unseen (late or out-of-order
    /// first event), so callers never need to handle not-found here.
    pub fn apply_update(&self, update: &CanonicalUpdate) -> Result<Reconciled> {
        let conn = self.lock();

        let existing = Self::select_session(&conn, &update.call_id)?;
        let result = reconcile(existing.as_ref(), update, Utc::now());

        if result.created {
            Self::insert_session(&conn, &result.session)?;
        } else if result.changed {
            Self::write_session(&conn, &result.session)?;
        }

        Ok(result)
    }

    // ============================================
    // Listing
    // ============================================

    /// List sessions matching the filter, newest first, with the total count
    /// across the whole filter (not just this page).
    pub fn list_sessions(
        &self,
        filter: &SessionFilter,
        page: Page,
    ) -> Result<(Vec<CallSession>, i64)> {
        let conn = self.lock();

        let mut where_clause = String::from(" WHERE 1=1");
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![];

        if let Some(phone) = &filter.phone_number {
            where_clause.push_str(" AND phone_number = ?");
            params.push(Box::new(phone.clone()));
        }

        if let Some(status) = &filter.status {
            where_clause.push_str(" AND status = ?");
            params.push(Box::new(status.as_str().to_string()));
        }

        if let Some(since) = &filter.since {
            where_clause.push_str(" AND created_at >= ?");
            params.push(Box::new(since.to_rfc3339()));
        }

        if let Some(until) = &filter.until {
            where_clause.push_str(" AND created_at <= ?");
            params.push(Box::new(until.to_rfc3339()));
        }

        let params_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        let count_sql = format!("SELECT COUNT(*) FROM call_sessions{}", where_clause);
        let total: i64 = conn.query_row(&count_sql, params_refs.as_slice(), |row| row.get(0))?;

        let list_sql = format!(
            "SELECT * FROM call_sessions{} ORDER BY created_at DESC, call_id DESC LIMIT {} OFFSET {}",
            where_clause, page.limit, page.offset
        );

        let mut stmt = conn.prepare(&list_sql)?;
        let sessions = stmt
            .query_map(params_refs.as_slice(), Self::row_to_session)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((sessions, total))
    }

    /// Count sessions by status (for the CLI summary view).
    pub fn count_sessions_by_status(&self) -> Result<std::collections::HashMap<String, i64>> {
        let conn = self.lock();
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM call_sessions GROUP BY status")?;

        let counts: std::collections::HashMap<String, i64> = stmt
            .query_map([], |row| {
                let status: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((status, count))
            })?
            .collect::<std::result::Result<_, _>>()?;

        Ok(counts)
    }

    // ============================================
    // Row helpers
    // ============================================

    fn insert_session(conn: &Connection, session: &CallSession) -> Result<()> {
        let result = conn.execute(
            r#"
            INSERT INTO call_sessions (
                call_id, phone_number, direction, status, answered_by,
                response_text, response_classification, duration_seconds,
                notes, amd_resolved, fallback_notified, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                session.call_id,
                session.phone_number,
                session.direction.as_str(),
                session.status.as_str(),
                session.answered_by.map(|a| a.as_str()),
                session.response_text,
                session.response_classification.map(|c| c.as_str()),
                session.duration_seconds,
                session.notes,
                session.amd_resolved,
                session.fallback_notified,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(Error::DuplicateSession(session.call_id.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_session(conn: &Connection, session: &CallSession) -> Result<()> {
        let rows = conn.execute(
            r#"
            UPDATE call_sessions SET
                phone_number = ?2,
                direction = ?3,
                status = ?4,
                answered_by = ?5,
                response_text = ?6,
                response_classification = ?7,
                duration_seconds = ?8,
                notes = ?9,
                amd_resolved = ?10,
                fallback_notified = ?11,
                updated_at = ?12
            WHERE call_id = ?1
            "#,
            params![
                session.call_id,
                session.phone_number,
                session.direction.as_str(),
                session.status.as_str(),
                session.answered_by.map(|a| a.as_str()),
                session.response_text,
                session.response_classification.map(|c| c.as_str()),
                session.duration_seconds,
                session.notes,
                session.amd_resolved,
                session.fallback_notified,
                session.updated_at.to_rfc3339(),
            ],
        )?;

        if rows == 0 {
            return Err(Error::SessionNotFound(session.call_id.clone()));
        }
        Ok(())
    }

    fn select_session(conn: &Connection, call_id: &str) -> Result<Option<CallSession>> {
        conn.query_row(
            "SELECT * FROM call_sessions WHERE call_id = ?",
            [call_id],
            Self::row_to_session,
        )
        .optional()
        .map_err(Error::from)
    }

    fn row_to_session(row: &Row) -> rusqlite::Result<CallSession> {
        let direction_str: String = row.get("direction")?;
        let status_str: String = row.get("status")?;
        let answered_by_str: Option<String> = row.get("answered_by")?;
        let classification_str: Option<String> = row.get("response_classification")?;
        let created_at_str: String = row.get("created_at")?;
        let updated_at_str: String = row.get("updated_at")?;

        Ok(CallSession {
            call_id: row.get("call_id")?,
            phone_number: row.get("phone_number")?,
            direction: direction_str.parse().unwrap_or(Direction::Outbound),
            status: status_str.parse().unwrap_or(CallStatus::Unknown),
            answered_by: answered_by_str.and_then(|s| s.parse().ok()),
            response_text: row.get("response_text")?,
            response_classification: classification_str.and_then(|s| s.parse().ok()),
            duration_seconds: row.get("duration_seconds")?,
            notes: row.get("notes")?,
            amd_resolved: row.get("amd_resolved")?,
            fallback_notified: row.get("fallback_notified")?,
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            updated_at: DateTime::parse_from_rfc3339(&updated_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}
