//! SQLite implementation of the local store

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tracing::{debug, info};

use crate::models::{LocalEvent, LocalUser, RemoteEvent, RemoteUser};
use crate::store::{EventBatchOutcome, LocalStore, Page, UserQuery};
use crate::{Error, Result};

const USER_COLUMNS: &str =
    "id, remote_id, display_name, email, job_title, department, last_synced, active";

const EVENT_COLUMNS: &str =
    "id, remote_id, subject, start_time, end_time, location, all_day, user_id, last_synced";

/// SQLite-backed store for users and events
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path`
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        debug!("Opening store database at: {}", db_path);
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_tables()?;
        info!("SqliteStore initialized at {}", db_path);
        Ok(store)
    }

    /// Create an in-memory store (useful for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;

             CREATE TABLE IF NOT EXISTS users (
                 id TEXT PRIMARY KEY,
                 remote_id TEXT UNIQUE,
                 display_name TEXT NOT NULL,
                 email TEXT NOT NULL,
                 job_title TEXT,
                 department TEXT,
                 last_synced TEXT NOT NULL,
                 active INTEGER NOT NULL DEFAULT 1
             );

             CREATE TABLE IF NOT EXISTS events (
                 id TEXT PRIMARY KEY,
                 remote_id TEXT NOT NULL,
                 subject TEXT NOT NULL,
                 start_time TEXT NOT NULL,
                 end_time TEXT NOT NULL,
                 location TEXT,
                 all_day INTEGER NOT NULL DEFAULT 0,
                 user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                 last_synced TEXT NOT NULL,
                 UNIQUE (user_id, remote_id)
             );

             CREATE INDEX IF NOT EXISTS idx_events_user_start ON events(user_id, start_time);
             CREATE INDEX IF NOT EXISTS idx_events_start ON events(start_time);
             CREATE INDEX IF NOT EXISTS idx_users_display_name ON users(display_name);",
        )?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("store connection lock poisoned".to_string()))
    }
}

impl LocalStore for SqliteStore {
    fn find_user_by_remote_id(&self, remote_id: &str) -> Result<Option<LocalUser>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE remote_id = ?1"),
                params![remote_id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn get_user(&self, id: &str) -> Result<Option<LocalUser>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn insert_user(&self, user: &RemoteUser, synced_at: DateTime<Utc>) -> Result<LocalUser> {
        let local = LocalUser {
            id: uuid::Uuid::new_v4().to_string(),
            remote_id: Some(user.remote_id.clone()),
            display_name: user.display_name.clone(),
            email: user.email.clone(),
            job_title: user.job_title.clone(),
            department: user.department.clone(),
            last_synced: synced_at,
            active: true,
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (id, remote_id, display_name, email, job_title, department, last_synced, active)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1)",
            params![
                local.id,
                local.remote_id,
                local.display_name,
                local.email,
                local.job_title,
                local.department,
                timestamp(&synced_at),
            ],
        )
        .map_err(|e| conflict_or(e, format!("user with remote id {}", user.remote_id)))?;

        debug!("Inserted user {} (remote {})", local.id, user.remote_id);
        Ok(local)
    }

    fn update_user(&self, id: &str, user: &RemoteUser, synced_at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE users
             SET display_name = ?2, email = ?3, job_title = ?4, department = ?5,
                 last_synced = MAX(last_synced, ?6)
             WHERE id = ?1",
            params![
                id,
                user.display_name,
                user.email,
                user.job_title,
                user.department,
                timestamp(&synced_at),
            ],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(format!("user {}", id)));
        }
        debug!("Updated user {}", id);
        Ok(())
    }

    fn upsert_events(
        &self,
        user_id: &str,
        events: &[RemoteEvent],
        synced_at: DateTime<Utc>,
    ) -> Result<EventBatchOutcome> {
        let synced = timestamp(&synced_at);
        let mut outcome = EventBatchOutcome::default();

        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front so the lookup below cannot race
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        {
            let mut find =
                tx.prepare_cached("SELECT id FROM events WHERE user_id = ?1 AND remote_id = ?2")?;
            let mut insert = tx.prepare_cached(
                "INSERT INTO events (id, remote_id, subject, start_time, end_time, location, all_day, user_id, last_synced)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            let mut update = tx.prepare_cached(
                "UPDATE events
                 SET subject = ?2, start_time = ?3, end_time = ?4, location = ?5, all_day = ?6,
                     last_synced = MAX(last_synced, ?7)
                 WHERE id = ?1",
            )?;

            for event in events {
                if !event.has_remote_id() {
                    return Err(Error::Other(format!(
                        "event '{}' for user {} has no remote id",
                        event.subject, user_id
                    )));
                }

                let existing: Option<String> = find
                    .query_row(params![user_id, event.remote_id], |row| row.get(0))
                    .optional()?;

                match existing {
                    Some(id) => {
                        update.execute(params![
                            id,
                            event.subject,
                            timestamp(&event.start),
                            timestamp(&event.end),
                            event.location,
                            event.all_day,
                            synced,
                        ])?;
                        outcome.updated += 1;
                    }
                    None => {
                        insert.execute(params![
                            uuid::Uuid::new_v4().to_string(),
                            event.remote_id,
                            event.subject,
                            timestamp(&event.start),
                            timestamp(&event.end),
                            event.location,
                            event.all_day,
                            user_id,
                            synced,
                        ])?;
                        outcome.created += 1;
                    }
                }
            }
        }
        tx.commit()?;

        debug!(
            "Event batch for user {}: {} created, {} updated",
            user_id, outcome.created, outcome.updated
        );
        Ok(outcome)
    }

    fn count_users(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_events(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn last_synced(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let latest: Option<String> =
            conn.query_row("SELECT MAX(last_synced) FROM users", [], |row| row.get(0))?;
        latest
            .map(|s| parse_timestamp(&s, 0))
            .transpose()
            .map_err(Error::from)
    }

    fn list_users(&self, query: &UserQuery) -> Result<Page<LocalUser>> {
        let query = query.normalized();
        let filter = "(?1 = 0 OR EXISTS (SELECT 1 FROM events e WHERE e.user_id = u.id))";

        let conn = self.lock()?;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM users u WHERE {filter}"),
            params![query.only_with_events],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users u WHERE {filter}
             ORDER BY u.display_name COLLATE NOCASE, u.id
             LIMIT ?2 OFFSET ?3"
        ))?;
        let users = stmt
            .query_map(
                params![query.only_with_events, query.page_size, query.offset()],
                user_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        debug!("Listed {} users (page {})", users.len(), query.page);
        Ok(Page::new(users, total as u64, &query))
    }

    fn list_user_events(&self, user_id: &str) -> Result<Vec<LocalEvent>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE user_id = ?1 ORDER BY start_time ASC, id"
        ))?;
        let events = stmt
            .query_map(params![user_id], event_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(events)
    }

    fn delete_events_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let conn = self.lock()?;
        let removed = conn.execute(
            "DELETE FROM events WHERE start_time < ?1",
            params![timestamp(&cutoff)],
        )?;
        Ok(removed)
    }
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering
fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(e)))
}

fn conflict_or(err: rusqlite::Error, what: String) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if code.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(what)
        }
        _ => Error::Database(err),
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<LocalUser> {
    let last_synced: String = row.get(6)?;
    Ok(LocalUser {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        display_name: row.get(2)?,
        email: row.get(3)?,
        job_title: row.get(4)?,
        department: row.get(5)?,
        last_synced: parse_timestamp(&last_synced, 6)?,
        active: row.get(7)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<LocalEvent> {
    let start: String = row.get(3)?;
    let end: String = row.get(4)?;
    let last_synced: String = row.get(8)?;
    Ok(LocalEvent {
        id: row.get(0)?,
        remote_id: row.get(1)?,
        subject: row.get(2)?,
        start: parse_timestamp(&start, 3)?,
        end: parse_timestamp(&end, 4)?,
        location: row.get(5)?,
        all_day: row.get(6)?,
        user_id: row.get(7)?,
        last_synced: parse_timestamp(&last_synced, 8)?,
    })
}
