//! SQLite session store with migrations
//!
//! Profiles are persisted one row per session. Writes go through [`Database::save_changes`],
//! which never clears a known field, only writes the fields a turn changed and only ever adds to
//! the asked set.

use crate::error::{GroundchatError, Result};
use crate::profile::{Field, SessionProfile};
use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::Path;

/// Database connection pool
pub type DbPool = Pool<SqliteConnectionManager>;

const CONNECTION_PRAGMAS: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA busy_timeout = 5000;
";

/// Database manager with migration support
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the database file and bring the schema up to date
    pub fn new(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GroundchatError::Io {
                source: e,
                context: format!("Failed to create database directory: {:?}", parent),
            })?;
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_init(|conn| conn.execute_batch(CONNECTION_PRAGMAS));

        let pool = Pool::builder().max_size(8).build(manager)?;

        let db = Self { pool };
        db.migrate()?;

        Ok(db)
    }

    /// Get a connection from the pool
    pub fn get_conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current_version: i32 = conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )?;

        for (version, migration) in MIGRATIONS.iter().enumerate() {
            let version = version as i32 + 1;

            if version > current_version {
                tracing::info!("Applying migration {}", version);
                conn.execute_batch(migration)?;
                conn.execute(
                    "INSERT INTO _migrations (version, applied_at) VALUES (?1, datetime('now'))",
                    params![version],
                )?;
            }
        }

        Ok(())
    }

    /// Insert a fresh, empty session
    pub fn create_session(&self) -> Result<SessionProfile> {
        let profile = SessionProfile::new();
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO sessions (id, created_at, asked_fields) VALUES (?1, ?2, '[]')",
            params![profile.id, profile.created_at.timestamp_millis()],
        )?;
        Ok(profile)
    }

    pub fn get_session(&self, id: &str) -> Result<Option<SessionProfile>> {
        let conn = self.get_conn()?;
        let profile = conn
            .query_row(
                "SELECT id, created_at, name, email, income, asked_fields
                 FROM sessions WHERE id = ?1",
                params![id],
                profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    /// Persist every field of `profile` and return the stored state
    ///
    /// Known fields are kept when `profile` has none, and the asked set is the union of the
    /// stored and incoming sets, so concurrent turns on one session cannot lose progress.
    pub fn save_session(&self, profile: &SessionProfile) -> Result<SessionProfile> {
        self.save_changes(profile, &Field::ALL)
    }

    /// Persist only the `changed` fields of `profile` and return the stored state
    ///
    /// Fields outside `changed` keep their stored value, so a turn working from an older
    /// snapshot cannot overwrite a value another turn wrote since. The asked set is always
    /// unioned. A missing row is inserted.
    pub fn save_changes(
        &self,
        profile: &SessionProfile,
        changed: &[Field],
    ) -> Result<SessionProfile> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored_asked: Option<String> = tx
            .query_row(
                "SELECT asked_fields FROM sessions WHERE id = ?1",
                params![profile.id],
                |row| row.get(0),
            )
            .optional()?
            .flatten();

        let mut asked = parse_asked(stored_asked.as_deref());
        asked.extend(profile.asked_fields.iter().copied());
        let asked_json = serde_json::to_string(&asked).map_err(|e| GroundchatError::Json {
            source: e,
            context: "Failed to serialize asked fields".to_string(),
        })?;

        let write = |field: Field| {
            if changed.contains(&field) {
                profile.get(field)
            } else {
                None
            }
        };

        tx.execute(
            "INSERT INTO sessions (id, created_at, name, email, income, asked_fields)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = COALESCE(excluded.name, sessions.name),
                email = COALESCE(excluded.email, sessions.email),
                income = COALESCE(excluded.income, sessions.income),
                asked_fields = excluded.asked_fields",
            params![
                profile.id,
                profile.created_at.timestamp_millis(),
                write(Field::Name),
                write(Field::Email),
                write(Field::Income),
                asked_json
            ],
        )?;

        let stored = tx.query_row(
            "SELECT id, created_at, name, email, income, asked_fields
             FROM sessions WHERE id = ?1",
            params![profile.id],
            profile_from_row,
        )?;
        tx.commit()?;

        Ok(stored)
    }

    pub fn session_count(&self) -> Result<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn parse_asked(raw: Option<&str>) -> BTreeSet<Field> {
    raw.and_then(|json| serde_json::from_str::<Vec<String>>(json).ok())
        .unwrap_or_default()
        .iter()
        .filter_map(|f| f.parse().ok())
        .collect()
}

fn profile_from_row(row: &Row<'_>) -> rusqlite::Result<SessionProfile> {
    let created_ms: i64 = row.get(1)?;
    let asked: Option<String> = row.get(5)?;
    Ok(SessionProfile {
        id: row.get(0)?,
        created_at: DateTime::<Utc>::from_timestamp_millis(created_ms).unwrap_or_default(),
        name: row.get(2)?,
        email: row.get(3)?,
        income: row.get(4)?,
        asked_fields: parse_asked(asked.as_deref()),
    })
}

/// Database migrations (each string is one migration)
const MIGRATIONS: &[&str] = &[
    // Migration 1: sessions
    r#"
    CREATE TABLE sessions (
        id TEXT PRIMARY KEY,
        created_at INTEGER NOT NULL,
        name TEXT,
        email TEXT,
        income TEXT,
        asked_fields TEXT NOT NULL DEFAULT '[]'
    );

    CREATE INDEX idx_sessions_created_at ON sessions(created_at);
    "#,
];
