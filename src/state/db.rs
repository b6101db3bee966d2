// SQLite database setup and migrations
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use super::storage::{get_app_data_dir, StorageError};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

// Thread-safe database connection wrapper
pub struct DbConnection {
    conn: Arc<Mutex<Connection>>,
}

impl DbConnection {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Clone for DbConnection {
    fn clone(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
        }
    }
}

/// Initialize the database at the app data directory
pub fn init_db() -> DbResult<DbConnection> {
    let app_data_dir = get_app_data_dir()?;
    open_db(&app_data_dir.join("gazeline.db"))
}

/// Open (or create) a database file and bring its schema up to date
pub fn open_db(db_path: &Path) -> DbResult<DbConnection> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(db_path)?;
    prepare(conn)
}

/// In-memory database, for pilots and tests
pub fn open_in_memory() -> DbResult<DbConnection> {
    prepare(Connection::open_in_memory()?)
}

fn prepare(conn: Connection) -> DbResult<DbConnection> {
    // Enable foreign keys
    conn.execute("PRAGMA foreign_keys = ON", [])?;
    run_migrations(&conn)?;
    Ok(DbConnection::new(conn))
}

fn run_migrations(conn: &Connection) -> DbResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    let current_version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    if current_version < 1 {
        migration_v1(conn)?;
        conn.execute("INSERT INTO schema_migrations (version) VALUES (?1)", [1])?;
        log::info!("Applied database migration v1");
    }

    Ok(())
}

fn migration_v1(conn: &Connection) -> DbResult<()> {
    // Sessions table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            participant TEXT NOT NULL,
            backend TEXT NOT NULL,
            status TEXT NOT NULL,
            sample_log_path TEXT,
            sample_log_sha256 TEXT,
            closed_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_participant ON sessions(participant)",
        [],
    )?;

    // Calibration reports table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS calibration_reports (
            id TEXT PRIMARY KEY,
            session_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            report_json TEXT NOT NULL,
            thresholds_json TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_calibration_reports_session_id ON calibration_reports(session_id)",
        [],
    )?;

    Ok(())
}
