// State management module
// Handles SQLite persistence and file system operations

pub mod db;
pub mod models;
pub mod queries;
pub mod storage;

pub use db::{init_db, open_db, open_in_memory, DbConnection, DbError, DbResult};
pub use models::{Session, SessionStatus, StoredCalibration};
pub use queries::{
    create_session, finish_session, get_session, latest_calibration,
    list_calibrations_for_session, list_sessions, record_calibration,
};
pub use storage::{get_session_dir, hash_file, StorageError};
