// Database CRUD operations
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use super::db::{DbConnection, DbResult};
use super::models::{Session, SessionStatus, StoredCalibration};
use crate::calibration::{CalibrationReport, ThresholdSet};

fn conversion_error(
    column: usize,
    error: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(error))
}

fn uuid_column(row: &Row, column: usize) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(&row.get::<_, String>(column)?).map_err(|e| conversion_error(column, e))
}

fn time_column(row: &Row, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    row.get::<_, String>(column)?
        .parse()
        .map_err(|e| conversion_error(column, e))
}

fn optional_time_column(row: &Row, column: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<String>>(column)?
        .map(|s| s.parse().map_err(|e| conversion_error(column, e)))
        .transpose()
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, column: usize) -> rusqlite::Result<T> {
    serde_json::from_str(&row.get::<_, String>(column)?).map_err(|e| conversion_error(column, e))
}

#[derive(Debug, thiserror::Error)]
#[error("unknown session status {0:?}")]
struct UnknownStatus(String);

fn session_from_row(row: &Row) -> rusqlite::Result<Session> {
    let status: String = row.get(4)?;
    Ok(Session {
        id: uuid_column(row, 0)?,
        created_at: time_column(row, 1)?,
        participant: row.get(2)?,
        backend: row.get(3)?,
        status: SessionStatus::from_string(&status)
            .ok_or_else(|| conversion_error(4, UnknownStatus(status.clone())))?,
        sample_log_path: row.get(5)?,
        sample_log_sha256: row.get(6)?,
        closed_at: optional_time_column(row, 7)?,
    })
}

fn calibration_from_row(row: &Row) -> rusqlite::Result<StoredCalibration> {
    Ok(StoredCalibration {
        id: uuid_column(row, 0)?,
        session_id: uuid_column(row, 1)?,
        created_at: time_column(row, 2)?,
        report: json_column(row, 3)?,
        thresholds: json_column(row, 4)?,
    })
}

const SESSION_COLUMNS: &str = "id, created_at, participant, backend, status, sample_log_path, sample_log_sha256, closed_at";

// ==================== SESSION QUERIES ====================

/// Create a new open session
pub fn create_session(
    db: &DbConnection,
    id: Uuid,
    participant: String,
    backend: String,
    sample_log_path: Option<String>,
) -> DbResult<Session> {
    let session = Session {
        id,
        created_at: Utc::now(),
        participant,
        backend,
        status: SessionStatus::Open,
        sample_log_path,
        sample_log_sha256: None,
        closed_at: None,
    };

    let conn = db.lock();
    conn.execute(
        "INSERT INTO sessions (id, created_at, participant, backend, status, sample_log_path)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session.id.to_string(),
            session.created_at.to_rfc3339(),
            session.participant,
            session.backend,
            session.status.as_str(),
            session.sample_log_path,
        ],
    )?;

    Ok(session)
}

/// Get a session by ID
pub fn get_session(db: &DbConnection, id: &Uuid) -> DbResult<Option<Session>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM sessions WHERE id = ?1",
        SESSION_COLUMNS
    ))?;

    let session = stmt
        .query_row([id.to_string()], session_from_row)
        .optional()?;
    Ok(session)
}

/// Mark a session closed or failed and record the sample log hash
pub fn finish_session(
    db: &DbConnection,
    id: &Uuid,
    status: SessionStatus,
    sample_log_sha256: Option<String>,
) -> DbResult<()> {
    let conn = db.lock();
    conn.execute(
        "UPDATE sessions SET status = ?1, sample_log_sha256 = ?2, closed_at = ?3 WHERE id = ?4",
        params![
            status.as_str(),
            sample_log_sha256,
            Utc::now().to_rfc3339(),
            id.to_string(),
        ],
    )?;

    Ok(())
}

/// List all sessions, newest first
pub fn list_sessions(db: &DbConnection) -> DbResult<Vec<Session>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM sessions ORDER BY created_at DESC",
        SESSION_COLUMNS
    ))?;

    let sessions = stmt
        .query_map([], session_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(sessions)
}

// ==================== CALIBRATION QUERIES ====================

/// Store a calibration report and the thresholds derived from it
pub fn record_calibration(
    db: &DbConnection,
    session_id: Uuid,
    report: &CalibrationReport,
    thresholds: &ThresholdSet,
) -> DbResult<StoredCalibration> {
    let stored = StoredCalibration {
        id: Uuid::new_v4(),
        session_id,
        created_at: report.created_at,
        report: report.clone(),
        thresholds: *thresholds,
    };

    let report_json = serde_json::to_string(&stored.report)?;
    let thresholds_json = serde_json::to_string(&stored.thresholds)?;

    let conn = db.lock();
    conn.execute(
        "INSERT INTO calibration_reports (id, session_id, created_at, report_json, thresholds_json)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            stored.id.to_string(),
            stored.session_id.to_string(),
            stored.created_at.to_rfc3339(),
            report_json,
            thresholds_json,
        ],
    )?;

    Ok(stored)
}

/// All calibrations of a session, oldest first
pub fn list_calibrations_for_session(
    db: &DbConnection,
    session_id: &Uuid,
) -> DbResult<Vec<StoredCalibration>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT id, session_id, created_at, report_json, thresholds_json
         FROM calibration_reports WHERE session_id = ?1
         ORDER BY created_at ASC",
    )?;

    let calibrations = stmt
        .query_map([session_id.to_string()], calibration_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(calibrations)
}

/// Most recent calibration of any session of `participant`
pub fn latest_calibration(
    db: &DbConnection,
    participant: &str,
) -> DbResult<Option<StoredCalibration>> {
    let conn = db.lock();
    let mut stmt = conn.prepare(
        "SELECT c.id, c.session_id, c.created_at, c.report_json, c.thresholds_json
         FROM calibration_reports c
         JOIN sessions s ON s.id = c.session_id
         WHERE s.participant = ?1
         ORDER BY c.created_at DESC
         LIMIT 1",
    )?;

    let calibration = stmt
        .query_row([participant], calibration_from_row)
        .optional()?;
    Ok(calibration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{derive_thresholds, DetectionConstants};
    use crate::events::types::Point;
    use crate::geometry::ScreenGeometry;
    use crate::state::db::open_in_memory;

    fn sample_calibration(rms: f64) -> (CalibrationReport, ThresholdSet) {
        let geometry = ScreenGeometry::default();
        let report = CalibrationReport::new(
            Point::new(512.0, 384.0),
            20,
            (2.0, 3.0),
            (rms, rms),
            &geometry,
        );
        let thresholds = derive_thresholds(&report, &geometry, &DetectionConstants::default());
        (report, thresholds)
    }

    #[test]
    fn test_session_lifecycle() {
        let db = open_in_memory().unwrap();
        let session = create_session(
            &db,
            Uuid::new_v4(),
            "p01".to_string(),
            "simulated".to_string(),
            Some("/tmp/p01.tsv".to_string()),
        )
        .unwrap();

        let loaded = get_session(&db, &session.id).unwrap().unwrap();
        assert_eq!(loaded.participant, "p01");
        assert_eq!(loaded.status, SessionStatus::Open);
        assert!(loaded.closed_at.is_none());

        finish_session(&db, &session.id, SessionStatus::Failed, Some("abc".to_string())).unwrap();
        let loaded = get_session(&db, &session.id).unwrap().unwrap();
        assert_eq!(loaded.status, SessionStatus::Failed);
        assert_eq!(loaded.sample_log_sha256.as_deref(), Some("abc"));
        assert!(loaded.closed_at.is_some());

        assert!(get_session(&db, &Uuid::new_v4()).unwrap().is_none());
        assert_eq!(list_sessions(&db).unwrap().len(), 1);
    }

    #[test]
    fn test_calibration_round_trip() {
        let db = open_in_memory().unwrap();
        let session =
            create_session(&db, Uuid::new_v4(), "p02".to_string(), "replay".to_string(), None).unwrap();
        let (report, thresholds) = sample_calibration(1.5);

        let stored = record_calibration(&db, session.id, &report, &thresholds).unwrap();
        let listed = list_calibrations_for_session(&db, &session.id).unwrap();

        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, stored.id);
        assert_eq!(listed[0].report.samples_used, 20);
        assert!((listed[0].thresholds.noise_tolerance_px.0 - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_latest_calibration_per_participant() {
        let db = open_in_memory().unwrap();
        let first = create_session(&db, Uuid::new_v4(), "p03".to_string(), "simulated".to_string(), None).unwrap();
        let other = create_session(&db, Uuid::new_v4(), "p04".to_string(), "simulated".to_string(), None).unwrap();

        let (mut old_report, thresholds) = sample_calibration(1.0);
        old_report.created_at = Utc::now() - chrono::Duration::minutes(5);
        record_calibration(&db, first.id, &old_report, &thresholds).unwrap();

        let (new_report, new_thresholds) = sample_calibration(2.0);
        record_calibration(&db, first.id, &new_report, &new_thresholds).unwrap();

        let (other_report, other_thresholds) = sample_calibration(9.0);
        record_calibration(&db, other.id, &other_report, &other_thresholds).unwrap();

        let latest = latest_calibration(&db, "p03").unwrap().unwrap();
        assert!((latest.report.rms_noise_px.0 - 2.0).abs() < 1e-12);
        assert!(latest_calibration(&db, "nobody").unwrap().is_none());
    }

    #[test]
    fn test_unknown_status_is_an_error() {
        let db = open_in_memory().unwrap();
        let session = create_session(&db, Uuid::new_v4(), "p05".to_string(), "simulated".to_string(), None).unwrap();
        db.lock()
            .execute(
                "UPDATE sessions SET status = 'bogus' WHERE id = ?1",
                [session.id.to_string()],
            )
            .unwrap();

        assert!(get_session(&db, &session.id).is_err());
    }
}
