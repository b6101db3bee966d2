// Eye-tracking session
// Owns the tracker stream, detector, logs and stored session record

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::calibration::{
    derive_thresholds, run_calibration, Calibration, CalibrationError, CalibrationReport,
    ThresholdSet,
};
use crate::config::{ConfigError, TrackerConfig};
use crate::drift::{DriftCorrector, DriftMode, DriftOutcome, RecalibrationReason};
use crate::events::detector::EventDetector;
use crate::events::types::{EventKind, GazeEvent, Point};
use crate::events::wait::{Detection, WaitLimit};
use crate::geometry::ScreenGeometry;
use crate::pipeline::{
    Logger, SampleLog, SampleLogError, TraceBuilder, TraceKind, TraceWriter,
};
use crate::state::{
    create_session, finish_session, get_session_dir, hash_file, latest_calibration,
    record_calibration, DbConnection, DbError, SessionStatus, StorageError,
};
use crate::tracker::{
    Clock, GazeStream, InputPoller, MonotonicClock, StreamReader, TrackerBackend, TrackerError,
    TrackerLink,
};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Calibration(#[from] CalibrationError),

    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Sample log error: {0}")]
    SampleLog(#[from] SampleLogError),

    #[error("No calibration yet; calibrate before detecting events")]
    NotCalibrated,

    #[error("Session already closed")]
    Closed,
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Result of a drift check run through the session
#[derive(Debug, Clone, PartialEq)]
pub enum DriftCheck {
    /// Calibration still valid
    Accepted { error_px: f64, attempts: u32 },
    /// The check failed and a fresh calibration replaced the old one
    Recalibrated {
        reason: RecalibrationReason,
        calibration: Calibration,
    },
}

/// What `close` left behind
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: Uuid,
    pub status: SessionStatus,
    pub rows_logged: usize,
    pub sample_log_sha256: Option<String>,
}

/// One participant's eye-tracking session
///
/// A tracker disconnect anywhere tears the session down (stream stopped,
/// logs flushed and closed, record marked failed) before the error is
/// returned. Dropping an open session closes it.
pub struct EyeTracker {
    id: Uuid,
    participant: String,
    config: TrackerConfig,
    geometry: ScreenGeometry,
    clock: MonotonicClock,
    stream: GazeStream,
    reader: StreamReader,
    detector: Option<EventDetector>,
    report: Option<CalibrationReport>,
    drift: DriftCorrector,
    sample_log: Option<SampleLog>,
    trace: Option<TraceWriter>,
    db: Option<DbConnection>,
    session_dir: PathBuf,
    closed: bool,
}

impl EyeTracker {
    /// Open a session on the backend named in `config`
    pub fn open(
        config: TrackerConfig,
        participant: &str,
        db: Option<DbConnection>,
    ) -> SessionResult<Self> {
        config.validate()?;
        let clock = MonotonicClock::start();
        let center = config.display.center();
        let backend =
            TrackerBackend::from_config(&config.backend, clock, Point::new(center.0, center.1))?;
        Self::open_with_backend(config, participant, backend, clock, db)
    }

    /// Open a session on an explicitly constructed backend
    ///
    /// `clock` must be the clock the backend timestamps its samples with.
    pub fn open_with_backend(
        config: TrackerConfig,
        participant: &str,
        backend: TrackerBackend,
        clock: MonotonicClock,
        db: Option<DbConnection>,
    ) -> SessionResult<Self> {
        config.validate()?;
        let geometry = config.display;
        let id = Uuid::new_v4();
        let session_dir = get_session_dir(config.logging.data_dir.as_deref(), &id)?;

        let sample_log = if config.logging.sample_log {
            Some(SampleLog::create(
                session_dir.join("samples.tsv"),
                config.logging.flush_every,
            )?)
        } else {
            None
        };
        let trace = config
            .logging
            .trace
            .then(|| TraceWriter::new(session_dir.join("trace.jsonl")));

        let backend_name = backend.name().to_string();
        let stream = GazeStream::spawn(backend, clock, sample_log.as_ref().map(|l| l.queue()));
        let reader = stream.reader();

        if let Some(db) = &db {
            create_session(
                db,
                id,
                participant.to_string(),
                backend_name.clone(),
                sample_log
                    .as_ref()
                    .map(|l| l.path().to_string_lossy().into_owned()),
            )?;
        }

        if let Some(trace) = &trace {
            trace.record(TraceBuilder::kind(TraceKind::Session).with_data(
                "Session opened",
                serde_json::json!({
                    "id": id.to_string(),
                    "participant": participant,
                    "backend": backend_name,
                }),
            ));
        }

        log::info!(
            "Opened session {} for {} on {} in {}",
            id,
            participant,
            backend_name,
            session_dir.display()
        );

        Ok(EyeTracker {
            id,
            participant: participant.to_string(),
            drift: DriftCorrector::new(config.drift, &geometry),
            config,
            geometry,
            clock,
            stream,
            reader,
            detector: None,
            report: None,
            sample_log,
            trace,
            db,
            session_dir,
            closed: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn geometry(&self) -> &ScreenGeometry {
        &self.geometry
    }

    pub fn clock(&self) -> &MonotonicClock {
        &self.clock
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn sample_log_path(&self) -> Option<&Path> {
        self.sample_log.as_ref().map(|l| l.path())
    }

    pub fn trace_path(&self) -> Option<&Path> {
        self.trace.as_ref().map(|t| t.path())
    }

    /// Thresholds in use, once calibrated
    pub fn thresholds(&self) -> Option<&ThresholdSet> {
        self.detector.as_ref().map(|d| d.thresholds())
    }

    pub fn report(&self) -> Option<&CalibrationReport> {
        self.report.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn ensure_open(&self) -> SessionResult<()> {
        if self.closed {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn screen_center(&self) -> Point {
        let (x, y) = self.geometry.center();
        Point::new(x, y)
    }

    // ==================== CALIBRATION ====================

    /// Run noise calibration on `target` (screen center by default)
    ///
    /// Insufficient data, low accuracy and cancellation come back as
    /// recoverable errors; call again to retry. A tracker disconnect closes
    /// the session.
    pub fn calibrate(
        &mut self,
        target: Option<Point>,
        limit: &WaitLimit,
    ) -> Result<Calibration, CalibrationError> {
        if self.closed {
            return Err(CalibrationError::Tracker(TrackerError::Disconnected(
                "session closed".to_string(),
            )));
        }
        let target = target.unwrap_or_else(|| self.screen_center());
        self.log_message(&format!("calibration start {:.1} {:.1}", target.x, target.y));

        let result = run_calibration(
            &mut self.reader,
            &self.clock,
            target,
            &self.geometry,
            &self.config.calibration,
            &self.config.detection,
            limit,
        );

        match result {
            Ok(calibration) => {
                self.apply_calibration(&calibration);
                Ok(calibration)
            }
            Err(CalibrationError::Tracker(e)) => {
                self.fail(&e);
                Err(CalibrationError::Tracker(e))
            }
            Err(e) => {
                log::warn!("Calibration failed: {}", e);
                self.log_message(&format!("calibration failed: {}", e));
                Err(e)
            }
        }
    }

    /// Re-derive thresholds from a stored report, skipping measurement
    pub fn restore_calibration(&mut self, report: CalibrationReport) -> ThresholdSet {
        let thresholds = derive_thresholds(&report, &self.geometry, &self.config.detection);
        let calibration = Calibration { report, thresholds };
        self.apply_calibration(&calibration);
        thresholds
    }

    /// Reuse the participant's most recent stored calibration, if any
    pub fn restore_latest_calibration(&mut self) -> SessionResult<Option<ThresholdSet>> {
        let Some(db) = &self.db else {
            return Ok(None);
        };
        match latest_calibration(db, &self.participant)? {
            Some(stored) => Ok(Some(self.restore_calibration(stored.report))),
            None => Ok(None),
        }
    }

    fn apply_calibration(&mut self, calibration: &Calibration) {
        self.detector = Some(EventDetector::new(calibration.thresholds));
        self.report = Some(calibration.report.clone());

        let now = self.clock.now_ms();
        if let Some(log) = &self.sample_log {
            for line in calibration.report.log_lines(&calibration.thresholds) {
                log.message(now, &line);
            }
        }

        if let Some(trace) = &self.trace {
            let data = serde_json::json!({
                "report": calibration.report,
                "thresholds": calibration.thresholds,
            });
            trace.record(TraceBuilder::kind(TraceKind::Calibration).with_data(
                format!(
                    "Calibrated: accuracy {:.2} deg, {} samples",
                    calibration.report.worst_accuracy_deg(),
                    calibration.report.samples_used
                ),
                data,
            ));
        }

        if let Some(db) = &self.db {
            if let Err(e) =
                record_calibration(db, self.id, &calibration.report, &calibration.thresholds)
            {
                log::warn!("Failed to store calibration for session {}: {}", self.id, e);
            }
        }
    }

    // ==================== EVENTS ====================

    /// Wait for one event of `kind` within `limit`
    pub fn wait_for(
        &mut self,
        kind: EventKind,
        limit: &WaitLimit,
    ) -> SessionResult<Detection<GazeEvent>> {
        self.ensure_open()?;
        let detector = self.detector.as_ref().ok_or(SessionError::NotCalibrated)?;

        match detector.wait_for(kind, &mut self.reader, &self.clock, limit) {
            Ok(Detection::Found(event)) => {
                self.log_event(&event);
                Ok(Detection::Found(event))
            }
            Ok(other) => Ok(other),
            Err(e) => {
                self.fail(&e);
                Err(e.into())
            }
        }
    }

    pub fn wait_for_fixation_start(
        &mut self,
        limit: &WaitLimit,
    ) -> SessionResult<Detection<GazeEvent>> {
        self.wait_for(EventKind::FixationStart, limit)
    }

    pub fn wait_for_fixation_end(
        &mut self,
        limit: &WaitLimit,
    ) -> SessionResult<Detection<GazeEvent>> {
        self.wait_for(EventKind::FixationEnd, limit)
    }

    pub fn wait_for_saccade_start(
        &mut self,
        limit: &WaitLimit,
    ) -> SessionResult<Detection<GazeEvent>> {
        self.wait_for(EventKind::SaccadeStart, limit)
    }

    pub fn wait_for_saccade_end(
        &mut self,
        limit: &WaitLimit,
    ) -> SessionResult<Detection<GazeEvent>> {
        self.wait_for(EventKind::SaccadeEnd, limit)
    }

    pub fn wait_for_blink_start(
        &mut self,
        limit: &WaitLimit,
    ) -> SessionResult<Detection<GazeEvent>> {
        self.wait_for(EventKind::BlinkStart, limit)
    }

    pub fn wait_for_blink_end(
        &mut self,
        limit: &WaitLimit,
    ) -> SessionResult<Detection<GazeEvent>> {
        self.wait_for(EventKind::BlinkEnd, limit)
    }

    // ==================== DRIFT CORRECTION ====================

    /// Check calibration on `target` and recalibrate when the check fails
    pub fn drift_correction<I>(
        &mut self,
        mode: DriftMode,
        target: Option<Point>,
        input: &mut I,
        limit: &WaitLimit,
    ) -> SessionResult<DriftCheck>
    where
        I: InputPoller + ?Sized,
    {
        self.ensure_open()?;
        let target = target.unwrap_or_else(|| self.screen_center());

        let outcome = match self
            .drift
            .check(mode, &mut self.reader, &self.clock, input, target, limit)
        {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail(&e);
                return Err(e.into());
            }
        };

        if let Some(trace) = &self.trace {
            match serde_json::to_value(outcome) {
                Ok(data) => trace.record(
                    TraceBuilder::kind(TraceKind::Drift).with_data("Drift check", data),
                ),
                Err(e) => log::warn!("Failed to serialize drift outcome: {}", e),
            }
        }

        match outcome {
            DriftOutcome::Accepted { error_px, attempts } => {
                self.log_message(&format!("drift check accepted {:.1} px", error_px));
                Ok(DriftCheck::Accepted { error_px, attempts })
            }
            DriftOutcome::Recalibrate(reason) => {
                self.log_message(&format!("drift check failed: {:?}", reason));
                let calibration = self.calibrate(Some(target), &WaitLimit::unbounded())?;
                Ok(DriftCheck::Recalibrated {
                    reason,
                    calibration,
                })
            }
        }
    }

    // ==================== LOGGING ====================

    /// Write a free-text message to the sample log and trace
    pub fn log_message(&self, text: &str) {
        let now = self.clock.now_ms();
        if let Some(log) = &self.sample_log {
            log.message(now, text);
        }
        if let Some(trace) = &self.trace {
            trace.message(now, text);
        }
    }

    fn log_event(&self, event: &GazeEvent) {
        if let Some(log) = &self.sample_log {
            log.event(event);
        }
        if let Some(trace) = &self.trace {
            trace.event(event);
        }
    }

    /// Start queueing samples to the sample log
    pub fn start_recording(&self) -> SessionResult<()> {
        self.ensure_open()?;
        self.stream.set_recording(true);
        self.log_message("start_trial");
        Ok(())
    }

    pub fn stop_recording(&self) -> SessionResult<()> {
        self.ensure_open()?;
        self.log_message("stop_trial");
        self.stream.set_recording(false);
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.stream.is_recording()
    }

    // ==================== TEARDOWN ====================

    /// Orderly shutdown: stop the stream, flush and close logs, finish the record
    pub fn close(mut self) -> SessionResult<SessionSummary> {
        self.ensure_open()?;
        self.teardown(SessionStatus::Closed)
    }

    fn fail(&mut self, error: &TrackerError) {
        log::error!("Session {} lost its tracker: {}", self.id, error);
        if let Err(e) = self.teardown(SessionStatus::Failed) {
            log::error!("Teardown of session {} incomplete: {}", self.id, e);
        }
    }

    fn teardown(&mut self, status: SessionStatus) -> SessionResult<SessionSummary> {
        if self.closed {
            return Err(SessionError::Closed);
        }
        self.closed = true;

        self.stream.set_recording(false);
        self.stream.stop();

        if let Some(trace) = &self.trace {
            trace.record(
                TraceBuilder::kind(TraceKind::Session)
                    .message(format!("Session {}", status.as_str())),
            );
        }

        // Keep going after a failed step so every resource is released
        let mut first_error: Option<SessionError> = None;
        let mut rows_logged = 0;
        let mut sample_log_sha256 = None;

        if let Some(log) = self.sample_log.take() {
            let path = log.path().to_path_buf();
            match log.close() {
                Ok(rows) => rows_logged = rows,
                Err(e) => {
                    first_error.get_or_insert(e.into());
                }
            }
            match hash_file(&path) {
                Ok(hash) => sample_log_sha256 = Some(hash),
                Err(e) => {
                    first_error.get_or_insert(e.into());
                }
            }
        }

        if let Some(db) = &self.db {
            if let Err(e) = finish_session(db, &self.id, status, sample_log_sha256.clone()) {
                first_error.get_or_insert(e.into());
            }
        }

        log::info!(
            "Session {} {} ({} rows logged)",
            self.id,
            status.as_str(),
            rows_logged
        );

        match first_error {
            Some(e) => Err(e),
            None => Ok(SessionSummary {
                id: self.id,
                status,
                rows_logged,
                sample_log_sha256,
            }),
        }
    }
}

impl Drop for EyeTracker {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.teardown(SessionStatus::Closed) {
                log::warn!("Session {} not closed cleanly: {}", self.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{DetectionConstants, NoiseSettings};
    use crate::pipeline::{read_sample_log, read_trace_file, LogRecord};
    use crate::state::{get_session, list_calibrations_for_session, open_in_memory};
    use crate::tracker::{ScriptedInput, ScriptedTracker, SimulatedLink};
    use std::thread;
    use std::time::Duration;
    use tempfile::TempDir;

    const BOX: [(f64, f64); 12] = [
        (512.0, 384.0),
        (514.0, 385.0),
        (513.0, 386.0),
        (511.0, 384.0),
        (512.0, 383.0),
        (514.0, 383.0),
        (512.0, 384.0),
        (513.0, 385.0),
        (511.0, 386.0),
        (513.0, 384.0),
        (514.0, 385.0),
        (512.0, 384.0),
    ];

    #[test]
    fn test_fixation_saccade_scenario_at_60hz() {
        let geometry = ScreenGeometry::default();
        let target = Point::new(512.0, 384.0);

        // Calibrate on the same jitter pattern
        let mut calibration_stream = ScriptedTracker::new(60.0);
        for _ in 0..20 {
            calibration_stream = calibration_stream.then_points(&BOX);
        }
        let calibration_clock = calibration_stream.clock();
        let calibration = run_calibration(
            &mut calibration_stream,
            &calibration_clock,
            target,
            &geometry,
            &NoiseSettings {
                settle_ms: 0.0,
                ..NoiseSettings::default()
            },
            &DetectionConstants::default(),
            &WaitLimit::unbounded(),
        )
        .unwrap();
        let detector = EventDetector::new(calibration.thresholds);

        let mut tracker = ScriptedTracker::new(60.0)
            .then_points(&BOX)
            .then_points(&[(700.0, 384.0), (702.0, 385.0), (700.0, 384.0), (701.0, 384.0)])
            .then_fixate((701.0, 384.0), 200.0);
        let clock = tracker.clock();
        let limit = WaitLimit::unbounded();

        let fixation = detector
            .wait_for_fixation_start(&mut tracker, &clock, &limit)
            .unwrap()
            .found()
            .unwrap();
        assert!((fixation.time_ms - 100.0).abs() < 17.0, "{}", fixation.time_ms);
        assert_eq!(fixation.position, Some(target));

        let saccade = detector
            .wait_for_saccade_start(&mut tracker, &clock, &limit)
            .unwrap()
            .found()
            .unwrap();
        // Fires on the jump sample, the 13th of the stream
        assert!((saccade.time_ms - 200.0).abs() < 1e-6);
        assert_eq!(saccade.position, Some(target));

        let end = detector
            .track_saccade_end(&saccade, &mut tracker, &clock, &limit)
            .unwrap()
            .found()
            .unwrap();
        let landing = end.end_position.unwrap();
        assert!(landing.distance(&Point::new(700.0, 384.0)) < 3.0);
        assert_eq!(end.position, Some(target));
        assert!(end.time_ms > saccade.time_ms);
    }

    fn test_config(dir: &Path) -> TrackerConfig {
        let mut config = TrackerConfig::default();
        config.logging.data_dir = Some(dir.to_path_buf());
        config.calibration.settle_ms = 20.0;
        config.calibration.min_duration_ms = 100.0;
        config.backend.noise_px = 0.0;
        config.backend.sample_rate_hz = 500.0;
        config
    }

    fn simulated(config: &TrackerConfig) -> (TrackerBackend, MonotonicClock, crate::tracker::SimulatedGaze) {
        let clock = MonotonicClock::start();
        let link = SimulatedLink::new(clock, config.backend.sample_rate_hz, 0.0, Point::new(512.0, 384.0))
            .unwrap();
        let gaze = link.gaze();
        (TrackerBackend::Simulated(link), clock, gaze)
    }

    #[test]
    fn test_events_need_calibration() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let (backend, clock, _gaze) = simulated(&config);
        let mut tracker = EyeTracker::open_with_backend(config, "p01", backend, clock, None).unwrap();

        let result = tracker.wait_for_fixation_start(&WaitLimit::within(&clock, 50.0));
        assert!(matches!(result, Err(SessionError::NotCalibrated)));
        tracker.close().unwrap();
    }

    #[test]
    fn test_simulated_session_end_to_end() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let db = open_in_memory().unwrap();
        let (backend, clock, gaze) = simulated(&config);
        let mut tracker =
            EyeTracker::open_with_backend(config, "p01", backend, clock, Some(db.clone())).unwrap();
        let id = tracker.id();

        let calibration = tracker
            .calibrate(None, &WaitLimit::within(&clock, 5000.0))
            .unwrap();
        assert!(calibration.report.samples_used >= 10);
        assert!(tracker.thresholds().is_some());

        tracker.start_recording().unwrap();
        let fixation = tracker
            .wait_for_fixation_start(&WaitLimit::within(&clock, 2000.0))
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(fixation.position, Some(Point::new(512.0, 384.0)));

        let mover = gaze.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            mover.look_at(800.0, 384.0);
        });
        let saccade = tracker
            .wait_for_saccade_start(&WaitLimit::within(&clock, 2000.0))
            .unwrap()
            .found()
            .unwrap();
        handle.join().unwrap();
        assert_eq!(saccade.position, Some(Point::new(512.0, 384.0)));

        let drift = tracker
            .drift_correction(
                DriftMode::FixationTriggered,
                Some(Point::new(800.0, 384.0)),
                &mut ScriptedInput::silent(),
                &WaitLimit::within(&clock, 2000.0),
            )
            .unwrap();
        assert!(matches!(drift, DriftCheck::Accepted { .. }));
        tracker.stop_recording().unwrap();

        let log_path = tracker.sample_log_path().unwrap().to_path_buf();
        let trace_path = tracker.trace_path().unwrap().to_path_buf();
        let summary = tracker.close().unwrap();
        assert_eq!(summary.status, SessionStatus::Closed);
        assert!(summary.rows_logged > 0);

        let records = read_sample_log(&log_path).unwrap();
        assert_eq!(records.len(), summary.rows_logged);
        let messages: Vec<String> = records
            .iter()
            .filter_map(|r| match r {
                LogRecord::Message { text, .. } => Some(text.clone()),
                LogRecord::Sample(_) => None,
            })
            .collect();
        assert!(messages.iter().any(|m| m == "calibration report start"));
        assert!(messages.iter().any(|m| m.starts_with("FIXATION_START")));
        assert!(messages.iter().any(|m| m.starts_with("SACCADE_START")));
        assert!(records.iter().any(|r| matches!(r, LogRecord::Sample(_))));

        let trace = read_trace_file(&trace_path).unwrap();
        assert!(trace.iter().any(|e| e.kind == TraceKind::Calibration));
        assert!(trace.iter().any(|e| e.kind == TraceKind::Drift));

        let stored = get_session(&db, &id).unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Closed);
        assert_eq!(stored.sample_log_sha256, summary.sample_log_sha256);
        assert_eq!(list_calibrations_for_session(&db, &id).unwrap().len(), 1);
    }

    #[test]
    fn test_disconnect_tears_down_session() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path());
        let db = open_in_memory().unwrap();
        let (backend, clock, gaze) = simulated(&config);
        let mut tracker =
            EyeTracker::open_with_backend(config, "p02", backend, clock, Some(db.clone())).unwrap();
        let id = tracker.id();

        tracker.calibrate(None, &WaitLimit::within(&clock, 5000.0)).unwrap();
        gaze.disconnect();

        let result = tracker.wait_for_blink_start(&WaitLimit::within(&clock, 2000.0));
        assert!(matches!(
            result,
            Err(SessionError::Tracker(TrackerError::Disconnected(_)))
        ));
        assert!(tracker.is_closed());
        assert!(matches!(
            tracker.wait_for_fixation_start(&WaitLimit::unbounded()),
            Err(SessionError::Closed)
        ));

        let stored = get_session(&db, &id).unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Failed);
        assert!(stored.sample_log_sha256.is_some());
    }

    #[test]
    fn test_restore_latest_calibration() {
        let temp_dir = TempDir::new().unwrap();
        let db = open_in_memory().unwrap();

        let config = test_config(temp_dir.path());
        let (backend, clock, _gaze) = simulated(&config);
        let mut first =
            EyeTracker::open_with_backend(config.clone(), "p03", backend, clock, Some(db.clone()))
                .unwrap();
        let calibration = first.calibrate(None, &WaitLimit::within(&clock, 5000.0)).unwrap();
        first.close().unwrap();

        let (backend, clock, _gaze) = simulated(&config);
        let mut second =
            EyeTracker::open_with_backend(config, "p03", backend, clock, Some(db)).unwrap();
        let restored = second.restore_latest_calibration().unwrap().unwrap();
        assert_eq!(restored, calibration.thresholds);
        assert_eq!(second.thresholds(), Some(&calibration.thresholds));
    }

    #[test]
    fn test_failed_calibration_is_recoverable() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = test_config(temp_dir.path());
        config.calibration.max_accuracy_deg = Some(0.5);
        let (backend, clock, gaze) = simulated(&config);
        let mut tracker = EyeTracker::open_with_backend(config, "p04", backend, clock, None).unwrap();

        gaze.look_at(700.0, 384.0);
        let err = tracker
            .calibrate(None, &WaitLimit::within(&clock, 5000.0))
            .unwrap_err();
        assert!(err.is_recoverable());
        assert!(!tracker.is_closed());

        gaze.look_at(512.0, 384.0);
        assert!(tracker.calibrate(None, &WaitLimit::within(&clock, 5000.0)).is_ok());
    }
}
