// Session tracing
// Append-only JSONL trace of events, calibrations and drift checks

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::Logger;
use crate::events::types::GazeEvent;

/// Errors that can occur during trace operations
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// What a trace entry records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Event,
    Calibration,
    Drift,
    Message,
    Session,
}

/// A single entry in the session trace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    /// ISO 8601 timestamp of when this entry was created
    pub timestamp: String,

    pub kind: TraceKind,

    /// Human-readable summary
    pub message: String,

    /// Optional structured payload (event, report, drift outcome)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl TraceEntry {
    /// Create a new trace entry with current timestamp
    pub fn new(kind: TraceKind, message: String) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            kind,
            message,
            data: None,
        }
    }

    /// Create a trace entry with structured data
    pub fn with_data(kind: TraceKind, message: String, data: serde_json::Value) -> Self {
        TraceEntry {
            timestamp: Utc::now().to_rfc3339(),
            kind,
            message,
            data: Some(data),
        }
    }

    /// Serialize to JSON line (with newline)
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_string(self)?;
        Ok(format!("{}\n", json))
    }
}

/// Session trace writer
/// Manages append-only JSONL trace file
#[derive(Debug, Clone)]
pub struct TraceWriter {
    file_path: PathBuf,
}

impl TraceWriter {
    pub fn new(file_path: PathBuf) -> Self {
        TraceWriter { file_path }
    }

    /// Append a trace entry to the file
    /// Creates file if it doesn't exist
    pub fn write(&self, entry: &TraceEntry) -> Result<(), TraceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)?;

        let json_line = entry.to_json_line()?;
        file.write_all(json_line.as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Write without failing the caller; errors are only logged
    pub fn record(&self, entry: TraceEntry) {
        if let Err(e) = self.write(&entry) {
            log::warn!("Failed to write trace {}: {}", self.file_path.display(), e);
        }
    }

    pub fn path(&self) -> &Path {
        &self.file_path
    }
}

impl Logger for TraceWriter {
    fn message(&self, time_ms: f64, text: &str) {
        self.record(TraceBuilder::kind(TraceKind::Message).with_data(
            text,
            serde_json::json!({ "time_ms": time_ms }),
        ));
    }

    fn event(&self, event: &GazeEvent) {
        let entry = match serde_json::to_value(event) {
            Ok(data) => TraceBuilder::kind(TraceKind::Event).with_data(event.kind.as_str(), data),
            Err(e) => {
                log::warn!("Failed to serialize event for trace: {}", e);
                TraceBuilder::kind(TraceKind::Event).message(event.to_log_line())
            }
        };
        self.record(entry);
    }
}

/// Helper builder for creating trace entries
pub struct TraceBuilder {
    kind: TraceKind,
}

impl TraceBuilder {
    pub fn kind(kind: TraceKind) -> Self {
        TraceBuilder { kind }
    }

    pub fn message(self, message: impl Into<String>) -> TraceEntry {
        TraceEntry::new(self.kind, message.into())
    }

    pub fn with_data(self, message: impl Into<String>, data: serde_json::Value) -> TraceEntry {
        TraceEntry::with_data(self.kind, message.into(), data)
    }
}

/// Read trace entries from a JSONL file
pub fn read_trace_file(path: &Path) -> Result<Vec<TraceEntry>, TraceError> {
    let contents = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in contents.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let entry: TraceEntry = serde_json::from_str(line)?;
        entries.push(entry);
    }

    Ok(entries)
}
