// Sample log
// Tab-delimited per-eye gaze log written by a dedicated thread

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use thiserror::Error;

use super::Logger;
use crate::events::types::{EyeSample, GazeEvent, Point, RawSample};

/// Column header; every row carries exactly this many fields
pub const HEADER: [&str; 8] = [
    "TIMESTAMP",
    "LEFT_GAZE_X",
    "LEFT_GAZE_Y",
    "LEFT_PUPIL",
    "RIGHT_GAZE_X",
    "RIGHT_GAZE_Y",
    "RIGHT_PUPIL",
    "MESSAGE",
];

pub const DEFAULT_FLUSH_EVERY: usize = 60;

const DELIMITER: char = '\t';

#[derive(Debug, Error)]
pub enum SampleLogError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid sample log header: {0}")]
    InvalidHeader(String),

    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow { line: usize, reason: String },

    #[error("Sample log writer thread panicked")]
    WriterPanicked,
}

/// One parsed row of a sample log
#[derive(Debug, Clone, PartialEq)]
pub enum LogRecord {
    Sample(RawSample),
    Message { time_ms: f64, text: String },
}

#[derive(Debug)]
enum LogRow {
    Sample(RawSample),
    Message { time_ms: f64, text: String },
    Close,
}

/// Cloneable producer side of a sample log
///
/// Sends never block; rows queued after the log was closed are dropped.
#[derive(Debug, Clone)]
pub struct LogQueue {
    sender: Sender<LogRow>,
}

impl LogQueue {
    fn send(&self, row: LogRow) {
        if self.sender.send(row).is_err() {
            log::debug!("Sample log closed, dropping row");
        }
    }

    pub fn sample(&self, sample: RawSample) {
        self.send(LogRow::Sample(sample));
    }
}

impl Logger for LogQueue {
    fn message(&self, time_ms: f64, text: &str) {
        self.send(LogRow::Message {
            time_ms,
            text: text.to_string(),
        });
    }

    fn event(&self, event: &GazeEvent) {
        self.message(event.time_ms, &event.to_log_line());
    }
}

/// Sample log file plus the writer thread draining its queue
pub struct SampleLog {
    path: PathBuf,
    queue: LogQueue,
    writer: Option<JoinHandle<Result<usize, SampleLogError>>>,
}

impl SampleLog {
    /// Create the file, write the header and start the writer thread
    pub fn create(path: impl Into<PathBuf>, flush_every: usize) -> Result<Self, SampleLogError> {
        let path = path.into();
        let mut out = BufWriter::new(File::create(&path)?);
        writeln!(out, "{}", HEADER.join("\t"))?;
        out.flush()?;

        let (sender, receiver) = mpsc::channel();
        let flush_every = flush_every.max(1);
        let writer = thread::spawn(move || run_writer(out, receiver, flush_every));

        log::info!("Opened sample log {}", path.display());

        Ok(SampleLog {
            path,
            queue: LogQueue { sender },
            writer: Some(writer),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Producer handle for other threads
    pub fn queue(&self) -> LogQueue {
        self.queue.clone()
    }

    pub fn sample(&self, sample: RawSample) {
        self.queue.sample(sample);
    }

    /// Drain the queue, flush and stop the writer
    /// Returns the number of rows written below the header
    pub fn close(mut self) -> Result<usize, SampleLogError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<usize, SampleLogError> {
        let Some(writer) = self.writer.take() else {
            return Ok(0);
        };
        self.queue.send(LogRow::Close);
        let rows = writer.join().map_err(|_| SampleLogError::WriterPanicked)??;
        log::info!("Closed sample log {} ({} rows)", self.path.display(), rows);
        Ok(rows)
    }
}

impl Logger for SampleLog {
    fn message(&self, time_ms: f64, text: &str) {
        self.queue.message(time_ms, text);
    }

    fn event(&self, event: &GazeEvent) {
        self.queue.event(event);
    }
}

impl Drop for SampleLog {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Sample log {} not closed cleanly: {}", self.path.display(), e);
        }
    }
}

fn run_writer(
    mut out: BufWriter<File>,
    receiver: Receiver<LogRow>,
    flush_every: usize,
) -> Result<usize, SampleLogError> {
    let mut rows = 0usize;

    // Ends on Close or once every queue handle is gone
    while let Ok(row) = receiver.recv() {
        let line = match row {
            LogRow::Sample(sample) => format_sample(&sample),
            LogRow::Message { time_ms, text } => format_message(time_ms, &text),
            LogRow::Close => break,
        };
        if let Err(e) = writeln!(out, "{}", line) {
            log::error!("Sample log write failed: {}", e);
            return Err(e.into());
        }
        rows += 1;
        if rows % flush_every == 0 {
            out.flush()?;
        }
    }

    out.flush()?;
    Ok(rows)
}

fn format_eye(eye: Option<EyeSample>) -> [String; 3] {
    match eye {
        Some(e) => [
            format!("{:.3}", e.gaze.x),
            format!("{:.3}", e.gaze.y),
            format!("{:.3}", e.pupil_size),
        ],
        None => [String::new(), String::new(), String::new()],
    }
}

fn format_sample(sample: &RawSample) -> String {
    let [lx, ly, lp] = format_eye(sample.left);
    let [rx, ry, rp] = format_eye(sample.right);
    [format!("{:.3}", sample.time_ms), lx, ly, lp, rx, ry, rp, String::new()].join("\t")
}

/// Written in place of an empty message so the row still reads back as a message
pub const EMPTY_MESSAGE: &str = "-";

fn format_message(time_ms: f64, text: &str) -> String {
    let mut clean: String = text
        .chars()
        .map(|c| if c == DELIMITER || c == '\n' || c == '\r' { ' ' } else { c })
        .collect();
    if clean.is_empty() {
        clean.push_str(EMPTY_MESSAGE);
    }
    let mut fields = vec![format!("{:.3}", time_ms)];
    fields.extend(std::iter::repeat(String::new()).take(HEADER.len() - 2));
    fields.push(clean);
    fields.join("\t")
}

fn parse_field(value: &str, line: usize) -> Result<Option<f64>, SampleLogError> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<f64>()
        .map(Some)
        .map_err(|e| SampleLogError::MalformedRow {
            line,
            reason: format!("{:?}: {}", value, e),
        })
}

fn parse_eye(fields: &[&str], line: usize) -> Result<Option<EyeSample>, SampleLogError> {
    let x = parse_field(fields[0], line)?;
    let y = parse_field(fields[1], line)?;
    let pupil = parse_field(fields[2], line)?;
    Ok(match (x, y) {
        (Some(x), Some(y)) => Some(EyeSample {
            gaze: Point::new(x, y),
            pupil_size: pupil.unwrap_or(0.0),
        }),
        _ => None,
    })
}

/// Read a sample log back into rows
pub fn read_sample_log(path: &Path) -> Result<Vec<LogRecord>, SampleLogError> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let header = lines.next().transpose()?.unwrap_or_default();
    if header.split('\t').ne(HEADER.iter().copied()) {
        return Err(SampleLogError::InvalidHeader(header));
    }

    let mut records = Vec::new();
    for (index, line) in lines.enumerate() {
        let line = line?;
        let line_no = index + 2;
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != HEADER.len() {
            return Err(SampleLogError::MalformedRow {
                line: line_no,
                reason: format!("expected {} fields, got {}", HEADER.len(), fields.len()),
            });
        }

        let time_ms = parse_field(fields[0], line_no)?.ok_or_else(|| SampleLogError::MalformedRow {
            line: line_no,
            reason: "missing timestamp".to_string(),
        })?;

        if !fields[7].is_empty() {
            records.push(LogRecord::Message {
                time_ms,
                text: fields[7].to_string(),
            });
            continue;
        }

        records.push(LogRecord::Sample(RawSample {
            time_ms,
            left: parse_eye(&fields[1..4], line_no)?,
            right: parse_eye(&fields[4..7], line_no)?,
        }));
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_rows_match_header_width() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("samples.tsv");

        let log = SampleLog::create(&path, DEFAULT_FLUSH_EVERY).unwrap();
        log.sample(RawSample::binocular(1.0, Point::new(10.0, 20.0), 3.5));
        log.sample(RawSample::missing(2.0));
        log.message(3.0, "trial\t1\nstart");
        log.event(&GazeEvent::blink_start(4.0));
        assert_eq!(log.close().unwrap(), 4);

        let contents = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], HEADER.join("\t"));
        for line in &lines {
            assert_eq!(line.split('\t').count(), HEADER.len(), "row {:?}", line);
        }
        assert!(lines[3].ends_with("trial 1 start"));
    }

    #[test]
    fn test_read_back_samples_and_messages() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("samples.tsv");

        let log = SampleLog::create(&path, 2).unwrap();
        let queue = log.queue();
        let sample = RawSample {
            time_ms: 16.667,
            left: Some(EyeSample {
                gaze: Point::new(512.5, 384.25),
                pupil_size: 4.0,
            }),
            right: None,
        };
        queue.sample(sample);
        queue.message(20.0, "SYNC");
        log.close().unwrap();

        let records = read_sample_log(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], LogRecord::Sample(sample));
        assert_eq!(
            records[1],
            LogRecord::Message {
                time_ms: 20.0,
                text: "SYNC".to_string()
            }
        );
    }

    #[test]
    fn test_empty_message_stays_a_message() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("samples.tsv");

        let log = SampleLog::create(&path, DEFAULT_FLUSH_EVERY).unwrap();
        log.queue().message(5.0, "");
        log.close().unwrap();

        let records = read_sample_log(&path).unwrap();
        assert_eq!(
            records,
            vec![LogRecord::Message {
                time_ms: 5.0,
                text: EMPTY_MESSAGE.to_string()
            }]
        );
    }

    #[test]
    fn test_queue_after_close_is_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("samples.tsv");

        let log = SampleLog::create(&path, DEFAULT_FLUSH_EVERY).unwrap();
        let queue = log.queue();
        log.close().unwrap();

        // Fire-and-forget: must not panic
        queue.message(1.0, "late");
        assert_eq!(read_sample_log(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_bad_header_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("other.tsv");
        fs::write(&path, "a\tb\n").unwrap();

        assert!(matches!(
            read_sample_log(&path),
            Err(SampleLogError::InvalidHeader(_))
        ));
    }

    #[test]
    fn test_short_row_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("short.tsv");
        fs::write(&path, format!("{}\n1.0\t2.0\n", HEADER.join("\t"))).unwrap();

        assert!(matches!(
            read_sample_log(&path),
            Err(SampleLogError::MalformedRow { line: 2, .. })
        ));
    }
}
