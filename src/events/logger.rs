//! Telemetry session logger - persists forwarded events to JSONL files
//!
//! Subscribes to the event bus and writes one session file per vehicle
//! connection: a `connected` event opens a new timestamped file, every
//! forwarded event during the session is appended as a JSON line, and
//! `disconnected` closes the file.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};

use super::bus::EventBus;
use super::types::{EVENT_CONNECTED, EVENT_DISCONNECTED, LogEntry, TelemetryEvent};

/// Writes telemetry events to per-session JSONL files
pub struct TelemetryLogger {
    /// Directory holding session files
    log_dir: PathBuf,
    /// Writer for the current session, if a vehicle is connected
    writer: Option<BufWriter<File>>,
    /// Sessions opened so far, part of the file name to keep it unique
    session_seq: u64,
}

impl TelemetryLogger {
    /// Create a logger writing sessions under the given directory
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        let log_dir = log_dir.as_ref().to_path_buf();
        debug!(?log_dir, "TelemetryLogger::new: creating logger");
        Self {
            log_dir,
            writer: None,
            session_seq: 0,
        }
    }

    /// Handle one forwarded event
    ///
    /// Events outside a session (before `connected`, after `disconnected`)
    /// are dropped; the bus still delivers them to other subscribers.
    pub fn handle_event(&mut self, event: &TelemetryEvent) -> eyre::Result<()> {
        if event.name == EVENT_CONNECTED {
            self.open_session()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            let entry = LogEntry::new(event.clone());
            let json = serde_json::to_string(&entry)?;
            writeln!(writer, "{}", json)?;
            writer.flush()?;
        }

        if event.name == EVENT_DISCONNECTED {
            self.close_session();
        }

        Ok(())
    }

    /// Open a new session file, replacing any still-open one
    fn open_session(&mut self) -> eyre::Result<()> {
        self.close_session();

        fs::create_dir_all(&self.log_dir)?;
        self.session_seq += 1;
        let name = format!(
            "session-{}-{:03}.jsonl",
            Utc::now().format("%Y%m%d-%H%M%S"),
            self.session_seq
        );
        let path = self.log_dir.join(name);
        debug!(?path, "TelemetryLogger: opening session file");

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    /// Flush and close the current session file
    fn close_session(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            debug!("TelemetryLogger: closing session file");
            let _ = writer.flush();
        }
    }

    /// Whether a session file is currently open
    pub fn session_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Run the logger, consuming events from the bus until shutdown
    ///
    /// Meant to be spawned as a background task.
    pub async fn run(mut self, bus: Arc<EventBus>) {
        debug!("TelemetryLogger::run: starting");
        let mut rx = bus.subscribe();
        // Hold only the receiver so the channel can close on shutdown
        drop(bus);

        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Err(e) = self.handle_event(&event) {
                        error!(name = %event.name, error = %e, "TelemetryLogger: failed to write event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(missed = n, "TelemetryLogger: lagged behind, missed events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("TelemetryLogger: channel closed, shutting down");
                    break;
                }
            }
        }

        self.close_session();
    }
}

/// Read back every entry of every session file in a directory, oldest first
pub fn read_session_entries(log_dir: impl AsRef<Path>) -> eyre::Result<Vec<LogEntry>> {
    let log_dir = log_dir.as_ref();
    if !log_dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(log_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    paths.sort();

    let mut entries = Vec::new();
    for path in paths {
        let content = fs::read_to_string(&path)?;
        for line in content.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => warn!(line, error = %e, "read_session_entries: failed to parse line"),
            }
        }
    }

    debug!(count = entries.len(), "read_session_entries: loaded entries");
    Ok(entries)
}
