// raft-core/src/infrastructure/event_log.rs

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Append-only, line-delimited, timestamped JSON event sink.
///
/// Appends are serialized by a mutex and flushed per record, so events
/// within a cycle land in component-execution order and cross-cycle order
/// follows the file. An IO failure is logged and the handle dropped; the
/// next record retries the open.
pub struct EventLog {
    path: PathBuf,
    file: Mutex<Option<File>>,
}

/// One persisted record, as written to the log.
#[derive(Debug, Serialize)]
pub struct EventRecord {
    pub ts: String,
    pub event: String,
    pub payload: serde_json::Value,
}

impl EventLog {
    /// Create the containing directory if absent; the file itself is
    /// created lazily on first append.
    pub fn new(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            file: Mutex::new(None),
        })
    }

    /// Append one event. Best-effort: failures are logged locally and the
    /// next write retries; callers never see the error.
    pub fn record(&self, event: &str, payload: serde_json::Value) {
        let record = EventRecord {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            event: event.to_string(),
            payload,
        };
        if let Err(e) = self.append(&record) {
            warn!(path = %self.path.display(), error = %e, event, "event log write failed");
        }
    }

    /// Convenience for empty payloads.
    pub fn record_bare(&self, event: &str) {
        self.record(event, json!({}));
    }

    fn append(&self, record: &EventRecord) -> std::io::Result<()> {
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut guard = self.file.lock();
        if guard.is_none() {
            *guard = Some(
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?,
            );
        }
        // The handle is dropped on failure so the next record reopens.
        let result = (|| {
            let file = guard.as_mut().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::Other, "event log not open")
            })?;
            file.write_all(line.as_bytes())?;
            file.write_all(b"\n")?;
            file.flush()
        })();
        if result.is_err() {
            *guard = None;
        }
        result
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
