use crate::config::MonitorConfig;
use crate::errors::MonitorError;
use crate::log_retention::rotate_for_append;
use serde::Serialize;
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;
pub const DEFAULT_JOURNAL_BUDGET_BYTES: u64 = 50 * 1024 * 1024;
const ELLIPSIS: &str = "...";

/// Installs the stderr diagnostics subscriber. `RUST_LOG` wins over the
/// default `warn` filter. Safe to call more than once.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEvent<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub payload: Value,
}

/// Append-only JSONL record of monitor events. A journal without a path
/// drops everything. The live file plus one rotated generation stay within
/// `budget_bytes`.
#[derive(Debug, Clone)]
pub struct EventJournal {
    pub path: Option<PathBuf>,
    pub max_payload_bytes: usize,
    pub budget_bytes: u64,
}

impl EventJournal {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            ..Self::disabled()
        }
    }

    pub fn disabled() -> Self {
        Self {
            path: None,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            budget_bytes: DEFAULT_JOURNAL_BUDGET_BYTES,
        }
    }

    pub fn from_config(cfg: &MonitorConfig) -> Self {
        let journal = match &cfg.event_log {
            Some(path) => Self::new(path),
            None => Self::disabled(),
        };
        Self {
            budget_bytes: cfg.event_log_budget_bytes,
            ..journal
        }
    }

    fn render(&self, event: &LogEvent<'_>) -> Result<String, MonitorError> {
        let mut line = serde_json::to_string(&LogEvent {
            level: event.level,
            event_type: event.event_type,
            payload: truncate_json(event.payload.clone(), self.max_payload_bytes),
        })
        .map_err(|e| MonitorError::Io(e.to_string()))?;
        line.push('\n');
        Ok(line)
    }

    pub fn append(&self, event: &LogEvent<'_>) -> Result<(), MonitorError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let line = self.render(event)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| MonitorError::Io(e.to_string()))?;
        }
        rotate_for_append(path, line.len() as u64, self.budget_bytes)?;

        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|e| MonitorError::Io(e.to_string()))
    }

    /// Journal writes never stop the monitor; failures go to diagnostics.
    pub fn record(&self, level: &str, event_type: &str, payload: Value) {
        let event = LogEvent {
            level,
            event_type,
            payload,
        };
        if let Err(error) = self.append(&event) {
            tracing::warn!(%error, event_type, "failed to append journal event");
        }
    }
}

pub fn structured_fallback_line(phase: &str, message: &str) -> String {
    format!("phase={phase} message={}", message.replace('\n', "\\n"))
}

/// Oversized payloads become a string of at most `max_bytes` bytes, ending in
/// as much of the ellipsis as fits.
fn truncate_json(value: Value, max_bytes: usize) -> Value {
    let rendered = serde_json::to_string(&value).unwrap_or_default();
    if rendered.len() <= max_bytes {
        return value;
    }
    let marker = &ELLIPSIS[..max_bytes.min(ELLIPSIS.len())];
    let mut cut = max_bytes - marker.len();
    while !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    Value::String(format!("{}{marker}", &rendered[..cut]))
}
