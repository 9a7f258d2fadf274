//! Operation log
//!
//! Every request leaves an audit trail through the [`Logger`] trait. The
//! plain text format writes one timestamped line per event; the JSON format
//! writes one object per line so it can be read back with [`JsonLogger::read_entries`].

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::{LogFormat, Settings};
use crate::protocol_core::{ClientId, Op, Status};

pub trait Logger: Send + Sync {
    fn start(&self, _uid: ClientId, _op: Op, _name: &str) {}
    fn status(&self, _op: Op, _name: &str, _status: Status) {}
    fn transferred(&self, _op: Op, _name: &str, _bytes: u64) {}
    fn warning(&self, _op: Op, _name: &str, _msg: &str) {}
    fn error(&self, _op: Op, _name: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Pick the logger described by `settings`; falls back to [`NoopLogger`]
/// when no log file is configured or it cannot be opened.
pub fn from_settings(settings: &Settings) -> Arc<dyn Logger> {
    let Some(ref path) = settings.log_file else {
        return Arc::new(NoopLogger);
    };
    let opened: Result<Arc<dyn Logger>> = match settings.log_format {
        LogFormat::Text => TextLogger::new(path).map(|l| Arc::new(l) as Arc<dyn Logger>),
        LogFormat::Json => JsonLogger::new(path).map(|l| Arc::new(l) as Arc<dyn Logger>),
    };
    match opened {
        Ok(logger) => logger,
        Err(e) => {
            log::warn!("operation log disabled: {:#}", e);
            Arc::new(NoopLogger)
        }
    }
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            file: Mutex::new(open_append(path.as_ref())?),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn start(&self, uid: ClientId, op: Op, name: &str) {
        self.line(&format!("START uid={} op={} name={}", uid, op, name));
    }
    fn status(&self, op: Op, name: &str, status: Status) {
        self.line(&format!("STATUS op={} name={} status={}", op, name, status));
    }
    fn transferred(&self, op: Op, name: &str, bytes: u64) {
        self.line(&format!("TRANSFER op={op} name={name} bytes={bytes}"));
    }
    fn warning(&self, op: Op, name: &str, msg: &str) {
        self.line(&format!("WARN op={} name={} msg={}", op, name, msg));
    }
    fn error(&self, op: Op, name: &str, msg: &str) {
        self.line(&format!("ERROR op={} name={} msg={}", op, name, msg));
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    Status,
    Transfer,
    Warning,
    Error,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub event: EventKind,
    pub op: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl LogEntry {
    fn new(event: EventKind, op: Op, name: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            event,
            op: op.to_string(),
            name: name.to_string(),
            uid: None,
            status: None,
            bytes: None,
            message: None,
        }
    }
}

/// JSON lines operation log
pub struct JsonLogger {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    fn add_entry(&self, entry: &LogEntry) {
        if let Ok(mut f) = self.file.lock() {
            if let Ok(line) = serde_json::to_string(entry) {
                let _ = writeln!(f, "{}", line);
            }
        }
    }

    pub fn read_entries(&self) -> Result<Vec<LogEntry>> {
        Self::read_entries_from(&self.path)
    }

    pub fn read_entries_from(path: &Path) -> Result<Vec<LogEntry>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(path).context("Failed to open operation log for reading")?;
        let reader = BufReader::new(file);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line)?);
        }
        Ok(entries)
    }
}

impl Logger for JsonLogger {
    fn start(&self, uid: ClientId, op: Op, name: &str) {
        let mut entry = LogEntry::new(EventKind::Start, op, name);
        entry.uid = Some(uid.0);
        self.add_entry(&entry);
    }
    fn status(&self, op: Op, name: &str, status: Status) {
        let mut entry = LogEntry::new(EventKind::Status, op, name);
        entry.status = Some(status.code());
        entry.message = Some(status.label().to_string());
        self.add_entry(&entry);
    }
    fn transferred(&self, op: Op, name: &str, bytes: u64) {
        let mut entry = LogEntry::new(EventKind::Transfer, op, name);
        entry.bytes = Some(bytes);
        self.add_entry(&entry);
    }
    fn warning(&self, op: Op, name: &str, msg: &str) {
        let mut entry = LogEntry::new(EventKind::Warning, op, name);
        entry.message = Some(msg.to_string());
        self.add_entry(&entry);
    }
    fn error(&self, op: Op, name: &str, msg: &str) {
        let mut entry = LogEntry::new(EventKind::Error, op, name);
        entry.message = Some(msg.to_string());
        self.add_entry(&entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_text_logger_writes_lines() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logs/ops.log");
        let logger = TextLogger::new(&path).unwrap();

        logger.start(ClientId(1111), Op::Backup, "a.txt");
        logger.status(Op::Backup, "a.txt", Status::Stored);
        logger.error(Op::Fetch, "b.txt", "boom");

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("START uid=1111 op=backup name=a.txt"));
        assert!(lines[1].contains("status=BACKUP_OR_DEL_FILE_SUC (212)"));
        assert!(lines[2].contains("ERROR op=fetch name=b.txt msg=boom"));
    }

    #[test]
    fn test_json_logger_round_trip() {
        let tmp = TempDir::new().unwrap();
        let logger = JsonLogger::new(tmp.path().join("ops.jsonl")).unwrap();

        logger.start(ClientId(7), Op::Fetch, "x.bin");
        logger.status(Op::Fetch, "x.bin", Status::NotFound);
        logger.transferred(Op::Fetch, "x.bin", 42);

        let entries = logger.read_entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].event, EventKind::Start);
        assert_eq!(entries[0].uid, Some(7));
        assert_eq!(entries[1].status, Some(1001));
        assert_eq!(entries[1].message.as_deref(), Some("FILE_NOT_FOUND"));
        assert_eq!(entries[2].bytes, Some(42));
        assert_eq!(entries[2].op, "fetch");
    }

    #[test]
    fn test_from_settings_without_file_is_noop() {
        // Nothing to assert beyond not touching the filesystem
        let logger = from_settings(&Settings::default());
        logger.start(ClientId(1), Op::List, "");
    }
}
