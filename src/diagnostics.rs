//! Bounded runtime event log, persisted next to the shell's logs so a
//! failed launch can be inspected after the app has exited.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

const MAX_EVENTS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RuntimeEvent {
    pub ts_ms: u64,
    pub level: String,
    pub source: String,
    pub message: String,
}

#[derive(Debug)]
pub struct EventLog {
    path: Option<PathBuf>,
    events: Mutex<Vec<RuntimeEvent>>,
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn trim_to_capacity(events: &mut Vec<RuntimeEvent>) {
    if events.len() > MAX_EVENTS {
        let trim = events.len().saturating_sub(MAX_EVENTS);
        events.drain(0..trim);
    }
}

fn load_events_from_path(path: &Path) -> Vec<RuntimeEvent> {
    let raw = match fs::read_to_string(path) {
        Ok(value) => value,
        Err(_) => return Vec::new(),
    };
    let mut rows = serde_json::from_str::<Vec<RuntimeEvent>>(&raw).unwrap_or_default();
    trim_to_capacity(&mut rows);
    rows
}

fn persist_events(path: &Path, events: &[RuntimeEvent]) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Ok(payload) = serde_json::to_string(events) {
        let _ = fs::write(path, payload);
    }
}

impl EventLog {
    /// Opens the log, carrying over events from a previous run.
    pub fn open(path: Option<PathBuf>) -> Self {
        let events = path
            .as_deref()
            .map(load_events_from_path)
            .unwrap_or_default();
        Self {
            path,
            events: Mutex::new(events),
        }
    }

    pub fn push(&self, level: &str, source: &str, message: impl Into<String>) {
        let event = RuntimeEvent {
            ts_ms: now_ms(),
            level: level.trim().to_lowercase(),
            source: source.trim().to_lowercase(),
            message: message.into(),
        };
        let mut events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event);
        trim_to_capacity(&mut events);
        if let Some(path) = self.path.as_ref() {
            persist_events(path, &events);
        }
    }

    pub fn info(&self, source: &str, message: impl Into<String>) {
        self.push("info", source, message);
    }

    pub fn warn(&self, source: &str, message: impl Into<String>) {
        self.push("warn", source, message);
    }

    pub fn error(&self, source: &str, message: impl Into<String>) {
        self.push("error", source, message);
    }

    pub fn recent(&self, limit: usize) -> Vec<RuntimeEvent> {
        let events = match self.events.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let start = events.len().saturating_sub(limit);
        events[start..].to_vec()
    }
}
