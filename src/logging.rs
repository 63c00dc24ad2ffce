//! Tracing setup and the in-memory log buffer served to the admin console.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Local;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DATE_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

/// Initialize the tracing subscriber with environment overrides and an
/// `info` default.
pub fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Severity tags used by the admin log buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }

    /// Console flag (`--info`, `--warn`, `--error`) to level.
    pub fn parse_flag(flag: &str) -> Option<Self> {
        match flag {
            "--info" => Some(LogLevel::Info),
            "--warn" => Some(LogLevel::Warn),
            "--error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// One buffered log line.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    message: String,
    source: String,
    time_stamp: String,
}

impl LogRecord {
    fn new(source: &str, message: String) -> Self {
        Self {
            message,
            source: source.to_string(),
            time_stamp: Local::now().format(DATE_TIME_FORMAT).to_string(),
        }
    }
}

/// Mirror of every server log line, grouped by level, so the console can
/// print or persist them after the fact. Emission to tracing happens in
/// the same call.
#[derive(Debug, Default)]
pub struct LogStore {
    records: Mutex<HashMap<LogLevel, Vec<LogRecord>>>,
}

impl LogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn info(&self, source: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(target: "filedepot", source, "{message}");
        self.record(LogLevel::Info, source, message);
    }

    pub fn warn(&self, source: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: "filedepot", source, "{message}");
        self.record(LogLevel::Warn, source, message);
    }

    pub fn error(&self, source: &str, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(target: "filedepot", source, "{message}");
        self.record(LogLevel::Error, source, message);
    }

    fn record(&self, level: LogLevel, source: &str, message: String) {
        let mut records = self.records.lock().expect("log store poisoned");
        records
            .entry(level)
            .or_default()
            .push(LogRecord::new(source, message));
    }

    /// Pretty JSON dump of one level's records.
    pub fn by_level(&self, level: LogLevel) -> String {
        let records = self.records.lock().expect("log store poisoned");
        match records.get(&level) {
            Some(list) if !list.is_empty() => {
                serde_json::to_string_pretty(list).unwrap_or_else(|_| String::from("[]"))
            }
            _ => format!("No '{}' logs registered.", level.label()),
        }
    }

    /// Pretty JSON dump of every record, keyed by level label.
    pub fn all(&self) -> String {
        let records = self.records.lock().expect("log store poisoned");
        if records.is_empty() {
            return String::from("No logs created.");
        }
        let mut grouped: HashMap<&str, &Vec<LogRecord>> = HashMap::new();
        for (level, list) in records.iter() {
            grouped.insert(level.label(), list);
        }
        serde_json::to_string_pretty(&grouped).unwrap_or_else(|_| String::from("{}"))
    }
}
