//! C8: structured logger (§4.8).
//!
//! Distinct from the ambient `tracing` setup in [`crate::init_tracing`]:
//! this is a component the caller can configure per-mailer (level,
//! format, destination, masked fields) independent of process-wide
//! tracing.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{LogFormat, LoggingConfig};

const MASKED_KEYS: [&str; 4] = ["password", "auth", "token", "key"];
const MASK_PLACEHOLDER: &str = "********";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl From<crate::config::LogLevel> for LogLevel {
    fn from(value: crate::config::LogLevel) -> Self {
        match value {
            crate::config::LogLevel::Debug => LogLevel::Debug,
            crate::config::LogLevel::Info => LogLevel::Info,
            crate::config::LogLevel::Warn => LogLevel::Warn,
            crate::config::LogLevel::Error => LogLevel::Error,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct LogEntry<'a> {
    timestamp: chrono::DateTime<Utc>,
    level: LogLevel,
    message: &'a str,
    #[serde(flatten)]
    fields: BTreeMap<String, Value>,
}

/// Masks values whose key case-insensitively matches one of
/// `password`/`auth`/`token`/`key` (§4.8). Shallow only — does not
/// descend into nested objects for masking.
fn mask_fields(fields: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    fields
        .iter()
        .map(|(key, value)| {
            let masked = MASKED_KEYS.iter().any(|k| key.to_lowercase() == *k);
            if masked {
                (key.clone(), Value::String(MASK_PLACEHOLDER.to_string()))
            } else {
                (key.clone(), value.clone())
            }
        })
        .collect()
}

struct Destination {
    path: String,
    /// Set to `false` after the first write failure so we warn only once
    /// (§4.8: "fails silently after an initial warning").
    writable: Mutex<bool>,
}

/// The C8 logger: level-gated, format-selectable, field-masking,
/// optionally file-backed.
pub struct StructuredLogger {
    level: LogLevel,
    format: LogFormat,
    custom_fields: Vec<String>,
    destination: Option<Destination>,
}

impl StructuredLogger {
    pub fn new(config: &LoggingConfig) -> Self {
        let destination = config.destination.as_ref().map(|path| Destination {
            path: path.clone(),
            writable: Mutex::new(true),
        });
        Self {
            level: config.level.into(),
            format: config.format,
            custom_fields: config.custom_fields.clone(),
            destination,
        }
    }

    /// Whether a message at `level` passes the configured floor. Uses
    /// floor semantics (`level >= configured`): a logger configured at
    /// `warn` also emits `error`, since a filter that admits only one
    /// exact severity is almost never what a caller setting it wants.
    /// (see DESIGN.md for the rationale behind this choice).
    fn enabled(&self, level: LogLevel) -> bool {
        level >= self.level
    }

    fn emit(&self, level: LogLevel, message: &str, fields: BTreeMap<String, Value>) {
        if !self.enabled(level) {
            return;
        }
        let masked = mask_fields(&fields);
        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message,
            fields: masked,
        };

        let rendered = match self.format {
            LogFormat::Json => serde_json::to_string(&entry).unwrap_or_default(),
            LogFormat::Text => {
                let extra: Vec<String> = entry
                    .fields
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect();
                if extra.is_empty() {
                    format!("[{:?}] {}", entry.level, entry.message)
                } else {
                    format!("[{:?}] {} {}", entry.level, entry.message, extra.join(" "))
                }
            }
        };

        match level {
            LogLevel::Error => tracing::error!(target: "smtp_mailer::structured", "{rendered}"),
            LogLevel::Warn => tracing::warn!(target: "smtp_mailer::structured", "{rendered}"),
            LogLevel::Info => tracing::info!(target: "smtp_mailer::structured", "{rendered}"),
            LogLevel::Debug => tracing::debug!(target: "smtp_mailer::structured", "{rendered}"),
        }

        if let Some(destination) = &self.destination {
            let mut writable = destination.writable.lock().unwrap();
            if !*writable {
                return;
            }
            let result = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&destination.path)
                .and_then(|mut file| writeln!(file, "{rendered}"));
            if result.is_err() {
                tracing::warn!(
                    path = %destination.path,
                    "structured log destination is not writable; further writes to it are suppressed"
                );
                *writable = false;
            }
        }
    }

    fn build_fields(&self, extra: &[(&str, Value)]) -> BTreeMap<String, Value> {
        let mut fields = BTreeMap::new();
        for (key, value) in extra {
            fields.insert((*key).to_string(), value.clone());
        }
        for field in &self.custom_fields {
            fields.entry(field.clone()).or_insert(Value::Null);
        }
        fields
    }

    pub fn debug(&self, message: &str, extra: &[(&str, Value)]) {
        self.emit(LogLevel::Debug, message, self.build_fields(extra));
    }

    pub fn info(&self, message: &str, extra: &[(&str, Value)]) {
        self.emit(LogLevel::Info, message, self.build_fields(extra));
    }

    pub fn warn(&self, message: &str, extra: &[(&str, Value)]) {
        self.emit(LogLevel::Warn, message, self.build_fields(extra));
    }

    pub fn error(&self, message: &str, extra: &[(&str, Value)]) {
        self.emit(LogLevel::Error, message, self.build_fields(extra));
    }
}
