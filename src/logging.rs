//! Logging infrastructure for the consolidation engine
//!
//! Thin layer over the `log` facade and `env_logger`, providing a
//! configuration struct, one-time initialization (safe to call repeatedly,
//! e.g. from tests) and structured helpers for the engine's log contexts.
//!
//! Log lines describe wallet state (counts, amounts, unit hashes) but must
//! never include signing material; the engine only ever holds an opaque
//! signer handle, so nothing sensitive can reach this layer.

use chrono::Local;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs::OpenOptions;
use std::io::Write as IoWrite;
use std::sync::Once;

/// Log severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// Error conditions
    Error,
    /// Warning conditions
    Warn,
    /// Informational messages
    Info,
    /// Debug-level messages
    Debug,
    /// Trace level (very verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
            LogLevel::Trace => log::Level::Trace,
        }
    }
}

/// Configuration for the logging system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default log level
    pub level: LogLevel,
    /// Path to log file (None for console-only)
    pub log_file: Option<String>,
    /// Whether to include timestamps in log messages
    pub include_timestamps: bool,
    /// Whether to log to console
    pub console_logging: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            log_file: None,
            include_timestamps: true,
            console_logging: true,
        }
    }
}

// Ensure logging is only initialized once
static LOGGING_INIT: Once = Once::new();

/// Initialize the logging system with the given configuration
///
/// Safe to call multiple times - it will only initialize the first time
/// and return Ok for subsequent calls.
pub fn init(config: &LogConfig) -> Result<(), String> {
    let mut result = Ok(());

    let include_timestamps = config.include_timestamps;
    let log_file = config.log_file.clone();
    let level = config.level;

    LOGGING_INIT.call_once(|| {
        let mut builder = env_logger::Builder::new();
        builder.filter_level(level.into());

        builder.format(move |buf, record| {
            if include_timestamps {
                write!(buf, "{} ", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))?;
            }
            writeln!(buf, "[{}] {}", record.level(), record.args())
        });

        if let Some(file_path) = &log_file {
            match OpenOptions::new().create(true).append(true).open(file_path) {
                Ok(file) => {
                    builder.target(env_logger::Target::Pipe(Box::new(file)));
                }
                Err(_) => {
                    result = Err(format!("Failed to open log file: {}", file_path));
                    return;
                }
            }
        }

        if let Err(e) = builder.try_init() {
            // Already-initialized is fine; tests init logging repeatedly.
            if !e.to_string().contains("already initialized") {
                result = Err(e.to_string());
            }
        }
    });

    result
}

/// Update the log level dynamically
pub fn set_log_level(level: LogLevel) {
    log::set_max_level(level.into());
}

fn log_with_context(context: &str, level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    let payload = match params {
        Some(params) => json!({ "context": context, "message": message, "params": params }),
        None => json!({ "context": context, "message": message }),
    };
    log::log!(level.into(), "{}", payload);
}

/// Log an engine-context event (selection, augmentation, assembly)
pub fn log_engine(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    log_with_context("engine", level, message, params);
}

/// Log a scheduler-context event (ticks, arming, shutdown)
pub fn log_scheduler(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    log_with_context("scheduler", level, message, params);
}

/// Log a ledger-context event (queries, composition, broadcast)
pub fn log_ledger(level: LogLevel, message: &str, params: Option<serde_json::Value>) {
    log_with_context("ledger", level, message, params);
}

/// Build a structured parameter object from key/value pairs
pub fn log_params(params: Vec<(&str, String)>) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for (key, value) in params {
        map.insert(key.to_string(), json!(value));
    }
    serde_json::Value::Object(map)
}
