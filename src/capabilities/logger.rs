//! Logger capability.

use std::convert::Infallible;
use std::fmt;
use std::panic::Location;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::Capability;
use crate::adapters::{AdapterInfo, Implements};
use crate::error::CapabilityResult;
use crate::registry::{CapabilityKey, CapabilityRegistry};

// ---------------------------------------------------------------------------
// LogLevel
// ---------------------------------------------------------------------------

/// Severity of a log message. `Off` disables a logger entirely.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    #[default]
    Info = 2,
    Warning = 3,
    Error = 4,
    Critical = 5,
    Off = 6,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Critical => "CRITICAL",
            LogLevel::Off => "OFF",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Trace,
            1 => LogLevel::Debug,
            2 => LogLevel::Info,
            3 => LogLevel::Warning,
            4 => LogLevel::Error,
            5 => LogLevel::Critical,
            _ => LogLevel::Off,
        }
    }

    /// The matching `log` crate level. `Critical` maps to `Error`; `Off`
    /// has no counterpart.
    pub fn to_log_level(self) -> Option<log::Level> {
        match self {
            LogLevel::Trace => Some(log::Level::Trace),
            LogLevel::Debug => Some(log::Level::Debug),
            LogLevel::Info => Some(log::Level::Info),
            LogLevel::Warning => Some(log::Level::Warn),
            LogLevel::Error | LogLevel::Critical => Some(log::Level::Error),
            LogLevel::Off => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive. Unknown names parse as `Info`.
impl FromStr for LogLevel {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_uppercase().as_str() {
            "TRACE" => LogLevel::Trace,
            "DEBUG" => LogLevel::Debug,
            "INFO" => LogLevel::Info,
            "WARNING" | "WARN" => LogLevel::Warning,
            "ERROR" => LogLevel::Error,
            "CRITICAL" | "FATAL" => LogLevel::Critical,
            "OFF" => LogLevel::Off,
            _ => LogLevel::Info,
        })
    }
}

// ---------------------------------------------------------------------------
// LogEntry
// ---------------------------------------------------------------------------

/// A log message together with where and when it was produced.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub file: &'static str,
    pub line: u32,
    pub timestamp: DateTime<Utc>,
}

impl LogEntry {
    /// Entry attributed to the caller.
    #[track_caller]
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            level,
            message: message.into(),
            file: location.file(),
            line: location.line(),
            timestamp: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger
// ---------------------------------------------------------------------------

/// Leveled logging capability.
///
/// Loggers are shared behind `Arc`, so the level is changed through `&self`.
pub trait Logger: AdapterInfo + Send + Sync {
    /// Log `message` at `level`, attributed to the caller.
    #[track_caller]
    fn log(&self, level: LogLevel, message: &str) -> CapabilityResult {
        self.log_entry(&LogEntry::new(level, message))
    }

    fn log_entry(&self, entry: &LogEntry) -> CapabilityResult;

    fn is_enabled(&self, level: LogLevel) -> bool;

    fn set_level(&self, level: LogLevel) -> CapabilityResult;

    fn level(&self) -> LogLevel;

    fn flush(&self) -> CapabilityResult {
        Ok(())
    }
}

impl<T: Logger + 'static> Implements<dyn Logger> for T {
    fn upcast(self: Arc<Self>) -> Arc<dyn Logger> {
        self
    }
}

static NULL_LOGGER: Lazy<Arc<NullLogger>> = Lazy::new(|| Arc::new(NullLogger));

impl Capability for dyn Logger {
    fn null_instance() -> Arc<dyn Logger> {
        NULL_LOGGER.clone()
    }
}

/// Accepts and discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

crate::adapter_info!(plain: NullLogger);

impl Logger for NullLogger {
    fn log_entry(&self, _entry: &LogEntry) -> CapabilityResult {
        Ok(())
    }

    fn is_enabled(&self, _level: LogLevel) -> bool {
        false
    }

    fn set_level(&self, _level: LogLevel) -> CapabilityResult {
        Ok(())
    }

    fn level(&self) -> LogLevel {
        LogLevel::Off
    }
}

/// Forwards to whatever backend is installed behind the `log` facade.
pub struct FacadeLogger {
    target: String,
    threshold: AtomicU8,
}

crate::adapter_info!(plain: FacadeLogger);

impl FacadeLogger {
    pub fn new(target: impl Into<String>) -> Self {
        Self::with_level(target, LogLevel::Info)
    }

    pub fn with_level(target: impl Into<String>, level: LogLevel) -> Self {
        Self {
            target: target.into(),
            threshold: AtomicU8::new(level as u8),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl Logger for FacadeLogger {
    fn log_entry(&self, entry: &LogEntry) -> CapabilityResult {
        if !self.is_enabled(entry.level) {
            return Ok(());
        }
        if let Some(level) = entry.level.to_log_level() {
            log::logger().log(
                &log::Record::builder()
                    .level(level)
                    .target(&self.target)
                    .file(Some(entry.file))
                    .line(Some(entry.line))
                    .args(format_args!("{}", entry.message))
                    .build(),
            );
        }
        Ok(())
    }

    fn is_enabled(&self, level: LogLevel) -> bool {
        level != LogLevel::Off && level >= self.level()
    }

    fn set_level(&self, level: LogLevel) -> CapabilityResult {
        self.threshold.store(level as u8, Ordering::Relaxed);
        Ok(())
    }

    fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.threshold.load(Ordering::Relaxed))
    }

    fn flush(&self) -> CapabilityResult {
        log::logger().flush();
        Ok(())
    }
}

impl fmt::Debug for FacadeLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FacadeLogger")
            .field("target", &self.target)
            .field("level", &self.level())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Process-wide access
// ---------------------------------------------------------------------------

/// The process-wide logger registry.
pub fn logger_registry() -> Arc<CapabilityRegistry<dyn Logger>> {
    CapabilityRegistry::global()
}

/// The default logger, or the no-op stand-in.
pub fn default_logger() -> Arc<dyn Logger> {
    logger_registry().get_default()
}

/// The logger registered as `name`, or the no-op stand-in.
pub fn logger(name: &str) -> Arc<dyn Logger> {
    logger_registry().get(CapabilityKey::named(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{same_instance, AdapterFactory};

    #[test]
    fn test_level_parsing() {
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("WARNING".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("fatal".parse::<LogLevel>().unwrap(), LogLevel::Critical);
        assert_eq!("Off".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert_eq!("verbose".parse::<LogLevel>().unwrap(), LogLevel::Info);
    }

    #[test]
    fn test_level_display_and_order() {
        assert_eq!(LogLevel::Critical.to_string(), "CRITICAL");
        assert!(LogLevel::Trace < LogLevel::Error);
        assert!(LogLevel::Critical < LogLevel::Off);
        assert_eq!(LogLevel::Warning.to_log_level(), Some(log::Level::Warn));
        assert_eq!(LogLevel::Off.to_log_level(), None);
    }

    #[test]
    fn test_level_serde() {
        let json = serde_json::to_string(&LogLevel::Warning).unwrap();
        assert_eq!(json, "\"warning\"");
        let back: LogLevel = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LogLevel::Warning);
    }

    #[test]
    fn test_entry_records_caller() {
        let line = line!() + 1;
        let entry = LogEntry::new(LogLevel::Error, "boom");
        assert!(entry.file.ends_with("logger.rs"));
        assert_eq!(entry.line, line);
        assert_eq!(entry.message, "boom");
    }

    #[test]
    fn test_null_logger_absorbs_everything() {
        let null = <dyn Logger as Capability>::null_instance();
        assert!(null.log(LogLevel::Critical, "dropped").is_ok());
        assert!(null.set_level(LogLevel::Trace).is_ok());
        assert!(!null.is_enabled(LogLevel::Critical));
        assert_eq!(null.level(), LogLevel::Off);
        assert!(null.flush().is_ok());
    }

    #[test]
    fn test_null_instance_is_shared() {
        let a = <dyn Logger as Capability>::null_instance();
        let b = <dyn Logger as Capability>::null_instance();
        assert!(same_instance(&a, &b));
    }

    #[test]
    fn test_facade_logger_threshold() {
        let _ = env_logger::builder().is_test(true).try_init();

        let logger = FacadeLogger::with_level("runtime_binding::test", LogLevel::Warning);
        assert!(!logger.is_enabled(LogLevel::Info));
        assert!(logger.is_enabled(LogLevel::Error));
        assert!(!logger.is_enabled(LogLevel::Off));
        assert!(logger.log(LogLevel::Error, "visible").is_ok());
        assert!(logger.log(LogLevel::Debug, "filtered").is_ok());

        logger.set_level(LogLevel::Trace).unwrap();
        assert_eq!(logger.level(), LogLevel::Trace);
        assert!(logger.is_enabled(LogLevel::Trace));
        assert!(logger.flush().is_ok());
        assert_eq!(logger.target(), "runtime_binding::test");
    }

    #[test]
    fn test_facade_logger_binds_without_wrapper() {
        let facade = Arc::new(FacadeLogger::new("app"));
        let handle = AdapterFactory::create::<dyn Logger, _, _>(Arc::clone(&facade)).unwrap();
        assert!(same_instance(&handle, &facade));
        assert!(!AdapterFactory::is_adapter(&handle));
    }

    #[test]
    fn test_global_logger_lookup_falls_back() {
        let missing = logger("logger-tests-never-registered");
        let registry = logger_registry();
        assert!(registry.is_fallback(&missing));

        let facade: Arc<dyn Logger> = Arc::new(FacadeLogger::new("logger-tests"));
        registry.register("logger-tests-bound", Arc::clone(&facade)).unwrap();
        assert!(same_instance(&logger("logger-tests-bound"), &facade));
        registry.unregister("logger-tests-bound").unwrap();
    }
}
