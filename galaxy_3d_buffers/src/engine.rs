/// Galaxy3D Engine - global logger and configuration for the buffer engine
///
/// Buffer resources themselves are owned by the worker that drives them; the
/// only process-wide state is the logger, the severity threshold and the
/// configuration snapshot handed to newly created resources. All of it lives in
/// thread-safe static storage guarded by RwLock.

use std::sync::{OnceLock, RwLock};
use std::time::SystemTime;
use crate::config::EngineConfig;
use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};

// ===== INTERNAL STATE =====

/// Global logger (initialized with DefaultLogger)
static LOGGER: OnceLock<RwLock<Box<dyn Logger>>> = OnceLock::new();

/// Entries below this severity are dropped before reaching the logger
static MIN_SEVERITY: OnceLock<RwLock<LogSeverity>> = OnceLock::new();

/// Configuration handed to newly created buffers
static CONFIG: OnceLock<RwLock<EngineConfig>> = OnceLock::new();

fn logger_lock() -> &'static RwLock<Box<dyn Logger>> {
    LOGGER.get_or_init(|| RwLock::new(Box::new(DefaultLogger)))
}

fn min_severity_lock() -> &'static RwLock<LogSeverity> {
    MIN_SEVERITY.get_or_init(|| RwLock::new(LogSeverity::Info))
}

fn config_lock() -> &'static RwLock<EngineConfig> {
    CONFIG.get_or_init(|| RwLock::new(EngineConfig::default()))
}

// ===== PUBLIC API =====

/// Engine-wide services (logging and configuration)
///
/// # Example
///
/// ```no_run
/// use galaxy_3d_buffers::galaxy3d::{Engine, EngineConfig, log::LogSeverity};
///
/// Engine::set_min_severity(LogSeverity::Warn);
/// Engine::set_config(EngineConfig {
///     streaming_min_size: 64 * 1024,
///     ..EngineConfig::default()
/// });
/// ```
pub struct Engine;

impl Engine {
    // ===== CONFIGURATION API =====

    /// Replace the configuration used by buffers created from now on
    pub fn set_config(config: EngineConfig) {
        if let Ok(mut lock) = config_lock().write() {
            *lock = config;
        }
    }

    /// Snapshot of the current configuration
    pub fn config() -> EngineConfig {
        config_lock()
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Restore the default configuration
    pub fn reset_config() {
        Self::set_config(EngineConfig::default());
    }

    // ===== LOGGING API =====

    /// Set a custom logger
    ///
    /// # Example
    ///
    /// ```no_run
    /// use galaxy_3d_buffers::galaxy3d::{Engine, log::{Logger, LogEntry}};
    ///
    /// struct FileLogger;
    /// impl Logger for FileLogger {
    ///     fn log(&self, entry: &LogEntry) {
    ///         // Write to file...
    ///     }
    /// }
    ///
    /// Engine::set_logger(FileLogger);
    /// ```
    pub fn set_logger<L: Logger + 'static>(logger: L) {
        if let Ok(mut lock) = logger_lock().write() {
            *lock = Box::new(logger);
        }
    }

    /// Reset logger to default (DefaultLogger)
    pub fn reset_logger() {
        if let Ok(mut lock) = logger_lock().write() {
            *lock = Box::new(DefaultLogger);
        }
    }

    /// Drop every entry below `severity`
    pub fn set_min_severity(severity: LogSeverity) {
        if let Ok(mut lock) = min_severity_lock().write() {
            *lock = severity;
        }
    }

    /// Current severity threshold
    pub fn min_severity() -> LogSeverity {
        min_severity_lock()
            .read()
            .map(|s| *s)
            .unwrap_or(LogSeverity::Info)
    }

    /// Internal logging method (for simple logs without file:line)
    ///
    /// Used by macros like engine_info!, engine_warn!, etc.
    pub fn log(severity: LogSeverity, source: &str, message: String) {
        Self::dispatch(severity, source, message, None, None);
    }

    /// Internal logging method with file:line information (for ERROR logs)
    pub fn log_detailed(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: &'static str,
        line: u32,
    ) {
        Self::dispatch(severity, source, message, Some(file), Some(line));
    }

    fn dispatch(
        severity: LogSeverity,
        source: &str,
        message: String,
        file: Option<&'static str>,
        line: Option<u32>,
    ) {
        if severity < Self::min_severity() {
            return;
        }
        if let Ok(lock) = logger_lock().read() {
            lock.log(&LogEntry {
                severity,
                timestamp: SystemTime::now(),
                source: source.to_string(),
                message,
                file,
                line,
            });
        }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
