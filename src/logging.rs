/// Structured logging for the heat flux service
///
/// Provides context-rich logging with data-source and station identifiers,
/// timestamps, and severity levels. Supports both console output
/// and file-based logging for batch runs.

use chrono::Utc;
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::str::FromStr;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Data Source Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    /// Iowa Environmental Mesonet ASOS archive
    Iem,
    /// Elevation lookup service
    Elevation,
    /// Clear-sky irradiance provider
    Solar,
    Normalizer,
    Engine,
    System,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Iem => write!(f, "IEM"),
            DataSource::Elevation => write!(f, "ELEV"),
            DataSource::Solar => write!(f, "SOLAR"),
            DataSource::Normalizer => write!(f, "NORM"),
            DataSource::Engine => write!(f, "FLUX"),
            DataSource::System => write!(f, "SYS"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureType {
    /// Expected failure - the service answered but has nothing for this request
    Expected,
    /// Unexpected failure - transport error, server error or changed response format
    Unexpected,
    /// Unknown - cannot determine if this is expected or not
    Unknown,
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureType::Expected => write!(f, "EXPECTED"),
            FailureType::Unexpected => write!(f, "UNEXPECTED"),
            FailureType::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

// ---------------------------------------------------------------------------
// Logger Configuration
// ---------------------------------------------------------------------------

/// Global logger instance
static LOGGER: Mutex<Option<Logger>> = Mutex::new(None);

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<String>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    /// Initialize the global logger
    pub fn init(min_level: LogLevel, log_file: Option<String>, console_timestamps: bool) {
        let logger = Logger {
            min_level,
            log_file,
            console_timestamps,
        };

        if let Ok(mut slot) = LOGGER.lock() {
            *slot = Some(logger);
        }
    }

    fn format_entry(level: LogLevel, source: &DataSource, station: Option<&str>, message: &str) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let station_part = station.map(|s| format!(" [{}]", s)).unwrap_or_default();
        format!("{} {} {}{}: {}", timestamp, level, source, station_part, message)
    }

    fn log(&self, level: LogLevel, source: &DataSource, station: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let log_entry = Self::format_entry(level, source, station, message);
        let station_part = station.map(|s| format!(" [{}]", s)).unwrap_or_default();

        // Console output goes to stderr; stdout carries the energy table
        if self.console_timestamps {
            match level {
                LogLevel::Error => eprintln!("{}", log_entry),
                LogLevel::Warning => eprintln!("   {}", log_entry),
                LogLevel::Info => eprintln!("   {}", log_entry),
                LogLevel::Debug => eprintln!("   {}", log_entry),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", source, station_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", source, station_part, message),
                LogLevel::Info => eprintln!("   {}", message),
                LogLevel::Debug => eprintln!("   [DEBUG] {}{}: {}", source, station_part, message),
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path, e);
            }
        }
    }

    fn append_to_file(path: &str, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public Logging Functions
// ---------------------------------------------------------------------------

/// Initialize the global logger
pub fn init_logger(min_level: LogLevel, log_file: Option<&str>, console_timestamps: bool) {
    Logger::init(min_level, log_file.map(String::from), console_timestamps);
}

fn dispatch(level: LogLevel, source: DataSource, station: Option<&str>, message: &str) {
    if let Ok(guard) = LOGGER.lock() {
        if let Some(logger) = guard.as_ref() {
            logger.log(level, &source, station, message);
        }
    }
}

/// Log a general informational message
pub fn info(source: DataSource, station: Option<&str>, message: &str) {
    dispatch(LogLevel::Info, source, station, message);
}

/// Log a warning message
pub fn warn(source: DataSource, station: Option<&str>, message: &str) {
    dispatch(LogLevel::Warning, source, station, message);
}

/// Log an error message
pub fn error(source: DataSource, station: Option<&str>, message: &str) {
    dispatch(LogLevel::Error, source, station, message);
}

/// Log a debug message
pub fn debug(source: DataSource, station: Option<&str>, message: &str) {
    dispatch(LogLevel::Debug, source, station, message);
}

// ---------------------------------------------------------------------------
// Failure Classification Helpers
// ---------------------------------------------------------------------------

/// Classify an external service failure (IEM download, elevation lookup,
/// clear-sky provider) from its error message.
pub fn classify_service_failure(error_message: &str) -> FailureType {
    // The service answered but had nothing for this location/period
    if error_message.contains("no data") || error_message.contains("no results") {
        FailureType::Expected
    }
    // Transport problems and server errors indicate service degradation
    else if error_message.contains("HTTP") || error_message.contains("timed out") || error_message.contains("Request failed") {
        FailureType::Unexpected
    }
    // Parse errors suggest an API change
    else if error_message.contains("Parse error") {
        FailureType::Unexpected
    } else {
        FailureType::Unknown
    }
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log an external service failure with automatic classification
pub fn log_service_failure(source: DataSource, station: Option<&str>, operation: &str, err: &dyn std::error::Error) {
    let error_msg = err.to_string();
    let failure_type = classify_service_failure(&error_msg);

    let message = format!("{} failed [{}]: {}", operation, failure_type, error_msg);

    dispatch(failure_log_level(&failure_type), source, station, &message);
}

/// Level for a service failure. Every service failure aborts the run, so
/// even an expected "no data" answer is logged at warning level.
pub fn failure_log_level(failure_type: &FailureType) -> LogLevel {
    match failure_type {
        FailureType::Expected | FailureType::Unknown => LogLevel::Warning,
        FailureType::Unexpected => LogLevel::Error,
    }
}

// ---------------------------------------------------------------------------
// Run Summary Logging
// ---------------------------------------------------------------------------

/// Log a summary of a completed run: how many timesteps went in and how
/// many complete rows came out.
pub fn log_run_summary(station: Option<&str>, total: usize, retained: usize, dropped: usize) {
    let message = format!(
        "Heat flux run complete: {}/{} timesteps retained, {} dropped for missing inputs",
        retained, total, dropped
    );

    if total == 0 || retained == 0 {
        warn(DataSource::Engine, station, &message);
    } else {
        info(DataSource::Engine, station, &message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_ordering() {
        assert!(LogLevel::Debug < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Error);
    }

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("info".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!("WARN".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warning));
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_failure_classification() {
        let result = classify_service_failure("OpenTopoData error: no results for 41.1,-101.3");
        assert_eq!(result, FailureType::Expected);

        let result = classify_service_failure("IEM error: HTTP 500 Internal Server Error");
        assert_eq!(result, FailureType::Unexpected);

        let result = classify_service_failure("OpenTopoData error: Parse error: expected value");
        assert_eq!(result, FailureType::Unexpected);

        let result = classify_service_failure("something odd");
        assert_eq!(result, FailureType::Unknown);
    }

    #[test]
    fn test_entry_includes_source_and_station() {
        let entry = Logger::format_entry(LogLevel::Warning, &DataSource::Normalizer, Some("OGA"), "2 unrecognized sky codes");
        assert!(entry.contains("WARN NORM [OGA]: 2 unrecognized sky codes"), "got: {}", entry);
    }

    #[test]
    fn test_run_aborting_failures_are_never_debug() {
        let outside = classify_service_failure("OpenTopoData error: no data for location (outside dataset)");
        assert_eq!(outside, FailureType::Expected);
        assert_eq!(failure_log_level(&outside), LogLevel::Warning);

        let gap = classify_service_failure("clear-sky error: no data recorded for 2023-01-01T02:00:00+00:00");
        assert_eq!(failure_log_level(&gap), LogLevel::Warning);

        let outage = classify_service_failure("IEM error: HTTP 503 Service Unavailable");
        assert_eq!(failure_log_level(&outage), LogLevel::Error);

        for failure in [FailureType::Expected, FailureType::Unexpected, FailureType::Unknown] {
            assert!(failure_log_level(&failure) >= LogLevel::Warning);
        }
    }
}
