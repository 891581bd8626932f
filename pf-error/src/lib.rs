//! Unified error handling for pifan
//!
//! This crate provides the single error type used across all pifan crates.
//! Every variant belongs to one [`ErrorKind`], which decides whether the
//! control loop can carry on and which exit code the daemon reports.

use std::io;
use std::path::PathBuf;

/// Result type alias using PifanError
pub type Result<T> = std::result::Result<T, PifanError>;

/// Coarse failure classes, used for the single fatal log line and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or unparsable configuration (fatal at startup)
    Configuration,
    /// Actuation backend unreachable (fatal at startup)
    Connection,
    /// Temperature sensor could not be read (recoverable)
    SensorRead,
    /// Commanded duty could not be applied (fatal while running)
    Actuation,
    /// Anything else that bubbled up from the OS
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Connection => "connection",
            ErrorKind::SensorRead => "sensor read",
            ErrorKind::Actuation => "actuation",
            ErrorKind::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified error type for all pifan operations
#[derive(thiserror::Error, Debug)]
pub enum PifanError {
    // ============================================================================
    // I/O and File System Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: io::Error,
    },

    #[error("File too large: {path} ({size} bytes, max {max_size} bytes)")]
    FileTooLarge {
        path: PathBuf,
        size: u64,
        max_size: u64,
    },

    // ============================================================================
    // Configuration Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        field: String,
        reason: String,
    },

    // ============================================================================
    // Hardware Access Errors
    // ============================================================================
    #[error("Failed to read temperature from {path}: {reason}")]
    TemperatureRead {
        path: PathBuf,
        reason: String,
    },

    #[error("Cannot connect to {backend}: {reason}")]
    Connection {
        backend: String,
        reason: String,
    },

    #[error("Failed to set duty {percent:.1}% on GPIO {pin}: {reason}")]
    Actuation {
        pin: u32,
        percent: f64,
        reason: String,
    },
}

impl PifanError {
    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid configuration value error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a temperature read error
    pub fn temperature_read(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::TemperatureRead {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a backend connection error
    pub fn connection(backend: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            backend: backend.into(),
            reason: reason.into(),
        }
    }

    /// Create an actuation error
    pub fn actuation(pin: u32, percent: f64, reason: impl Into<String>) -> Self {
        Self::Actuation {
            pin,
            percent,
            reason: reason.into(),
        }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            PifanError::Config(_)
            | PifanError::JsonParse(_)
            | PifanError::InvalidConfig { .. }
            | PifanError::FileRead { .. }
            | PifanError::FileTooLarge { .. } => ErrorKind::Configuration,
            PifanError::Connection { .. } => ErrorKind::Connection,
            PifanError::TemperatureRead { .. } => ErrorKind::SensorRead,
            PifanError::Actuation { .. } => ErrorKind::Actuation,
            PifanError::Io(_) => ErrorKind::Io,
        }
    }

    /// Process exit code for a fatal error of this kind
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::Io => 1,
            ErrorKind::Configuration => 2,
            ErrorKind::Connection => 3,
            ErrorKind::Actuation => 4,
            ErrorKind::SensorRead => 5,
        }
    }
}
