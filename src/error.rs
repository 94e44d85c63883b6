//! Centralized error handling for the editing core
//! Defines the error taxonomy, severity levels, and a lightweight notification type

use std::fmt;

/// Severity level of an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational message (not really an error)
    Info,
    /// Warning - something might be wrong but operation can continue
    Warning,
    /// Standard error - operation failed but the document is left consistent
    Error,
    /// Critical error - may lead to data loss or require restart
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Category of the error, mirroring the taxonomy in the design document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Allocation/capacity failure in the gap buffer
    Resource,
    /// File not found/readable/writable, rename failure, etc.
    Io,
    /// Invalid argument: bad path, non-UTF8 insert, bad tabwidth/color-column/syntax-horizon
    Argument,
    /// Invalid state: duplicate mark, position from a foreign buffer
    State,
    /// Regex compile/exec failure
    Regex,
    /// External shell command exited non-zero
    Shell,
    /// Anything else
    Other,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resource => write!(f, "Resource"),
            Self::Io => write!(f, "IO"),
            Self::Argument => write!(f, "Argument"),
            Self::State => write!(f, "State"),
            Self::Regex => write!(f, "Regex"),
            Self::Shell => write!(f, "Shell"),
            Self::Other => write!(f, "Other"),
        }
    }
}

/// A structured error produced by the editing core
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditError {
    /// How serious the error is
    pub severity: ErrorSeverity,
    /// What kind of error occurred
    pub kind: ErrorKind,
    /// Machine-readable error code (e.g. "OOM", "INVALID_CURSOR")
    pub code: String,
    /// Human-readable description
    pub message: String,
}

impl EditError {
    /// Create a new standard error (severity: Error)
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ErrorSeverity::Error,
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a new critical error
    pub fn critical(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: ErrorSeverity::Critical,
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resource, "OOM", message)
    }

    pub fn argument(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Argument, code, message)
    }

    pub fn state(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::State, code, message)
    }
}

impl fmt::Display for EditError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}({}): {}",
            self.severity, self.kind, self.code, self.message
        )
    }
}

impl std::error::Error for EditError {}

impl From<std::io::Error> for EditError {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, "IO_ERROR", err.to_string())
    }
}

impl From<String> for EditError {
    fn from(msg: String) -> Self {
        Self::new(ErrorKind::Other, "GENERIC_ERROR", msg)
    }
}

impl From<&str> for EditError {
    fn from(msg: &str) -> Self {
        Self::new(ErrorKind::Other, "GENERIC_ERROR", msg)
    }
}

/// Result alias used throughout the editing core
pub type EditResult<T> = std::result::Result<T, EditError>;

/// Non-fatal, user-visible event raised by an operation that otherwise succeeded
/// (e.g. "Search wrapped"). Distinct from `EditError`: a notification never means
/// the operation failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u64,
    pub severity: ErrorSeverity,
    pub message: String,
}

impl Notification {
    pub fn new(id: u64, severity: ErrorSeverity, message: impl Into<String>) -> Self {
        Self {
            id,
            severity,
            message: message.into(),
        }
    }

    pub fn info(id: u64, message: impl Into<String>) -> Self {
        Self::new(id, ErrorSeverity::Info, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_severity_kind_code_message() {
        let err = EditError::new(ErrorKind::Argument, "BAD_TABWIDTH", "must be 1..=24");
        assert_eq!(
            err.to_string(),
            "[ERROR] Argument(BAD_TABWIDTH): must be 1..=24"
        );
    }

    #[test]
    fn critical_sets_severity() {
        let err = EditError::critical(ErrorKind::Resource, "OOM", "cannot grow gap");
        assert_eq!(err.severity, ErrorSeverity::Critical);
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EditError = io_err.into();
        assert_eq!(err.kind, ErrorKind::Io);
    }
}
