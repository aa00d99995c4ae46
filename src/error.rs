//! Error types for SQLite operations.
//!
//! Every failure keeps the engine's primary result code as an [`ErrorKind`],
//! so callers can tell a retryable `Busy` apart from a fatal `Misuse`.

use rusqlite::ffi;
use std::ffi::{c_int, CStr};
use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Primary SQLite result code of a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `SQLITE_ERROR`: generic error (syntax errors, missing tables, ...).
    Generic,
    /// `SQLITE_BUSY`: the database file is locked by another connection.
    Busy,
    /// `SQLITE_LOCKED`: a table is locked within this connection.
    Locked,
    /// `SQLITE_MISUSE`: the library was used incorrectly.
    Misuse,
    /// `SQLITE_RANGE`: parameter index out of range.
    Range,
    /// `SQLITE_CONSTRAINT`
    Constraint,
    /// `SQLITE_CANTOPEN`
    CantOpen,
    /// Any other primary code.
    Other(i32),
}

impl ErrorKind {
    /// Classify a (possibly extended) engine result code.
    pub fn from_code(code: c_int) -> Self {
        match code & 0xff {
            ffi::SQLITE_ERROR => Self::Generic,
            ffi::SQLITE_BUSY => Self::Busy,
            ffi::SQLITE_LOCKED => Self::Locked,
            ffi::SQLITE_MISUSE => Self::Misuse,
            ffi::SQLITE_RANGE => Self::Range,
            ffi::SQLITE_CONSTRAINT => Self::Constraint,
            ffi::SQLITE_CANTOPEN => Self::CantOpen,
            other => Self::Other(other),
        }
    }

    /// Primary engine code for this kind.
    pub fn code(self) -> i32 {
        match self {
            Self::Generic => ffi::SQLITE_ERROR,
            Self::Busy => ffi::SQLITE_BUSY,
            Self::Locked => ffi::SQLITE_LOCKED,
            Self::Misuse => ffi::SQLITE_MISUSE,
            Self::Range => ffi::SQLITE_RANGE,
            Self::Constraint => ffi::SQLITE_CONSTRAINT,
            Self::CantOpen => ffi::SQLITE_CANTOPEN,
            Self::Other(code) => code,
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Busy | Self::Locked)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(code_description(self.code()))
    }
}

/// Errors reported by [`Connection`](crate::Connection) and
/// [`PreparedStatement`](crate::PreparedStatement).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The database file could not be opened.
    #[error("failed to open database {path}: {message}")]
    Open {
        path: String,
        kind: ErrorKind,
        message: String,
    },

    /// The engine refused to compile the SQL text.
    #[error("failed to prepare `{sql}`: {message}")]
    Prepare {
        sql: String,
        kind: ErrorKind,
        message: String,
    },

    /// The SQL text compiled to nothing (empty or only comments).
    #[error("statement `{sql}` is empty")]
    EmptyStatement { sql: String },

    /// A parameter could not be bound.
    #[error("failed to bind parameter {position}: {message}")]
    Bind {
        position: usize,
        kind: ErrorKind,
        message: String,
    },

    /// Stepping a prepared statement failed.
    #[error("step failed ({kind}): {message}")]
    Step { kind: ErrorKind, message: String },

    /// A direct or bulk statement failed.
    #[error("execution failed ({kind}): {message}")]
    Exec { kind: ErrorKind, message: String },

    /// `execute` hit a result row instead of completing.
    #[error("statement returned a row where completion was expected")]
    UnexpectedRow,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Engine error kind, when the failure came from the engine.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Open { kind, .. }
            | Self::Prepare { kind, .. }
            | Self::Bind { kind, .. }
            | Self::Step { kind, .. }
            | Self::Exec { kind, .. } => Some(*kind),
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => {
                Some(ErrorKind::from_code(err.extended_code))
            }
            _ => None,
        }
    }

    /// Shorthand for `kind().is_some_and(ErrorKind::is_retryable)`.
    pub fn is_busy(&self) -> bool {
        self.kind().is_some_and(ErrorKind::is_retryable)
    }

    /// Split a `rusqlite` failure into kind and message, falling back to the
    /// engine's generic description of the code.
    pub(crate) fn parts(err: rusqlite::Error) -> (ErrorKind, String) {
        match err {
            rusqlite::Error::SqliteFailure(e, msg) => {
                let message = msg.unwrap_or_else(|| code_description(e.extended_code).to_string());
                (ErrorKind::from_code(e.extended_code), message)
            }
            other => (ErrorKind::Misuse, other.to_string()),
        }
    }
}

/// Static English description of a result code, as reported by the engine.
pub(crate) fn code_description(code: c_int) -> &'static str {
    // SAFETY: sqlite3_errstr returns a pointer to a static string
    unsafe {
        let ptr = ffi::sqlite3_errstr(code);
        if ptr.is_null() {
            return "unknown error";
        }
        CStr::from_ptr(ptr).to_str().unwrap_or("unknown error")
    }
}
