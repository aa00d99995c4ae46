//! Prepared statements: bind, step, fetch, reset.
//!
//! A [`PreparedStatement`] owns one compiled statement handle and borrows the
//! [`Connection`] that compiled it, so it can never outlive that connection.
//! Parameter positions are 0-indexed on this API and shifted to SQLite's
//! 1-indexed convention internally. Column positions are 0-indexed on both
//! sides.

// FFI requires matching C integer types exactly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

use crate::connection::Connection;
use crate::error::{Error, ErrorKind, Result};
use crate::value::{DataType, Value};
use rusqlite::ffi;
use std::ffi::{c_int, CStr};
use std::ptr::{self, NonNull};
use tracing::{debug, trace, warn};

/// Where a statement is in its bind → step → reset cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementState {
    /// Freshly compiled or reset; parameters may be (re)bound.
    Ready,
    /// Positioned on a result row; column accessors are meaningful.
    Row,
    /// The last step failed with busy/error/misuse and the statement was not
    /// reset. Call [`PreparedStatement::restart_select`] before reusing it.
    Interrupted,
}

/// One compiled SQL statement.
pub struct PreparedStatement<'conn> {
    conn: &'conn Connection,
    stmt: NonNull<ffi::sqlite3_stmt>,
    state: StatementState,
}

impl<'conn> PreparedStatement<'conn> {
    /// Compile the first statement of `sql`.
    pub(crate) fn new(conn: &'conn Connection, sql: &str) -> Result<Self> {
        let (stmt, _tail) = Self::compile(conn, sql)?;
        stmt.ok_or_else(|| Error::EmptyStatement {
            sql: sql.to_string(),
        })
    }

    /// Compile the first statement of `sql` and return it with the
    /// uncompiled remainder. The statement is `None` when the leading text
    /// holds no SQL (whitespace or comments only).
    pub(crate) fn compile<'s>(
        conn: &'conn Connection,
        sql: &'s str,
    ) -> Result<(Option<Self>, &'s str)> {
        let db = conn.handle();
        let n_bytes = c_int::try_from(sql.len()).map_err(|_| Error::Prepare {
            sql: sql.to_string(),
            kind: ErrorKind::from_code(ffi::SQLITE_TOOBIG),
            message: "SQL text is too long".to_string(),
        })?;

        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const std::ffi::c_char = ptr::null();

        // SAFETY: db is a live handle owned by conn; sql is valid for n_bytes
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(db, sql.as_ptr().cast(), n_bytes, &mut stmt, &mut tail)
        };

        if rc != ffi::SQLITE_OK {
            return Err(Error::Prepare {
                sql: sql.to_string(),
                kind: ErrorKind::from_code(rc),
                message: conn.last_error(),
            });
        }

        // The engine reports the tail as a pointer into our buffer, always
        // just past a statement terminator or at the end of the text.
        let consumed = if tail.is_null() {
            sql.len()
        } else {
            (tail as usize - sql.as_ptr() as usize).min(sql.len())
        };
        let rest = sql.get(consumed..).unwrap_or("");

        let stmt = NonNull::new(stmt).map(|stmt| {
            debug!(sql = %&sql[..consumed], "prepared statement");
            Self {
                conn,
                stmt,
                state: StatementState::Ready,
            }
        });
        Ok((stmt, rest))
    }

    /// The SQL text this statement was compiled from.
    pub fn sql(&self) -> &str {
        // SAFETY: sqlite3_sql returns text owned by the statement, which
        // lives as long as self
        unsafe {
            let ptr = ffi::sqlite3_sql(self.stmt.as_ptr());
            if ptr.is_null() {
                return "";
            }
            CStr::from_ptr(ptr).to_str().unwrap_or("")
        }
    }

    pub fn state(&self) -> StatementState {
        self.state
    }

    /// Number of `?` parameters in the statement.
    pub fn parameter_count(&self) -> usize {
        // SAFETY: stmt is a valid statement handle
        unsafe { ffi::sqlite3_bind_parameter_count(self.stmt.as_ptr()) as usize }
    }

    /// Number of result columns (0 for statements that return no rows).
    pub fn column_count(&self) -> usize {
        // SAFETY: stmt is a valid statement handle
        unsafe { ffi::sqlite3_column_count(self.stmt.as_ptr()) as usize }
    }

    pub fn column_name(&self, position: usize) -> Option<String> {
        let index = self.column_index(position)?;
        // SAFETY: stmt is valid and index is within column_count
        unsafe {
            let ptr = ffi::sqlite3_column_name(self.stmt.as_ptr(), index);
            if ptr.is_null() {
                None
            } else {
                Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
            }
        }
    }

    // ==================== Binding ====================

    /// Bind `value` to the 0-indexed parameter `position`.
    ///
    /// Text and blobs are copied by the engine; `value` is not referenced
    /// after this call returns.
    pub fn bind(&mut self, position: usize, value: impl Into<Value>) -> Result<()> {
        let index = match position.checked_add(1).map(c_int::try_from) {
            Some(Ok(index)) => index,
            _ => {
                return Err(Error::Bind {
                    position,
                    kind: ErrorKind::Range,
                    message: "parameter position out of range".to_string(),
                })
            }
        };

        let stmt = self.stmt.as_ptr();
        let value = value.into();
        // SAFETY: stmt is valid; text and blob pointers are valid for the
        // given length and SQLITE_TRANSIENT makes the engine copy them
        let rc = unsafe {
            match &value {
                Value::Null => ffi::sqlite3_bind_null(stmt, index),
                Value::Integer(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
                Value::Real(v) => ffi::sqlite3_bind_double(stmt, index, *v),
                Value::Text(s) => ffi::sqlite3_bind_text(
                    stmt,
                    index,
                    s.as_ptr().cast(),
                    byte_len(position, s.len())?,
                    ffi::SQLITE_TRANSIENT(),
                ),
                Value::Blob(b) => ffi::sqlite3_bind_blob(
                    stmt,
                    index,
                    b.as_ptr().cast(),
                    byte_len(position, b.len())?,
                    ffi::SQLITE_TRANSIENT(),
                ),
            }
        };

        if rc != ffi::SQLITE_OK {
            return Err(Error::Bind {
                position,
                kind: ErrorKind::from_code(rc),
                message: self.conn.last_error(),
            });
        }
        Ok(())
    }

    pub fn bind_null(&mut self, position: usize) -> Result<()> {
        self.bind(position, Value::Null)
    }

    /// Reset every parameter to NULL.
    pub fn clear_bindings(&mut self) {
        // SAFETY: stmt is a valid statement handle
        unsafe {
            ffi::sqlite3_clear_bindings(self.stmt.as_ptr());
        }
    }

    // ==================== Stepping ====================

    /// Run a statement that produces no rows (INSERT, UPDATE, DDL).
    ///
    /// On completion the statement is reset and may be re-bound and run
    /// again. A busy database is reported as an error of kind
    /// [`ErrorKind::Busy`]; nothing is retried.
    pub fn execute(&mut self) -> Result<()> {
        match self.step() {
            ffi::SQLITE_DONE => {
                self.restart_select();
                Ok(())
            }
            ffi::SQLITE_ROW => {
                self.state = StatementState::Row;
                Err(Error::UnexpectedRow)
            }
            rc => {
                self.state = StatementState::Interrupted;
                Err(self.step_error(rc))
            }
        }
    }

    /// Advance to the next result row.
    ///
    /// Returns `Ok(true)` while positioned on a row and `Ok(false)` once the
    /// result set is exhausted, at which point the statement has been reset.
    /// On failure the statement is left as the engine left it
    /// ([`StatementState::Interrupted`]).
    pub fn next_row(&mut self) -> Result<bool> {
        match self.step() {
            ffi::SQLITE_ROW => {
                self.state = StatementState::Row;
                Ok(true)
            }
            ffi::SQLITE_DONE => {
                self.restart_select();
                Ok(false)
            }
            rc => {
                self.state = StatementState::Interrupted;
                Err(self.step_error(rc))
            }
        }
    }

    /// Step once, then reset. `Ok(true)` iff that step produced a row, which
    /// makes this a cheap "does this query return anything" probe.
    pub fn reset(&mut self) -> Result<bool> {
        let rc = self.step();
        let result = match rc {
            ffi::SQLITE_ROW => Ok(true),
            ffi::SQLITE_DONE => Ok(false),
            rc => Err(self.step_error(rc)),
        };
        self.restart_select();
        result
    }

    /// Rewind to the beginning, keeping bound parameters.
    pub fn restart_select(&mut self) {
        // The return code repeats the last step's error, already reported.
        // SAFETY: stmt is a valid statement handle
        unsafe {
            ffi::sqlite3_reset(self.stmt.as_ptr());
        }
        self.state = StatementState::Ready;
    }

    fn step(&mut self) -> c_int {
        // SAFETY: stmt is a valid statement handle
        let rc = unsafe { ffi::sqlite3_step(self.stmt.as_ptr()) };
        trace!(rc, "sqlite3_step");
        rc
    }

    fn step_error(&self, rc: c_int) -> Error {
        let kind = ErrorKind::from_code(rc);
        let message = self.conn.last_error();
        if kind.is_retryable() {
            warn!(%kind, sql = self.sql(), "statement step blocked");
        }
        Error::Step { kind, message }
    }

    // ==================== Column access ====================

    fn column_index(&self, position: usize) -> Option<c_int> {
        (position < self.column_count()).then_some(position as c_int)
    }

    /// Dynamic type of the current row's column. Columns outside the result
    /// report [`DataType::Null`].
    pub fn data_type(&self, position: usize) -> DataType {
        match self.column_index(position) {
            // SAFETY: stmt is valid and index is within column_count
            Some(index) => DataType::from_code(unsafe {
                ffi::sqlite3_column_type(self.stmt.as_ptr(), index)
            }),
            None => DataType::Null,
        }
    }

    /// Column value coerced to a 32-bit integer by the engine.
    pub fn value_int(&self, position: usize) -> i32 {
        self.column_index(position).map_or(0, |index| {
            // SAFETY: stmt is valid and index is within column_count
            unsafe { ffi::sqlite3_column_int(self.stmt.as_ptr(), index) }
        })
    }

    pub fn value_int64(&self, position: usize) -> i64 {
        self.column_index(position).map_or(0, |index| {
            // SAFETY: stmt is valid and index is within column_count
            unsafe { ffi::sqlite3_column_int64(self.stmt.as_ptr(), index) }
        })
    }

    pub fn value_double(&self, position: usize) -> f64 {
        self.column_index(position).map_or(0.0, |index| {
            // SAFETY: stmt is valid and index is within column_count
            unsafe { ffi::sqlite3_column_double(self.stmt.as_ptr(), index) }
        })
    }

    /// Column value coerced to text by the engine. NULL yields an empty
    /// string; use [`value`](Self::value) to tell the two apart.
    pub fn value_string(&self, position: usize) -> String {
        let Some(index) = self.column_index(position) else {
            return String::new();
        };
        // SAFETY: stmt is valid and index is within column_count. The text
        // pointer must be fetched before the byte count and is copied out
        // before any other call touches the column.
        unsafe {
            let ptr = ffi::sqlite3_column_text(self.stmt.as_ptr(), index);
            if ptr.is_null() {
                return String::new();
            }
            let len = ffi::sqlite3_column_bytes(self.stmt.as_ptr(), index) as usize;
            let bytes = std::slice::from_raw_parts(ptr, len);
            String::from_utf8_lossy(bytes).into_owned()
        }
    }

    pub fn value_blob(&self, position: usize) -> Vec<u8> {
        let Some(index) = self.column_index(position) else {
            return Vec::new();
        };
        // SAFETY: as in value_string
        unsafe {
            let ptr = ffi::sqlite3_column_blob(self.stmt.as_ptr(), index);
            if ptr.is_null() {
                return Vec::new();
            }
            let len = ffi::sqlite3_column_bytes(self.stmt.as_ptr(), index) as usize;
            std::slice::from_raw_parts(ptr.cast::<u8>(), len).to_vec()
        }
    }

    /// Column value in its stored type.
    pub fn value(&self, position: usize) -> Value {
        match self.data_type(position) {
            DataType::Null => Value::Null,
            DataType::Integer => Value::Integer(self.value_int64(position)),
            DataType::Float => Value::Real(self.value_double(position)),
            DataType::Text => Value::Text(self.value_string(position)),
            DataType::Blob => Value::Blob(self.value_blob(position)),
        }
    }

    /// All columns of the current row.
    pub fn row_values(&self) -> Vec<Value> {
        (0..self.column_count()).map(|i| self.value(i)).collect()
    }
}

impl Drop for PreparedStatement<'_> {
    fn drop(&mut self) {
        // SAFETY: stmt is valid and finalized exactly once, here
        unsafe {
            ffi::sqlite3_finalize(self.stmt.as_ptr());
        }
    }
}

impl std::fmt::Debug for PreparedStatement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedStatement")
            .field("sql", &self.sql())
            .field("state", &self.state)
            .finish()
    }
}

fn byte_len(position: usize, len: usize) -> Result<c_int> {
    c_int::try_from(len).map_err(|_| Error::Bind {
        position,
        kind: ErrorKind::from_code(ffi::SQLITE_TOOBIG),
        message: "value is too large to bind".to_string(),
    })
}
