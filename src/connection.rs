//! Database connection: open, direct statements, bulk selects and
//! transaction shortcuts.

use crate::config::SqliteConfig;
use crate::error::{Error, ErrorKind, Result};
use crate::statement::PreparedStatement;
use crate::value::{ResultRecord, ResultTable};
use rusqlite::ffi;
use std::ffi::CStr;
use tracing::debug;

/// A connection to one SQLite database.
///
/// A `Connection` only exists once the database has been opened; the handle
/// is closed when it is dropped. It may be moved to another thread but not
/// shared between threads.
pub struct Connection {
    conn: rusqlite::Connection,
    path: String,
}

impl Connection {
    /// Open (creating if needed) the database file at `path`.
    pub fn open(path: impl Into<String>) -> Result<Self> {
        Self::open_with_config(&SqliteConfig::new(path))
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open_with_config(&SqliteConfig::default())
    }

    pub fn open_with_config(config: &SqliteConfig) -> Result<Self> {
        let conn = rusqlite::Connection::open_with_flags(&config.db_path, config.open_flags())
            .map_err(|e| {
                let (kind, message) = Error::parts(e);
                Error::Open {
                    path: config.db_path.clone(),
                    kind,
                    message,
                }
            })?;

        conn.busy_timeout(config.busy_timeout())?;

        debug!(path = %config.db_path, read_only = config.read_only, "opened sqlite database");
        Ok(Self {
            conn,
            path: config.db_path.clone(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn handle(&self) -> *mut ffi::sqlite3 {
        // SAFETY: the handle stays owned by self.conn; callers never close it
        unsafe { self.conn.handle() }
    }

    /// Run `sql` and collect every result row into `out`.
    ///
    /// `out` is cleared first. All statements in `sql` are run in order and
    /// their rows appended. If a statement fails, the rows gathered so far
    /// are left in `out` and the error is returned.
    pub fn select_into(&self, sql: &str, out: &mut ResultTable) -> Result<()> {
        out.clear();

        let mut remaining = sql;
        while !remaining.is_empty() {
            let (stmt, rest) = PreparedStatement::compile(self, remaining)?;
            if rest.len() == remaining.len() && stmt.is_none() {
                break;
            }
            remaining = rest;

            let Some(mut stmt) = stmt else {
                continue;
            };
            while stmt.next_row()? {
                if out.columns.is_empty() {
                    out.columns = (0..stmt.column_count())
                        .map(|i| stmt.column_name(i).unwrap_or_default())
                        .collect();
                }
                out.records.push(ResultRecord::new(stmt.row_values()));
            }
        }

        debug!(rows = out.len(), "bulk select finished");
        Ok(())
    }

    /// Run `sql` and return its rows in a fresh table.
    pub fn select(&self, sql: &str) -> Result<ResultTable> {
        let mut table = ResultTable::new();
        self.select_into(sql, &mut table)?;
        Ok(table)
    }

    /// Run `sql` (one or more statements) without collecting rows.
    pub fn direct_statement(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql).map_err(|e| {
            let (kind, message) = Error::parts(e);
            Error::Exec { kind, message }
        })
    }

    /// Compile `sql` into a reusable prepared statement.
    pub fn statement(&self, sql: &str) -> Result<PreparedStatement<'_>> {
        PreparedStatement::new(self, sql)
    }

    /// Engine error text for the most recent failed call on this connection.
    pub fn last_error(&self) -> String {
        // SAFETY: the handle is open; sqlite3_errmsg never returns null for
        // an open handle and the text is copied before any other call
        unsafe {
            let ptr = ffi::sqlite3_errmsg(self.handle());
            if ptr.is_null() {
                return String::new();
            }
            CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }

    /// Kind of the most recent failure, or `None` if the last call succeeded.
    pub fn last_error_kind(&self) -> Option<ErrorKind> {
        // SAFETY: the handle is open
        let code = unsafe { ffi::sqlite3_extended_errcode(self.handle()) };
        match code {
            ffi::SQLITE_OK | ffi::SQLITE_ROW | ffi::SQLITE_DONE => None,
            code => Some(ErrorKind::from_code(code)),
        }
    }

    pub fn begin(&self) -> Result<()> {
        debug!("begin transaction");
        self.direct_statement("begin")
    }

    pub fn commit(&self) -> Result<()> {
        debug!("commit transaction");
        self.direct_statement("commit")
    }

    pub fn rollback(&self) -> Result<()> {
        debug!("rollback transaction");
        self.direct_statement("rollback")
    }

    /// Whether no transaction is open.
    pub fn is_autocommit(&self) -> bool {
        self.conn.is_autocommit()
    }

    pub fn last_insert_rowid(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    /// Rows changed by the most recent INSERT, UPDATE or DELETE.
    pub fn changes(&self) -> u64 {
        self.conn.changes()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("path", &self.path).finish()
    }
}
