//! Thin SQLite connection and prepared-statement wrapper for the Runar ecosystem.
//!
//! # Intention
//!
//! - Open a database file and run ad-hoc SQL, collecting rows into an
//!   in-memory [`ResultTable`].
//! - Offer a [`PreparedStatement`] with positional binding, stepping and
//!   typed column access.
//! - Keep the engine's result codes visible through [`ErrorKind`].
//!
//! # Architectural Boundaries
//!
//! - Only SQLite plumbing belongs here: no query building, schema management
//!   or connection pooling.
//! - SQL parsing, storage, locking and transactions are left to the engine.
//!
//! # Example
//!
//! ```
//! use sqlite_wrapper::Connection;
//!
//! let conn = Connection::open_in_memory()?;
//! conn.direct_statement("CREATE TABLE users (name TEXT, age INTEGER)")?;
//!
//! let mut insert = conn.statement("INSERT INTO users VALUES (?, ?)")?;
//! insert.bind(0, "Ada")?;
//! insert.bind(1, 36)?;
//! insert.execute()?;
//!
//! let mut select = conn.statement("SELECT name, age FROM users")?;
//! while select.next_row()? {
//!     assert_eq!(select.value_string(0), "Ada");
//!     assert_eq!(select.value_int(1), 36);
//! }
//! # Ok::<(), sqlite_wrapper::Error>(())
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod statement;
pub mod value;

pub use config::SqliteConfig;
pub use connection::Connection;
pub use error::{Error, ErrorKind, Result};
pub use statement::{PreparedStatement, StatementState};
pub use value::{DataType, ResultRecord, ResultTable, Value, NULL_MARKER};

/// Version of the bundled SQLite library.
pub fn sqlite_version() -> &'static str {
    rusqlite::version()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_version() {
        let version = sqlite_version();
        assert!(version.starts_with('3'), "Expected SQLite 3.x, got {}", version);
    }
}
