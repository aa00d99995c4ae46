//! Value types exchanged with SQLite.

use rusqlite::ffi;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::ffi::{c_int, CStr};
use std::fmt;

/// Text rendering of a NULL field.
pub const NULL_MARKER: &str = "<null>";

/// Dynamic type of a column value, as reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Blob,
    Null,
}

impl DataType {
    pub(crate) fn from_code(code: c_int) -> Self {
        match code {
            ffi::SQLITE_INTEGER => Self::Integer,
            ffi::SQLITE_FLOAT => Self::Float,
            ffi::SQLITE_TEXT => Self::Text,
            ffi::SQLITE_BLOB => Self::Blob,
            _ => Self::Null,
        }
    }
}

/// Core value type for SQLite operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::Null => DataType::Null,
            Self::Integer(_) => DataType::Integer,
            Self::Real(_) => DataType::Float,
            Self::Text(_) => DataType::Text,
            Self::Blob(_) => DataType::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Render the value as plain text, NULL as [`NULL_MARKER`].
    ///
    /// Lossy: a NULL cannot be told apart from the text `"<null>"`.
    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Self::Null => Cow::Borrowed(NULL_MARKER),
            Self::Integer(i) => Cow::Owned(i.to_string()),
            Self::Real(f) => Cow::Owned(render_real(*f)),
            Self::Text(s) => Cow::Borrowed(s),
            Self::Blob(b) => String::from_utf8_lossy(b),
        }
    }
}

/// Format a real the way the engine converts REAL to TEXT, so rendered
/// fields match `sqlite3_column_text` on the same value.
fn render_real(f: f64) -> String {
    // SAFETY: the format string is NUL-terminated and consumes exactly one
    // double; the returned buffer is copied and then released with
    // sqlite3_free
    unsafe {
        let ptr = ffi::sqlite3_mprintf(b"%!.15g\0".as_ptr().cast(), f);
        if ptr.is_null() {
            return f.to_string();
        }
        let text = CStr::from_ptr(ptr).to_string_lossy().into_owned();
        ffi::sqlite3_free(ptr.cast());
        text
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Integer(i64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Self::Blob(v.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// One result row: a value per selected column, in column order.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub fields: Vec<Value>,
}

impl ResultRecord {
    pub fn new(fields: Vec<Value>) -> Self {
        Self { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.fields.get(index)
    }

    /// Fields rendered as text.
    pub fn to_strings(&self) -> Vec<String> {
        self.fields.iter().map(|v| v.render().into_owned()).collect()
    }
}

/// Fully materialized result of a bulk select.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    /// Column names of the first statement that produced a row.
    pub columns: Vec<String>,
    pub records: Vec<ResultRecord>,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all rows and column names.
    pub fn clear(&mut self) {
        self.columns.clear();
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ResultRecord> {
        self.records.iter()
    }

    /// Render every record as strings, optionally preceded by a row of
    /// column names.
    pub fn to_strings(&self, include_header: bool) -> Vec<Vec<String>> {
        let header = include_header && !self.records.is_empty();
        let mut rows = Vec::with_capacity(self.records.len() + usize::from(header));
        if header {
            rows.push(self.columns.clone());
        }
        rows.extend(self.records.iter().map(ResultRecord::to_strings));
        rows
    }
}

impl<'a> IntoIterator for &'a ResultTable {
    type Item = &'a ResultRecord;
    type IntoIter = std::slice::Iter<'a, ResultRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
