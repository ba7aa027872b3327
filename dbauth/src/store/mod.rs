//! Backing-store contract consumed by the user handler.
//!
//! The handler only needs two things from a store: a parameterized query
//! returning named columns per row, and an update reporting how many rows it
//! touched. [`UserStore`] captures exactly that, so the authentication core
//! never depends on a particular driver.
//!
//! # Implementations
//!
//! - [`postgres::PgUserStore`]: SQLx connection pool, numbered placeholders
//! - [`memory::MemoryStore`]: rows held in memory, for static user lists and tests

pub mod memory;
pub mod postgres;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgUserStore;

/// Error type for store operations, passed through to callers unchanged
#[derive(Error, Debug)]
pub enum StoreError {
    /// The query matched no rows
    #[error("No rows in result set")]
    NoRows,

    /// Catch-all for non-recoverable errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NoRows,
            other => StoreError::Other(anyhow::Error::from(other)),
        }
    }
}

/// Placeholder syntax understood by a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `?` for every parameter
    Question,
    /// `$1, $2, ...`
    Numbered,
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Text(String),
    Timestamp(DateTime<Utc>),
}

/// A single column value as returned by the store.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Text(String),
    Bytes(Vec<u8>),
    Integer(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Json(Value),
    /// A column the store cannot decode; a null claim, and a mapping error
    /// wherever the field schema reads it.
    Unsupported { type_name: String },
}

impl ColumnValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ColumnValue::Null => "null",
            ColumnValue::Text(_) => "text",
            ColumnValue::Bytes(_) => "bytes",
            ColumnValue::Integer(_) => "integer",
            ColumnValue::Float(_) => "float",
            ColumnValue::Bool(_) => "bool",
            ColumnValue::Timestamp(_) => "timestamp",
            ColumnValue::Json(_) => "json",
            ColumnValue::Unsupported { .. } => "unsupported",
        }
    }

    /// Text view of textual columns; byte sequences are read as UTF-8.
    pub fn as_text(&self) -> Option<String> {
        match self {
            ColumnValue::Text(s) => Some(s.clone()),
            ColumnValue::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    /// Claim value for this column.
    pub fn to_json(&self) -> Value {
        match self {
            ColumnValue::Null | ColumnValue::Unsupported { .. } => Value::Null,
            ColumnValue::Text(s) => Value::String(s.clone()),
            ColumnValue::Bytes(b) => Value::String(String::from_utf8_lossy(b).into_owned()),
            ColumnValue::Integer(i) => Value::from(*i),
            ColumnValue::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            ColumnValue::Bool(b) => Value::Bool(*b),
            ColumnValue::Timestamp(t) => Value::String(t.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            ColumnValue::Json(v) => v.clone(),
        }
    }
}

impl From<&str> for ColumnValue {
    fn from(s: &str) -> Self {
        ColumnValue::Text(s.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(s: String) -> Self {
        ColumnValue::Text(s)
    }
}

impl From<i64> for ColumnValue {
    fn from(i: i64) -> Self {
        ColumnValue::Integer(i)
    }
}

impl From<bool> for ColumnValue {
    fn from(b: bool) -> Self {
        ColumnValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for ColumnValue {
    fn from(t: DateTime<Utc>) -> Self {
        ColumnValue::Timestamp(t)
    }
}

impl<T: Into<ColumnValue>> From<Option<T>> for ColumnValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ColumnValue::Null, Into::into)
    }
}

/// One result row: column names and values in select order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: Vec<(String, ColumnValue)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style column append.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        self.set(name, value.into());
        self
    }

    /// Insert or replace a column.
    pub fn set(&mut self, name: impl Into<String>, value: ColumnValue) {
        let name = name.into();
        match self.columns.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.columns.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ColumnValue> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &ColumnValue)> {
        self.columns.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Tabular query interface over the user store.
///
/// Implementations must be safe for concurrent use; every call stands alone.
#[async_trait::async_trait]
pub trait UserStore: Send + Sync {
    /// Placeholder syntax expected in statement text.
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Run a query and return every row.
    async fn query(&self, sql: &str, params: &[Param]) -> Result<Vec<Row>, StoreError>;

    /// Run an update and return the affected-row count.
    async fn execute(&self, sql: &str, params: &[Param]) -> Result<u64, StoreError>;
}
