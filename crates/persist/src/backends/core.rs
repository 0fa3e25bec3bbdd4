//! Core Database Backend Traits
//!
//! The connectivity collaborator as seen by collection loading: a connection
//! that executes one statement with positional parameters and yields rows
//! read by column index. Failures are reported as untranslated
//! [`RawDatabaseError`]s; translation happens in the caller.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::translation::RawDatabaseError;

/// Abstract database connection trait
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Execute a query and return the result rows in driver order
    async fn fetch_all(
        &mut self,
        sql: &str,
        params: &[DatabaseValue],
    ) -> Result<Vec<Box<dyn DatabaseRow>>, RawDatabaseError>;
}

/// Abstract database row trait
pub trait DatabaseRow: Send + Sync {
    /// Get a column value by position
    fn get_by_index(&self, index: usize) -> Result<DatabaseValue, RawDatabaseError>;

    /// Get column count
    fn column_count(&self) -> usize;
}

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    DateTime(chrono::DateTime<chrono::Utc>),
    /// Timestamp without time zone
    Timestamp(chrono::NaiveDateTime),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
    Json(JsonValue),
}

impl DatabaseValue {
    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Equality as a key column comparison sees it.
    ///
    /// Integer widths compare numerically, since drivers may widen or narrow
    /// a column relative to the value that was bound. NULL never matches.
    pub fn key_eq(&self, other: &DatabaseValue) -> bool {
        match (self, other) {
            (DatabaseValue::Null, _) | (_, DatabaseValue::Null) => false,
            (DatabaseValue::Int32(a), DatabaseValue::Int64(b)) => i64::from(*a) == *b,
            (DatabaseValue::Int64(a), DatabaseValue::Int32(b)) => *a == i64::from(*b),
            (a, b) => a == b,
        }
    }
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<uuid::Uuid> for DatabaseValue {
    fn from(value: uuid::Uuid) -> Self {
        DatabaseValue::Uuid(value)
    }
}

impl From<chrono::DateTime<chrono::Utc>> for DatabaseValue {
    fn from(value: chrono::DateTime<chrono::Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<chrono::NaiveDateTime> for DatabaseValue {
    fn from(value: chrono::NaiveDateTime) -> Self {
        DatabaseValue::Timestamp(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

/// SQL dialect enumeration for generating database-specific SQL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
    /// Anonymous `?` placeholders, as standard SQL
    Ansi,
}

impl SqlDialect {
    /// Get the parameter placeholder for the zero-based parameter `index`
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite | SqlDialect::Ansi => "?".to_string(),
        }
    }
}

impl Default for SqlDialect {
    fn default() -> Self {
        SqlDialect::Ansi
    }
}
