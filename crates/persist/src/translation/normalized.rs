//! Normalized database error taxonomy

use std::fmt;

use serde::{Deserialize, Serialize};

use super::raw::RawDatabaseError;

/// The closed set of database failure kinds application code sees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseErrorKind {
    /// Unclassified driver-level failure
    Generic,
    /// An insert, update or delete violated a constraint
    ConstraintViolation,
    /// The database rejected a value or type
    DataIntegrity,
    /// A row or table lock could not be acquired (timeout or deadlock)
    LockAcquisition,
    /// Transport or session level failure
    Connection,
}

impl fmt::Display for DatabaseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DatabaseErrorKind::Generic => "generic database error",
            DatabaseErrorKind::ConstraintViolation => "constraint violation",
            DatabaseErrorKind::DataIntegrity => "data integrity violation",
            DatabaseErrorKind::LockAcquisition => "lock acquisition failure",
            DatabaseErrorKind::Connection => "connection failure",
        };
        f.write_str(name)
    }
}

/// A translated database failure.
///
/// Keeps the raw driver error as its `source()` together with the SQL text
/// that triggered it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct NormalizedError {
    kind: DatabaseErrorKind,
    message: String,
    sql: String,
    constraint_name: Option<String>,
    #[source]
    cause: RawDatabaseError,
}

impl NormalizedError {
    pub fn new(
        kind: DatabaseErrorKind,
        message: impl Into<String>,
        cause: RawDatabaseError,
        sql: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            sql: sql.into(),
            constraint_name: None,
            cause,
        }
    }

    /// Shorthand for the unclassified kind
    pub fn generic(message: impl Into<String>, cause: RawDatabaseError, sql: impl Into<String>) -> Self {
        Self::new(DatabaseErrorKind::Generic, message, cause, sql)
    }

    /// Constraint violation carrying the violated constraint's name when known
    pub fn constraint_violation(
        message: impl Into<String>,
        cause: RawDatabaseError,
        sql: impl Into<String>,
        constraint_name: Option<String>,
    ) -> Self {
        Self {
            constraint_name,
            ..Self::new(DatabaseErrorKind::ConstraintViolation, message, cause, sql)
        }
    }

    pub fn kind(&self) -> DatabaseErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The SQL text that was executing when the failure occurred
    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn constraint_name(&self) -> Option<&str> {
        self.constraint_name.as_deref()
    }

    /// The original driver error
    pub fn cause(&self) -> &RawDatabaseError {
        &self.cause
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_cause_is_error_source() {
        let raw = RawDatabaseError::new("connection reset").with_sql_state("08006");
        let error = NormalizedError::new(
            DatabaseErrorKind::Connection,
            "could not load collection",
            raw.clone(),
            "SELECT 1",
        );

        assert_eq!(error.to_string(), "connection failure: could not load collection");
        assert_eq!(error.source().map(|e| e.to_string()), Some(raw.to_string()));
        assert_eq!(error.sql(), "SELECT 1");
        assert!(error.constraint_name().is_none());
    }

    #[test]
    fn test_constraint_violation_keeps_name() {
        let error = NormalizedError::constraint_violation(
            "insert failed",
            RawDatabaseError::new("duplicate key").with_sql_state("23505"),
            "INSERT INTO orders (code) VALUES ($1)",
            Some("UQ_ORDER_CODE".to_string()),
        );
        assert_eq!(error.kind(), DatabaseErrorKind::ConstraintViolation);
        assert_eq!(error.constraint_name(), Some("UQ_ORDER_CODE"));
    }
}
