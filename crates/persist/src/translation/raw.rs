//! Driver-level database errors before translation

use std::fmt;

use serde::{Deserialize, Serialize};

/// A vendor-specific database error as reported by the driver.
///
/// Drivers fill in whatever they know: MySQL reports a numeric vendor code
/// next to the SQLSTATE, PostgreSQL reports only the SQLSTATE but often names
/// the violated constraint directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub struct RawDatabaseError {
    vendor_code: Option<i32>,
    sql_state: Option<String>,
    message: String,
    reported_constraint: Option<String>,
}

impl RawDatabaseError {
    /// Create an error carrying only a driver message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            vendor_code: None,
            sql_state: None,
            message: message.into(),
            reported_constraint: None,
        }
    }

    /// Set the vendor error code
    pub fn with_vendor_code(mut self, code: i32) -> Self {
        self.vendor_code = Some(code);
        self
    }

    /// Set the five character SQLSTATE classification
    pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
        self.sql_state = Some(sql_state.into());
        self
    }

    /// Record a constraint name the driver reported alongside the error
    pub fn with_reported_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.reported_constraint = Some(constraint.into());
        self
    }

    pub fn vendor_code(&self) -> Option<i32> {
        self.vendor_code
    }

    pub fn sql_state(&self) -> Option<&str> {
        self.sql_state.as_deref()
    }

    /// The two character SQLSTATE class, if the state is well formed
    pub fn sql_state_class(&self) -> Option<&str> {
        self.sql_state
            .as_deref()
            .filter(|state| state.len() >= 2 && state.is_char_boundary(2))
            .map(|state| &state[..2])
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn reported_constraint(&self) -> Option<&str> {
        self.reported_constraint.as_deref()
    }
}

impl fmt::Display for RawDatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        match (&self.sql_state, self.vendor_code) {
            (Some(state), Some(code)) => write!(f, " (SQLSTATE {}, code {})", state, code),
            (Some(state), None) => write!(f, " (SQLSTATE {})", state),
            (None, Some(code)) => write!(f, " (code {})", code),
            (None, None) => Ok(()),
        }
    }
}
