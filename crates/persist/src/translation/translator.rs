//! Error translator capability and its built-in variants

use std::fmt;
use std::sync::Arc;

use crate::error::{OrmError, OrmResult};

use super::config::{ErrorTranslatorConfig, CONSTRAINT_STATES_KEY, LOCK_STATES_KEY};
use super::extractor::ConstraintNameExtractor;
use super::normalized::{DatabaseErrorKind, NormalizedError};
use super::raw::RawDatabaseError;

/// Converts raw driver errors into the normalized taxonomy.
///
/// `convert` must not panic and always returns a [`NormalizedError`]; anything
/// it cannot classify becomes [`DatabaseErrorKind::Generic`]. Implementations
/// are shared across threads once built.
pub trait ErrorTranslator: Send + Sync + fmt::Debug {
    fn convert(&self, error: RawDatabaseError, message: &str, sql: &str) -> NormalizedError;

    /// Post-construction configuration hook, run once by the factory.
    ///
    /// Errors abort factory construction.
    fn configure(&mut self, _config: &ErrorTranslatorConfig) -> OrmResult<()> {
        Ok(())
    }

    /// Name used when logging which strategy was selected
    fn name(&self) -> &str;
}

/// Translator that wraps every error into the generic kind
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimalErrorTranslator;

impl ErrorTranslator for MinimalErrorTranslator {
    fn convert(&self, error: RawDatabaseError, message: &str, sql: &str) -> NormalizedError {
        NormalizedError::generic(message, error, sql)
    }

    fn name(&self) -> &str {
        "minimal"
    }
}

/// Classification table keyed by vendor code, exact SQLSTATE and SQLSTATE class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorCodeTable {
    vendor_codes: Vec<(i32, DatabaseErrorKind)>,
    sql_states: Vec<(String, DatabaseErrorKind)>,
    sql_state_classes: Vec<(String, DatabaseErrorKind)>,
}

impl ErrorCodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// SQLSTATE class mapping shared by every dialect
    pub fn standard() -> Self {
        Self::new()
            .sql_state_class("21", DatabaseErrorKind::DataIntegrity)
            .sql_state_class("22", DatabaseErrorKind::DataIntegrity)
            .sql_state_class("23", DatabaseErrorKind::ConstraintViolation)
            .sql_state_class("27", DatabaseErrorKind::ConstraintViolation)
            .sql_state_class("44", DatabaseErrorKind::ConstraintViolation)
            .sql_state_class("08", DatabaseErrorKind::Connection)
            .sql_state_class("40", DatabaseErrorKind::LockAcquisition)
    }

    pub fn vendor_code(mut self, code: i32, kind: DatabaseErrorKind) -> Self {
        self.vendor_codes.push((code, kind));
        self
    }

    pub fn sql_state(mut self, state: &str, kind: DatabaseErrorKind) -> Self {
        self.sql_states.push((state.to_string(), kind));
        self
    }

    pub fn sql_state_class(mut self, class: &str, kind: DatabaseErrorKind) -> Self {
        self.sql_state_classes.push((class.to_string(), kind));
        self
    }

    /// Exact state mapping that takes precedence over existing entries
    fn override_sql_state(&mut self, state: &str, kind: DatabaseErrorKind) {
        self.sql_states.insert(0, (state.to_string(), kind));
    }

    /// Vendor code first, then exact SQLSTATE, then SQLSTATE class
    pub fn classify(&self, error: &RawDatabaseError) -> DatabaseErrorKind {
        if let Some(code) = error.vendor_code() {
            if let Some((_, kind)) = self.vendor_codes.iter().find(|(c, _)| *c == code) {
                return *kind;
            }
        }

        if let Some(state) = error.sql_state() {
            if let Some((_, kind)) = self.sql_states.iter().find(|(s, _)| s.eq_ignore_ascii_case(state)) {
                return *kind;
            }
        }

        error
            .sql_state_class()
            .and_then(|class| {
                self.sql_state_classes
                    .iter()
                    .find(|(c, _)| c.eq_ignore_ascii_case(class))
                    .map(|(_, kind)| *kind)
            })
            .unwrap_or(DatabaseErrorKind::Generic)
    }
}

/// Table-driven translator used as the dialect default.
///
/// Constraint names are only looked up for constraint violations.
#[derive(Debug, Clone)]
pub struct CodeTableErrorTranslator {
    name: String,
    table: ErrorCodeTable,
    extractor: Arc<dyn ConstraintNameExtractor>,
}

impl CodeTableErrorTranslator {
    pub fn new(
        name: impl Into<String>,
        table: ErrorCodeTable,
        extractor: Arc<dyn ConstraintNameExtractor>,
    ) -> Self {
        Self {
            name: name.into(),
            table,
            extractor,
        }
    }

    pub fn table(&self) -> &ErrorCodeTable {
        &self.table
    }

    fn configured_states<'a>(config: &'a ErrorTranslatorConfig, key: &str) -> OrmResult<Vec<&'a str>> {
        let states = config.get_list(key);
        if let Some(bad) = states
            .iter()
            .find(|state| state.len() != 5 || !state.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(OrmError::Configuration(format!(
                "'{}' in {} is not a five character SQLSTATE",
                bad, key
            )));
        }
        Ok(states)
    }
}

impl ErrorTranslator for CodeTableErrorTranslator {
    fn convert(&self, error: RawDatabaseError, message: &str, sql: &str) -> NormalizedError {
        match self.table.classify(&error) {
            DatabaseErrorKind::ConstraintViolation => {
                let constraint = self.extractor.extract_constraint_name(&error);
                NormalizedError::constraint_violation(message, error, sql, constraint)
            }
            kind => NormalizedError::new(kind, message, error, sql),
        }
    }

    fn configure(&mut self, config: &ErrorTranslatorConfig) -> OrmResult<()> {
        let lock_states = Self::configured_states(config, LOCK_STATES_KEY)?;
        let constraint_states = Self::configured_states(config, CONSTRAINT_STATES_KEY)?;

        for state in lock_states {
            self.table.override_sql_state(state, DatabaseErrorKind::LockAcquisition);
        }
        for state in constraint_states {
            self.table.override_sql_state(state, DatabaseErrorKind::ConstraintViolation);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
