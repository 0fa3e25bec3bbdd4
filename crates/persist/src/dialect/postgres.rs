//! PostgreSQL dialect

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::backends::SqlDialect;
use crate::translation::{
    CodeTableErrorTranslator, ConstraintNameExtractor, DatabaseErrorKind, ErrorCodeTable,
    ErrorTranslator, PatternConstraintNameExtractor,
};

use super::Dialect;

static CONSTRAINT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"violates (?:unique|foreign key|check|exclusion) constraint "(?P<name>[^"]+)""#,
        r#"constraint "(?P<name>[^"]+)""#,
    ]
    .iter()
    .filter_map(|source| Regex::new(source).ok())
    .collect()
});

/// SQLSTATE table for PostgreSQL; exact states refine the standard classes
pub fn postgres_error_codes() -> ErrorCodeTable {
    ErrorCodeTable::new()
        .sql_state("40P01", DatabaseErrorKind::LockAcquisition)
        .sql_state("55P03", DatabaseErrorKind::LockAcquisition)
        .sql_state("40001", DatabaseErrorKind::LockAcquisition)
        .sql_state("23505", DatabaseErrorKind::ConstraintViolation)
        .sql_state("23503", DatabaseErrorKind::ConstraintViolation)
        .sql_state("23502", DatabaseErrorKind::ConstraintViolation)
        .sql_state("23514", DatabaseErrorKind::ConstraintViolation)
        .sql_state("23P01", DatabaseErrorKind::ConstraintViolation)
        .sql_state("57P01", DatabaseErrorKind::Connection)
        .sql_state("57P02", DatabaseErrorKind::Connection)
        .sql_state("57P03", DatabaseErrorKind::Connection)
        .sql_state("53300", DatabaseErrorKind::Connection)
        .sql_state("08P01", DatabaseErrorKind::Connection)
        .sql_state_class("21", DatabaseErrorKind::DataIntegrity)
        .sql_state_class("22", DatabaseErrorKind::DataIntegrity)
        .sql_state_class("23", DatabaseErrorKind::ConstraintViolation)
        .sql_state_class("08", DatabaseErrorKind::Connection)
        .sql_state_class("40", DatabaseErrorKind::LockAcquisition)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgresql"
    }

    fn sql_dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }

    fn constraint_name_extractor(&self) -> Arc<dyn ConstraintNameExtractor> {
        Arc::new(PatternConstraintNameExtractor::new(CONSTRAINT_PATTERNS.clone()))
    }

    fn build_default_error_translator(&self) -> Box<dyn ErrorTranslator> {
        Box::new(CodeTableErrorTranslator::new(
            "postgresql",
            postgres_error_codes(),
            self.constraint_name_extractor(),
        ))
    }
}
