//! MySQL dialect

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
        // MySQL 8 prefixes the key with its table: 'orders.uq_code'
        r"for key '(?:[^'.]+\.)?(?P<name>[^']+)'",
        r"CONSTRAINT `(?P<name>[^`]+)`",
        r"[Cc]heck constraint '(?P<name>[^']+)' is violated",
    ]
    .iter()
    .filter_map(|source| Regex::new(source).ok())
    .collect()
});

/// Vendor code table for MySQL, falling back to SQLSTATE classes
pub fn mysql_error_codes() -> ErrorCodeTable {
    ErrorCodeTable::standard()
        .vendor_code(1062, DatabaseErrorKind::ConstraintViolation)
        .vendor_code(1451, DatabaseErrorKind::ConstraintViolation)
        .vendor_code(1452, DatabaseErrorKind::ConstraintViolation)
        .vendor_code(1216, DatabaseErrorKind::ConstraintViolation)
        .vendor_code(1217, DatabaseErrorKind::ConstraintViolation)
        .vendor_code(1048, DatabaseErrorKind::ConstraintViolation)
        .vendor_code(3819, DatabaseErrorKind::ConstraintViolation)
        .vendor_code(1205, DatabaseErrorKind::LockAcquisition)
        .vendor_code(1213, DatabaseErrorKind::LockAcquisition)
        .vendor_code(3572, DatabaseErrorKind::LockAcquisition)
        .vendor_code(1264, DatabaseErrorKind::DataIntegrity)
        .vendor_code(1265, DatabaseErrorKind::DataIntegrity)
        .vendor_code(1292, DatabaseErrorKind::DataIntegrity)
        .vendor_code(1366, DatabaseErrorKind::DataIntegrity)
        .vendor_code(1406, DatabaseErrorKind::DataIntegrity)
        .vendor_code(1040, DatabaseErrorKind::Connection)
        .vendor_code(2002, DatabaseErrorKind::Connection)
        .vendor_code(2003, DatabaseErrorKind::Connection)
        .vendor_code(2006, DatabaseErrorKind::Connection)
        .vendor_code(2013, DatabaseErrorKind::Connection)
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn sql_dialect(&self) -> SqlDialect {
        SqlDialect::MySQL
    }

    fn constraint_name_extractor(&self) -> Arc<dyn ConstraintNameExtractor> {
        Arc::new(PatternConstraintNameExtractor::new(CONSTRAINT_PATTERNS.clone()))
    }

    fn build_default_error_translator(&self) -> Box<dyn ErrorTranslator> {
        Box::new(CodeTableErrorTranslator::new(
            "mysql",
            mysql_error_codes(),
            self.constraint_name_extractor(),
        ))
    }
}
