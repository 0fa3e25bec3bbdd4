//! SQL dialects as consumed by the persistence layer
//!
//! A dialect supplies its default error translator, the constraint-name
//! extractor custom translators are constructed with, and the placeholder
//! style generated statements use.

pub mod mysql;
pub mod postgres;

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::backends::SqlDialect;
use crate::translation::{
    CodeTableErrorTranslator, ConstraintNameExtractor, ErrorCodeTable, ErrorTranslator,
    PatternConstraintNameExtractor,
};

pub use mysql::MySqlDialect;
pub use postgres::PostgresDialect;

/// Dialect collaborator trait
pub trait Dialect: Send + Sync {
    fn name(&self) -> &str;

    /// Placeholder style for generated SQL
    fn sql_dialect(&self) -> SqlDialect;

    fn constraint_name_extractor(&self) -> Arc<dyn ConstraintNameExtractor>;

    /// The translator used when no custom translator is configured
    fn build_default_error_translator(&self) -> Box<dyn ErrorTranslator>;
}

static STANDARD_CONSTRAINT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [r#"(?i)constraint\s+["'`\[](?P<name>[^"'`\]]+)["'`\]]"#]
        .iter()
        .filter_map(|source| Regex::new(source).ok())
        .collect()
});

/// Dialect for databases that follow SQLSTATE classes and `?` placeholders
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardDialect;

impl Dialect for StandardDialect {
    fn name(&self) -> &str {
        "standard"
    }

    fn sql_dialect(&self) -> SqlDialect {
        SqlDialect::Ansi
    }

    fn constraint_name_extractor(&self) -> Arc<dyn ConstraintNameExtractor> {
        Arc::new(PatternConstraintNameExtractor::new(STANDARD_CONSTRAINT_PATTERNS.clone()))
    }

    fn build_default_error_translator(&self) -> Box<dyn ErrorTranslator> {
        Box::new(CodeTableErrorTranslator::new(
            "standard",
            ErrorCodeTable::standard(),
            self.constraint_name_extractor(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translation::{DatabaseErrorKind, RawDatabaseError};

    #[test]
    fn test_standard_dialect_translation() {
        let translator = StandardDialect.build_default_error_translator();
        assert_eq!(translator.name(), "standard");

        let error = translator.convert(
            RawDatabaseError::new("integrity constraint violation: constraint 'FK_ITEM_ORDER' failed")
                .with_sql_state("23000"),
            "could not delete",
            "DELETE FROM orders WHERE id = ?",
        );
        assert_eq!(error.kind(), DatabaseErrorKind::ConstraintViolation);
        assert_eq!(error.constraint_name(), Some("FK_ITEM_ORDER"));

        let timeout = translator.convert(
            RawDatabaseError::new("communication link failure").with_sql_state("08S01"),
            "could not load",
            "",
        );
        assert_eq!(timeout.kind(), DatabaseErrorKind::Connection);
    }
}
