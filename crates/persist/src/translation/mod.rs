//! Database error translation
//!
//! Raw, vendor-specific driver errors are converted into a closed set of
//! [`DatabaseErrorKind`]s by an [`ErrorTranslator`] resolved once at bootstrap
//! by the [`ErrorTranslatorFactory`].

pub mod config;
pub mod extractor;
pub mod factory;
pub mod normalized;
pub mod raw;
pub mod translator;

pub use config::{ErrorTranslatorConfig, CONSTRAINT_STATES_KEY, ERROR_TRANSLATOR_KEY, LOCK_STATES_KEY};
pub use extractor::{ConstraintNameExtractor, NoConstraintNameExtractor, PatternConstraintNameExtractor};
pub use factory::{
    ConstructorError, ErrorTranslatorFactory, TranslatorRegistry, MINIMAL_TRANSLATOR_ID,
    STANDARD_TRANSLATOR_ID,
};
pub use normalized::{DatabaseErrorKind, NormalizedError};
pub use raw::RawDatabaseError;
pub use translator::{CodeTableErrorTranslator, ErrorCodeTable, ErrorTranslator, MinimalErrorTranslator};
