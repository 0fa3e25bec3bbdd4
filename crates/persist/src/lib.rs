//! # elif-persist: error translation and collection loading for elif.rs
//!
//! Translates vendor-specific database errors into a small, stable set of
//! error kinds and loads collection roles in batches through static,
//! pre-generated selects.
//!
//! The error translator is resolved once at bootstrap by
//! [`ErrorTranslatorFactory`] and shared by every [`CollectionLoader`].
//! Logging goes through `tracing`; the host application installs the
//! subscriber.

pub mod backends;
pub mod dialect;
pub mod error;
pub mod loading;
pub mod mapping;
pub mod translation;
pub mod xml;

pub use backends::{DatabaseConnection, DatabaseRow, DatabaseValue, SqlDialect};
pub use dialect::{Dialect, MySqlDialect, PostgresDialect, StandardDialect};
pub use error::{OrmError, OrmResult};
pub use loading::{BatchKeySet, CollectionLoader, CollectionRow, LoadedCollections, LoaderConfig, OwnerKey};
pub use mapping::{CollectionKind, JoinPlan, JoinStep, JoinType, OrderDirection};
pub use translation::{
    DatabaseErrorKind, ErrorTranslator, ErrorTranslatorConfig, ErrorTranslatorFactory, NormalizedError,
    RawDatabaseError,
};
pub use xml::{ParseErrorSink, XmlErrorCapture, XmlParseError};
