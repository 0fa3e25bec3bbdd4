//! Error translator resolution
//!
//! Custom translators are resolved through a [`TranslatorRegistry`]: a table
//! from configuration identifiers to constructor closures, populated by the
//! host at startup. A registration may offer a constructor taking the
//! dialect's [`ConstraintNameExtractor`], a no-argument constructor, or both;
//! the extractor-accepting one is preferred.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::dialect::Dialect;
use crate::error::OrmResult;

use super::config::ErrorTranslatorConfig;
use super::extractor::ConstraintNameExtractor;
use super::translator::{CodeTableErrorTranslator, ErrorCodeTable, ErrorTranslator, MinimalErrorTranslator};

/// Identifier of the built-in [`MinimalErrorTranslator`]
pub const MINIMAL_TRANSLATOR_ID: &str = "minimal";

/// Identifier of the built-in SQLSTATE class translator
pub const STANDARD_TRANSLATOR_ID: &str = "standard";

/// Failure reported by a translator constructor
pub type ConstructorError = Box<dyn std::error::Error + Send + Sync>;

type ConstructorResult = Result<Box<dyn ErrorTranslator>, ConstructorError>;

type ExtractorConstructor = Box<dyn Fn(Arc<dyn ConstraintNameExtractor>) -> ConstructorResult + Send + Sync>;

type NoArgConstructor = Box<dyn Fn() -> ConstructorResult + Send + Sync>;

#[derive(Default)]
struct Registration {
    with_extractor: Option<ExtractorConstructor>,
    no_arg: Option<NoArgConstructor>,
}

/// Why a configured translator could not be produced
#[derive(Debug, thiserror::Error)]
enum ResolutionError {
    #[error("no error translator is registered as '{0}'")]
    Unknown(String),

    #[error("error translator '{0}' has no usable constructor")]
    NoConstructor(String),

    #[error("error translator '{id}' failed to construct: {source}")]
    ConstructionFailed {
        id: String,
        #[source]
        source: ConstructorError,
    },
}

/// Registry mapping translator identifiers to constructors
#[derive(Default)]
pub struct TranslatorRegistry {
    entries: HashMap<String, Registration>,
}

impl TranslatorRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in translators
    pub fn with_builtins() -> Self {
        Self::new()
            .register(MINIMAL_TRANSLATOR_ID, || Ok(Box::new(MinimalErrorTranslator)))
            .register_with_extractor(STANDARD_TRANSLATOR_ID, |extractor| {
                Ok(Box::new(CodeTableErrorTranslator::new(
                    STANDARD_TRANSLATOR_ID,
                    ErrorCodeTable::standard(),
                    extractor,
                )))
            })
    }

    /// Register a no-argument constructor
    pub fn register<F>(mut self, id: impl Into<String>, constructor: F) -> Self
    where
        F: Fn() -> ConstructorResult + Send + Sync + 'static,
    {
        self.entries.entry(id.into()).or_default().no_arg = Some(Box::new(constructor));
        self
    }

    /// Register a constructor that receives the dialect's constraint-name extractor
    pub fn register_with_extractor<F>(mut self, id: impl Into<String>, constructor: F) -> Self
    where
        F: Fn(Arc<dyn ConstraintNameExtractor>) -> ConstructorResult + Send + Sync + 'static,
    {
        self.entries.entry(id.into()).or_default().with_extractor = Some(Box::new(constructor));
        self
    }

    /// Returns true if any constructor is registered under `id`
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Registered identifiers, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    fn construct(
        &self,
        id: &str,
        extractor: Arc<dyn ConstraintNameExtractor>,
    ) -> Result<Box<dyn ErrorTranslator>, ResolutionError> {
        let registration = self
            .entries
            .get(id)
            .ok_or_else(|| ResolutionError::Unknown(id.to_string()))?;

        if let Some(constructor) = &registration.with_extractor {
            match constructor(extractor) {
                Ok(translator) => return Ok(translator),
                // the no-arg constructor gets its chance below
                Err(e) if registration.no_arg.is_some() => {
                    debug!(translator = %id, error = %e, "Extractor constructor failed, trying no-argument constructor");
                }
                Err(source) => {
                    return Err(ResolutionError::ConstructionFailed {
                        id: id.to_string(),
                        source,
                    })
                }
            }
        }

        let constructor = registration
            .no_arg
            .as_ref()
            .ok_or_else(|| ResolutionError::NoConstructor(id.to_string()))?;

        constructor().map_err(|source| ResolutionError::ConstructionFailed {
            id: id.to_string(),
            source,
        })
    }
}

impl std::fmt::Debug for TranslatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranslatorRegistry").field("ids", &self.ids()).finish()
    }
}

/// Builds the long-lived error translator for a persistence unit
#[derive(Debug, Default)]
pub struct ErrorTranslatorFactory {
    registry: TranslatorRegistry,
}

impl ErrorTranslatorFactory {
    pub fn new(registry: TranslatorRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &TranslatorRegistry {
        &self.registry
    }

    /// Resolve the translator for `dialect` and `config`.
    ///
    /// A configured identifier that cannot be constructed is logged and the
    /// dialect default is used instead. Only a failing configuration hook is
    /// returned as an error.
    pub fn build(
        &self,
        dialect: &dyn Dialect,
        config: &ErrorTranslatorConfig,
    ) -> OrmResult<Arc<dyn ErrorTranslator>> {
        let configured = config
            .translator_id()
            .and_then(|id| self.construct_configured(id, dialect));

        let mut translator = match configured {
            Some(translator) => {
                info!(translator = %translator.name(), "Using configured error translator");
                translator
            }
            None => {
                debug!(dialect = %dialect.name(), "Using dialect-defined error translator");
                dialect.build_default_error_translator()
            }
        };

        if let Err(e) = translator.configure(config) {
            warn!(translator = %translator.name(), error = %e, "Unable to configure error translator");
            return Err(e);
        }

        Ok(Arc::from(translator))
    }

    /// Translator that always produces the generic kind, for contexts with
    /// no dialect or configuration available
    pub fn build_minimal() -> Arc<dyn ErrorTranslator> {
        Arc::new(MinimalErrorTranslator)
    }

    fn construct_configured(&self, id: &str, dialect: &dyn Dialect) -> Option<Box<dyn ErrorTranslator>> {
        debug!(translator = %id, "Attempting to construct configured error translator");

        match self.registry.construct(id, dialect.constraint_name_extractor()) {
            Ok(translator) => Some(translator),
            Err(e) => {
                warn!(translator = %id, error = %e, "Unable to construct configured error translator");
                None
            }
        }
    }
}
