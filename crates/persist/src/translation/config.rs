//! Error translator configuration

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Key naming the user-supplied error translator to resolve
pub const ERROR_TRANSLATOR_KEY: &str = "persist.error_translator";

/// Extra SQLSTATE codes the built-in translators classify as lock failures
pub const LOCK_STATES_KEY: &str = "persist.error_translator.lock_states";

/// Extra SQLSTATE codes the built-in translators classify as constraint violations
pub const CONSTRAINT_STATES_KEY: &str = "persist.error_translator.constraint_states";

const ENV_PREFIX: &str = "PERSIST_";

/// String key/value configuration read once while building a translator
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorTranslatorConfig {
    values: HashMap<String, String>,
}

impl ErrorTranslatorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from key/value pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    /// Read every `PERSIST_*` environment variable.
    ///
    /// `PERSIST_ERROR_TRANSLATOR` becomes `persist.error_translator`.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let values = vars
            .into_iter()
            .filter_map(|(name, value)| {
                let rest = name.strip_prefix(ENV_PREFIX)?;
                if rest.is_empty() {
                    return None;
                }
                Some((format!("persist.{}", rest.to_lowercase()), value))
            })
            .collect();
        Self { values }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// The configured translator identifier; blank values count as absent
    pub fn translator_id(&self) -> Option<&str> {
        self.get(ERROR_TRANSLATOR_KEY)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }

    /// Comma separated list value, blank entries dropped
    pub fn get_list(&self, key: &str) -> Vec<&str> {
        self.get(key)
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
