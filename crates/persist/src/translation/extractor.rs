//! Constraint-name extraction from raw database errors

use std::fmt;

use regex::Regex;

use super::raw::RawDatabaseError;

/// Derives the name of a violated constraint from an error's vendor fields
pub trait ConstraintNameExtractor: Send + Sync + fmt::Debug {
    /// Returns `None` when the name cannot be determined
    fn extract_constraint_name(&self, error: &RawDatabaseError) -> Option<String>;
}

/// Extractor for databases that never report constraint names
#[derive(Debug, Clone, Copy, Default)]
pub struct NoConstraintNameExtractor;

impl ConstraintNameExtractor for NoConstraintNameExtractor {
    fn extract_constraint_name(&self, _error: &RawDatabaseError) -> Option<String> {
        None
    }
}

/// Message-pattern extractor.
///
/// A driver-reported constraint name wins; otherwise each pattern is tried in
/// order against the message and the `name` capture group (or the first group)
/// of the first match is returned.
#[derive(Debug, Clone)]
pub struct PatternConstraintNameExtractor {
    patterns: Vec<Regex>,
}

impl PatternConstraintNameExtractor {
    pub fn new(patterns: Vec<Regex>) -> Self {
        Self { patterns }
    }

    /// Compile an extractor from pattern sources
    pub fn from_patterns(sources: &[&str]) -> Result<Self, regex::Error> {
        let patterns = sources
            .iter()
            .map(|source| Regex::new(source))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(patterns))
    }
}

impl ConstraintNameExtractor for PatternConstraintNameExtractor {
    fn extract_constraint_name(&self, error: &RawDatabaseError) -> Option<String> {
        if let Some(reported) = error.reported_constraint().filter(|name| !name.is_empty()) {
            return Some(reported.to_string());
        }

        self.patterns.iter().find_map(|pattern| {
            let captures = pattern.captures(error.message())?;
            captures
                .name("name")
                .or_else(|| captures.get(1))
                .map(|m| m.as_str().to_string())
        })
    }
}
