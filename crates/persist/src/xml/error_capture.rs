//! Parse error sink that logs everything and remembers the first error

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

/// A positioned problem reported by a document parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct XmlParseError {
    pub line: usize,
    pub message: String,
}

impl XmlParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Callbacks a parser reports problems through
pub trait ParseErrorSink {
    fn report_error(&mut self, line: usize, message: &str);

    /// Fatal errors are handled as ordinary errors unless overridden
    fn report_fatal_error(&mut self, line: usize, message: &str) {
        self.report_error(line, message);
    }

    fn report_warning(&mut self, line: usize, message: &str);
}

/// Logs every reported problem and keeps the first error of a parse pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct XmlErrorCapture {
    first_error: Option<XmlParseError>,
}

impl XmlErrorCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first error since construction or the last `reset`
    pub fn first_error(&self) -> Option<&XmlParseError> {
        self.first_error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.first_error.is_some()
    }

    /// Clear captured state before the next parse pass
    pub fn reset(&mut self) {
        self.first_error = None;
    }
}

impl ParseErrorSink for XmlErrorCapture {
    fn report_error(&mut self, line: usize, message: &str) {
        error!(line, detail = %message, "Error parsing XML");
        if self.first_error.is_none() {
            self.first_error = Some(XmlParseError::new(line, message));
        }
    }

    fn report_warning(&mut self, line: usize, message: &str) {
        warn!(line, detail = %message, "Warning parsing XML");
    }
}
