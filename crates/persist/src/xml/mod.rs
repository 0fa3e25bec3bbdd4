//! Error capture for mapping document parsing

pub mod error_capture;

pub use error_capture::{ParseErrorSink, XmlErrorCapture, XmlParseError};
