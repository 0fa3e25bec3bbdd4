//! Database Backend Abstractions
//!
//! The connectivity seam collection loading executes against, and its
//! PostgreSQL implementation.

pub mod core;
pub mod postgres;

// Re-export core traits and types
pub use self::core::*;
pub use postgres::{raw_error_from_sqlx, PostgresConnection, PostgresRow};
