//! Catalyst Explorer Common Library
//!
//! Shared code for the recommendation service and the embedding worker:
//! - Database models and repository
//! - Embedding provider abstraction and idempotent embedding storage
//! - Error types and handling
//! - Configuration management
//! - Metrics

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use config::{AppConfig, COMBINED_FIELD};
pub use db::{DbPool, Repository};
pub use embeddings::Embedder;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
