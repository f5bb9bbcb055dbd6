//! Strata Core - Foundational Types
//!
//! Error taxonomy and configuration shared by the strata crates.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{ExtractConfig, LogLevel, StrataConfig};
pub use error::{LayerOperation, Result, StrataError};

/// Strata version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
