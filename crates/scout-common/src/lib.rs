//! Scout shared types.
//!
//! This crate provides the foundational pieces shared across scout-core
//! modules:
//! - The deployment metadata model supplied to product resolution
//! - The unified error type with category grouping

pub mod error;
pub mod metadata;

pub use error::{Error, ErrorCategory, Result};
pub use metadata::{DeploymentMetadata, SystemEntry};
