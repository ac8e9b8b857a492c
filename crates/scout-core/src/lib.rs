//! Scout Core Library
//!
//! This library is the seam between "what do we want to know" (format
//! parsers, maintained elsewhere) and "how do we get it from this kind of
//! target". It provides:
//! - Product variants and the process-wide product registry
//! - Product resolution against deployment metadata
//! - The per-target `Context` handed to parsers
//! - Execution contexts: run a command or resolve a path against a live
//!   host, captured archive, container image, or vendor diagnostic dump
//!
//! The catalog of what to collect, archive unpacking, and the CLI layer
//! are external collaborators.

pub mod context;
pub mod exec;
pub mod logging;
pub mod product;

pub use context::{Context, ContextBuilder};
pub use exec::{ExecSettings, ExecutionContext, RunOptions, RunOutput, ShellOutput};
pub use product::{Product, ProductRegistry};
pub use scout_common::{DeploymentMetadata, Error, Result, SystemEntry};
