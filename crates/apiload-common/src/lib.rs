//! apiload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, environment helpers and logging setup for the
//! apiload workspace.
//!
//! - **Error Handling**: [`CommonError`] and the [`Result`] alias
//! - **Environment**: typed readers for `KEY=value` configuration
//! - **Logging**: `tracing` subscriber initialisation
//!
//! # Example
//!
//! ```no_run
//! use apiload_common::env;
//! use apiload_common::Result;
//!
//! fn workers() -> Result<usize> {
//!     env::parse_or("INGEST_WORKERS", 5)
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use error::{CommonError, Result};
