//! ipindex Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the ipindex workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`IpIndexError`] and the crate-wide [`Result`] alias
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Types**: the [`types::NetworkRecord`] produced by ingestion and the
//!   [`types::Registry`] tag identifying where a dump came from
//!
//! # Example
//!
//! ```no_run
//! use ipindex_common::types::{NetworkRecord, Registry};
//!
//! let id = NetworkRecord::derive_id(Registry::Ripe, "10.0.0.0/24");
//! println!("record id: {}", id);
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{IpIndexError, Result};
