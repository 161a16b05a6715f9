//! Shared utilities for dump ingestion

pub mod decompression;

pub use decompression::{Compression, ForwardReader, SourceFile};
