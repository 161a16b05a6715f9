//! Load sink implementations

pub mod memory;
pub mod postgres;

pub use memory::{MemorySink, MemoryStore};
pub use postgres::{PgConnector, PgSink, RecordSearch, SearchField};
