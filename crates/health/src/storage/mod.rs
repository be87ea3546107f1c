//! Storage traits and implementations
//!
//! This module defines the storage abstraction layer for health records,
//! sync cursors and the collection log. The trait-based design allows
//! swapping between in-memory and SQLite storage.

mod memory;
mod sqlite;
mod traits;

pub use memory::InMemoryHealthStore;
pub use sqlite::SqliteHealthStore;
pub use traits::HealthStore;
