//! # Notiflow Store
//!
//! SQLite persistence for every record the execution core reads, plus the
//! append-only execution-detail sink. One connection behind a mutex; each
//! record is kept as a JSON document next to the columns it is looked up by.

pub mod sqlite;

pub use sqlite::SqliteStore;
