//! Strata Storage - Database backends for schema migrations
//!
//! This crate provides the database handles the migrator runs against.

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::{SqliteDatabase, DEFAULT_VERSION_TABLE};

pub use strata_core::{Database, MemoryDatabase, VersionStore};
