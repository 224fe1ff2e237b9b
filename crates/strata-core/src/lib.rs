//! Strata Core - Sequential schema migration engine
//!
//! This crate provides the migration orchestrator, the step registry and
//! the traits a database backend implements to be migrated.

pub mod context;
pub mod database;
pub mod error;
pub mod memory;
pub mod migrator;
pub mod registry;
pub mod sql_step;
pub mod step;
pub mod version;

pub use context::MigrationContext;
pub use database::{Database, ResultSet, Row, Value, VersionStore};
pub use error::{Error, Result};
pub use memory::MemoryDatabase;
pub use migrator::Migrator;
pub use registry::{
    parse_ordinal, DirectorySource, StaticSource, StepDescriptor, StepEntry, StepKind,
    StepRegistry, StepSource,
};
pub use sql_step::SqlFileStep;
pub use step::{MigrationStep, StepFactory};
pub use version::{Direction, MigrationPlan, RunResult, Version};
