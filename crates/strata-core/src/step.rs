//! Migration step contract

use std::sync::Arc;

use crate::context::MigrationContext;
use crate::error::Result;

/// One reversible unit of schema change
///
/// Steps are constructed fresh for every invocation and dropped afterwards.
/// The database handle, the step's ordinal and the helper operations are
/// reached through the [`MigrationContext`] passed to each call.
pub trait MigrationStep {
    /// Bring the schema up to this step's version from the previous one
    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()>;

    /// Undo exactly what `up` did
    fn down(&self, ctx: &MigrationContext<'_>) -> Result<()>;
}

/// Constructor registered for a step under its ordinal
pub type StepFactory = Arc<dyn Fn() -> Box<dyn MigrationStep> + Send + Sync>;
