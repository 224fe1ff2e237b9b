//! Migration orchestrator
//!
//! The migrator walks the schema from its current version to a target
//! version one step at a time. Every step runs in its own transaction
//! together with the version update, so a failure part-way through leaves
//! the schema at the last version that committed.

use crate::context::{DiagHook, MigrationContext};
use crate::database::{Database, VersionStore};
use crate::error::{Error, Result};
use crate::registry::{StepRegistry, StepSource};
use crate::version::{Direction, MigrationPlan, RunResult, Version};

/// Runs migration steps against a database
pub struct Migrator<D> {
    db: D,
    registry: StepRegistry,
    diag: Option<Box<DiagHook>>,
}

impl<D: Database + VersionStore> Migrator<D> {
    pub fn new(db: D, registry: StepRegistry) -> Self {
        Self {
            db,
            registry,
            diag: None,
        }
    }

    /// Discover steps from `source` and build a migrator over them
    pub fn from_source(db: D, source: &dyn StepSource) -> Result<Self> {
        Ok(Self::new(db, StepRegistry::discover(source)?))
    }

    /// Receive every `diag` message emitted by running steps
    pub fn on_diag<F>(mut self, hook: F) -> Self
    where
        F: Fn(Version, &str) + Send + Sync + 'static,
    {
        self.diag = Some(Box::new(hook));
        self
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn into_database(self) -> D {
        self.db
    }

    pub fn registry(&self) -> &StepRegistry {
        &self.registry
    }

    pub fn min_version(&self) -> Version {
        self.registry.min_version()
    }

    pub fn max_version(&self) -> Version {
        self.registry.max_version()
    }

    /// Current schema version, initializing the record on first use
    pub fn current_version(&self) -> Result<Version> {
        self.db.current_version()
    }

    /// Check a requested target against the available steps
    ///
    /// `None` selects the latest version.
    pub fn resolve_target(&self, target: Option<i64>) -> Result<Version> {
        let max_version = self.max_version();
        match target {
            None => Ok(max_version),
            Some(target) => Version::try_from(target)
                .ok()
                .filter(|v| *v <= max_version)
                .ok_or_else(|| {
                    Error::InvalidArgument(format!("Migration {} does not exist.", target))
                }),
        }
    }

    /// Work out which steps `migrate(target)` would run, without running them
    pub fn plan(&self, target: Option<i64>) -> Result<MigrationPlan> {
        let target = self.resolve_target(target)?;
        let source = self.current_version()?;
        Ok(MigrationPlan::between(source, target))
    }

    /// Migrate to the latest available version
    pub fn migrate_latest(&self) -> Result<RunResult> {
        self.migrate(None)
    }

    /// Migrate the schema to `target`, or to the latest version if `None`
    pub fn migrate(&self, target: Option<i64>) -> Result<RunResult> {
        let plan = self.plan(target)?;

        let Some(direction) = plan.direction else {
            tracing::debug!("Schema already at version {}", plan.source_version);
            return Ok(RunResult::unchanged(plan.source_version));
        };

        tracing::info!(
            "Migrating schema {} from v{} to v{}",
            direction,
            plan.source_version,
            plan.target_version
        );

        let mut version = plan.source_version;
        let mut steps_executed = 0;

        for &ordinal in &plan.ordinals {
            let next = plan.version_after(ordinal);

            if let Err(source) = self.apply(ordinal, direction, next) {
                tracing::error!(
                    "Migration {:03} failed; schema remains at version {}",
                    ordinal,
                    version
                );
                return Err(Error::Step {
                    ordinal,
                    direction,
                    version,
                    steps_executed,
                    source: Box::new(source),
                });
            }

            version = next;
            steps_executed += 1;
            tracing::info!("Migrated to schema version {}", version);
        }

        Ok(RunResult {
            source_version: plan.source_version,
            final_version: version,
            steps_executed,
            direction: Some(direction),
        })
    }

    /// Run one step and its version update in a single transaction
    fn apply(&self, ordinal: Version, direction: Direction, next: Version) -> Result<()> {
        self.db.begin()?;

        let outcome = self
            .run_step(ordinal, direction, next)
            .and_then(|()| self.db.commit());

        if let Err(err) = outcome {
            tracing::warn!("Rolling back migration {:03} ({})", ordinal, direction);
            if let Err(rollback_err) = self.db.rollback() {
                tracing::error!(
                    "Rollback of migration {:03} failed: {}",
                    ordinal,
                    rollback_err
                );
            }
            return Err(err);
        }

        Ok(())
    }

    fn run_step(&self, ordinal: Version, direction: Direction, next: Version) -> Result<()> {
        let step = self.registry.describe(ordinal)?.load()?;
        let ctx = MigrationContext::new(&self.db, ordinal).with_diag(self.diag.as_deref());

        tracing::debug!("Running migration {:03} {}", ordinal, direction);
        let outcome = match direction {
            Direction::Up => step.up(&ctx),
            Direction::Down => step.down(&ctx),
        };

        // Unwind sub-transactions the step left open so the rollback or
        // commit below applies to the step's own transaction
        let open = ctx.open_transactions();
        let mut unwind_err = None;
        for _ in 0..open {
            if let Err(err) = self.db.rollback() {
                tracing::error!(
                    "Unwinding a sub-transaction of migration {:03} failed: {}",
                    ordinal,
                    err
                );
                unwind_err.get_or_insert(err);
            }
        }
        outcome?;
        if let Some(err) = unwind_err {
            return Err(err);
        }

        if open > 0 {
            return Err(Error::Transaction(format!(
                "migration {:03} left {} sub-transaction(s) open",
                ordinal, open
            )));
        }

        self.db.set_version(next)
    }
}
