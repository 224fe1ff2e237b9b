//! Step discovery and the validated step registry

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::error::{Error, Result};
use crate::sql_step::SqlFileStep;
use crate::step::{MigrationStep, StepFactory};
use crate::version::Version;

/// Default extension of step files discovered on disk
pub const DEFAULT_EXTENSION: &str = "sql";

/// How a step is constructed when it runs
#[derive(Clone)]
pub enum StepKind {
    /// Registered in code under its ordinal
    Factory(StepFactory),
    /// SQL file with `-- up` / `-- down` sections
    SqlFile(PathBuf),
}

impl std::fmt::Debug for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Factory(_) => f.write_str("Factory"),
            Self::SqlFile(path) => f.debug_tuple("SqlFile").field(path).finish(),
        }
    }
}

/// A step as reported by a source, before its ordinal is parsed
#[derive(Debug, Clone)]
pub struct StepEntry {
    /// Base name starting with the zero-padded ordinal, e.g. `001_create_users`
    pub name: String,
    /// Where the step came from (file path or registration label)
    pub location: String,
    pub kind: StepKind,
}

/// Enumerates the steps available to a registry
pub trait StepSource {
    fn entries(&self) -> Result<Vec<StepEntry>>;
}

/// Steps stored as numbered SQL files in one directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    extension: String,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn pattern(&self) -> Result<Regex> {
        Regex::new(&format!(r"^\d{{3}}.*\.{}$", regex::escape(&self.extension)))
            .map_err(|e| Error::InvalidArgument(format!("invalid step file extension: {}", e)))
    }
}

impl StepSource for DirectorySource {
    fn entries(&self) -> Result<Vec<StepEntry>> {
        if !self.dir.exists() {
            tracing::debug!("Migrations directory {:?} does not exist", self.dir);
            return Ok(Vec::new());
        }

        let pattern = self.pattern()?;
        let mut entries = Vec::new();

        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            // Follows symlinks
            if !path.is_file() {
                continue;
            }

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                tracing::warn!("Skipping step file with a non UTF-8 name: {:?}", path);
                continue;
            };
            if !pattern.is_match(name) {
                continue;
            }

            entries.push(StepEntry {
                name: name.to_string(),
                location: path.display().to_string(),
                kind: StepKind::SqlFile(path),
            });
        }

        tracing::debug!("Found {} step files in {:?}", entries.len(), self.dir);
        Ok(entries)
    }
}

/// Steps registered in code
#[derive(Default, Clone)]
pub struct StaticSource {
    entries: Vec<StepEntry>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a step constructor under `name`, e.g. `"002_add_email"`
    pub fn step<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn MigrationStep> + Send + Sync + 'static,
    {
        let name = name.into();
        self.entries.push(StepEntry {
            location: format!("static:{}", name),
            name,
            kind: StepKind::Factory(Arc::new(factory)),
        });
        self
    }

    /// Register a `Default`-constructible step type
    pub fn step_type<T>(self, name: impl Into<String>) -> Self
    where
        T: MigrationStep + Default + 'static,
    {
        self.step(name, || Box::new(T::default()))
    }
}

impl StepSource for StaticSource {
    fn entries(&self) -> Result<Vec<StepEntry>> {
        Ok(self.entries.clone())
    }
}

/// A discovered step with its ordinal
#[derive(Debug, Clone)]
pub struct StepDescriptor {
    pub ordinal: Version,
    pub name: String,
    pub location: String,
    pub kind: StepKind,
}

impl StepDescriptor {
    /// Construct a fresh instance of this step
    pub fn load(&self) -> Result<Box<dyn MigrationStep>> {
        match &self.kind {
            StepKind::Factory(factory) => Ok(factory()),
            StepKind::SqlFile(path) => Ok(Box::new(SqlFileStep::load(path)?)),
        }
    }
}

/// Extract the leading three-digit ordinal from a step name or path
pub fn parse_ordinal(name: &str) -> Result<Version> {
    static ORDINAL: OnceLock<Regex> = OnceLock::new();
    let pattern = ORDINAL.get_or_init(|| Regex::new(r"^(\d{3})").expect("valid ordinal regex"));

    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(name);

    pattern
        .captures(base)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| Error::Parse(format!("Migration name '{}' could not be parsed.", name)))
}

/// Validated, ordinal-ordered collection of every discoverable step
#[derive(Debug, Clone, Default)]
pub struct StepRegistry {
    steps: Vec<StepDescriptor>,
}

impl StepRegistry {
    /// A registry with no steps defined
    pub fn empty() -> Self {
        Self::default()
    }

    /// Discover and validate the steps of `source`
    pub fn discover(source: &dyn StepSource) -> Result<Self> {
        let mut steps = source
            .entries()?
            .into_iter()
            .map(|entry| {
                Ok(StepDescriptor {
                    ordinal: parse_ordinal(&entry.name)?,
                    name: entry.name,
                    location: entry.location,
                    kind: entry.kind,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        steps.sort_by(|a, b| a.ordinal.cmp(&b.ordinal).then_with(|| a.name.cmp(&b.name)));

        let registry = Self { steps };
        registry.validate()?;

        tracing::debug!(
            "Registered {} migrations (versions {}..={})",
            registry.len(),
            registry.min_version(),
            registry.max_version()
        );
        Ok(registry)
    }

    /// Discover the SQL step files in `dir`
    pub fn from_dir(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::discover(&DirectorySource::new(dir))
    }

    fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Ok(());
        }

        if self.min_version() != 1 {
            return Err(Error::Initialization(
                "First migration is not migration 1. Some migration files may be missing."
                    .to_string(),
            ));
        }

        let span = (self.max_version() - self.min_version() + 1) as usize;
        if span != self.steps.len() {
            return Err(Error::Initialization(
                "Migration count unexpected. Migration files may be missing. \
                 Migration numbers must be unique."
                    .to_string(),
            ));
        }

        Ok(())
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Lowest ordinal, or 0 when no steps exist
    pub fn min_version(&self) -> Version {
        self.steps.first().map(|s| s.ordinal).unwrap_or(0)
    }

    /// Highest ordinal, or 0 when no steps exist
    pub fn max_version(&self) -> Version {
        self.steps.last().map(|s| s.ordinal).unwrap_or(0)
    }

    /// Ordinal the next new step should use
    pub fn next_ordinal(&self) -> Version {
        self.max_version() + 1
    }

    pub fn describe(&self, ordinal: Version) -> Result<&StepDescriptor> {
        self.steps
            .iter()
            .find(|s| s.ordinal == ordinal)
            .ok_or(Error::NotFound(ordinal))
    }
}
