//! Scaffolding for new migration files

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use strata_core::{StepRegistry, Version};

/// Highest ordinal a three-digit file prefix can hold
pub const MAX_ORDINAL: Version = 999;

/// Replace everything except ASCII letters and digits with `_`
pub fn sanitize_name(name: &str) -> String {
    static UNSAFE: OnceLock<Regex> = OnceLock::new();
    let pattern = UNSAFE.get_or_init(|| Regex::new(r"[^a-zA-Z0-9]").expect("valid name regex"));
    pattern.replace_all(name.trim(), "_").into_owned()
}

pub fn file_name(ordinal: Version, name: &str) -> String {
    format!("{:03}_{}.sql", ordinal, name)
}

pub fn render_template(ordinal: Version, name: &str, created: DateTime<Utc>) -> String {
    format!(
        "-- Migration {:03}: {}\n\
         -- Created: {}\n\
         \n\
         -- up\n\
         \n\
         \n\
         -- down\n\
         \n",
        ordinal,
        name,
        created.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Write an empty migration numbered after the last one in `registry`
pub fn generate_step(dir: &Path, registry: &StepRegistry, name: &str) -> anyhow::Result<PathBuf> {
    let name = sanitize_name(name);
    if name.is_empty() {
        anyhow::bail!("Migration name cannot be empty");
    }

    let ordinal = registry.next_ordinal();
    if ordinal > MAX_ORDINAL {
        anyhow::bail!(
            "Cannot create migration {}: at most {} migrations are supported",
            ordinal,
            MAX_ORDINAL
        );
    }

    std::fs::create_dir_all(dir)?;
    let path = dir.join(file_name(ordinal, &name));
    if path.exists() {
        anyhow::bail!("Migration file {} already exists", path.display());
    }

    std::fs::write(&path, render_template(ordinal, &name, Utc::now()))?;
    tracing::info!("Created migration {}", path.display());
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_core::SqlFileStep;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("add user email"), "add_user_email");
        assert_eq!(sanitize_name("drop-legacy.tables!"), "drop_legacy_tables_");
        assert_eq!(sanitize_name("  v2  "), "v2");
    }

    #[test]
    fn test_template_is_an_empty_step() {
        let content = render_template(4, "add_index", Utc::now());
        assert!(content.starts_with("-- Migration 004: add_index"));

        let step = SqlFileStep::parse(&content).unwrap();
        assert!(step.up_sql.is_empty());
        assert!(step.down_sql.is_empty());
    }

    #[test]
    fn test_generate_numbers_sequentially() {
        let dir = tempfile::tempdir().unwrap();

        let first = generate_step(dir.path(), &StepRegistry::empty(), "create users").unwrap();
        assert_eq!(first.file_name().unwrap(), "001_create_users.sql");

        let registry = StepRegistry::from_dir(dir.path()).unwrap();
        let second = generate_step(dir.path(), &registry, "add email").unwrap();
        assert_eq!(second.file_name().unwrap(), "002_add_email.sql");

        let registry = StepRegistry::from_dir(dir.path()).unwrap();
        assert_eq!(registry.max_version(), 2);
    }

    #[test]
    fn test_generate_stops_at_three_digits() {
        let dir = tempfile::tempdir().unwrap();
        for ordinal in 1..=MAX_ORDINAL {
            std::fs::write(dir.path().join(file_name(ordinal, "step")), "-- up\n").unwrap();
        }

        let registry = StepRegistry::from_dir(dir.path()).unwrap();
        let err = generate_step(dir.path(), &registry, "one more").unwrap_err();
        assert!(err.to_string().contains("at most 999 migrations"));
    }

    #[test]
    fn test_generate_rejects_empty_name() {
        let dir = tempfile::tempdir().unwrap();
        assert!(generate_step(dir.path(), &StepRegistry::empty(), "   ").is_err());
    }
}
