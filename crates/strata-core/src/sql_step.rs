//! Migration steps written as plain SQL files
//!
//! A step file holds an `-- up` section followed by a `-- down` section:
//!
//! ```sql
//! -- up
//! CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);
//!
//! -- down
//! DROP TABLE users;
//! ```

use std::path::Path;

use crate::context::MigrationContext;
use crate::error::{Error, Result};
use crate::step::MigrationStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Up,
    Down,
}

/// A step whose `up`/`down` bodies are SQL batches
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFileStep {
    pub up_sql: String,
    pub down_sql: String,
}

impl SqlFileStep {
    /// Read and parse a step file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
            .map_err(|e| Error::Parse(format!("{}: {}", path.display(), parse_message(e))))
    }

    /// Split file content into its up and down sections
    pub fn parse(content: &str) -> Result<Self> {
        let mut section = Section::Preamble;
        let mut seen_up = false;
        let mut up = Vec::new();
        let mut down = Vec::new();

        for line in content.lines() {
            let marker = line
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ")
                .to_lowercase();
            if marker == "-- up" {
                section = Section::Up;
                seen_up = true;
                continue;
            }
            if marker == "-- down" {
                section = Section::Down;
                continue;
            }

            match section {
                Section::Up => up.push(line),
                Section::Down => down.push(line),
                Section::Preamble => {}
            }
        }

        if !seen_up {
            return Err(Error::Parse("missing `-- up` section".to_string()));
        }

        Ok(Self {
            up_sql: up.join("\n").trim().to_string(),
            down_sql: down.join("\n").trim().to_string(),
        })
    }
}

fn parse_message(err: Error) -> String {
    match err {
        Error::Parse(message) => message,
        other => other.to_string(),
    }
}

impl MigrationStep for SqlFileStep {
    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        if self.up_sql.is_empty() {
            ctx.diag("empty up section");
            return Ok(());
        }
        ctx.execute_batch(&self.up_sql)
    }

    fn down(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        if self.down_sql.is_empty() {
            ctx.diag("empty down section");
            return Ok(());
        }
        ctx.execute_batch(&self.down_sql)
    }
}
