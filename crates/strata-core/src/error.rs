//! Error types for Strata Core

use thiserror::Error;

use crate::version::{Direction, Version};

/// Result type alias using Strata's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Strata error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Migration {0} not found")]
    NotFound(Version),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "Migration {ordinal} failed while migrating {direction} \
         (schema left at version {version}): {source}"
    )]
    Step {
        ordinal: Version,
        direction: Direction,
        version: Version,
        steps_executed: usize,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap an arbitrary error raised from a step body
    pub fn other<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Other(err.into())
    }

    /// The error a failing step raised, unwrapped from the traversal context
    pub fn step_source(&self) -> Option<&Error> {
        match self {
            Self::Step { source, .. } => Some(source),
            _ => None,
        }
    }

    /// Version the schema was left at when a traversal aborted
    pub fn reached_version(&self) -> Option<Version> {
        match self {
            Self::Step { version, .. } => Some(*version),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_error_exposes_source_and_version() {
        let err = Error::Step {
            ordinal: 2,
            direction: Direction::Up,
            version: 1,
            steps_executed: 1,
            source: Box::new(Error::Database("no such table: users".into())),
        };

        assert_eq!(err.reached_version(), Some(1));
        assert!(matches!(err.step_source(), Some(Error::Database(_))));
        let message = err.to_string();
        assert!(message.contains("Migration 2 failed while migrating up"));
        assert!(message.contains("version 1"));
    }

    #[test]
    fn test_other_is_transparent() {
        let err = Error::other("custom failure");
        assert_eq!(err.to_string(), "custom failure");
        assert!(err.reached_version().is_none());
    }
}
