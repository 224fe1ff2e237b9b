//! Version, direction and run report types

use serde::Serialize;

/// Schema version; 0 means no migrations applied
pub type Version = u32;

/// Direction of a traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "up"),
            Self::Down => write!(f, "down"),
        }
    }
}

/// Ordered walk from the current version to a target version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub source_version: Version,
    pub target_version: Version,
    /// `None` when source and target are equal
    pub direction: Option<Direction>,
    /// Step ordinals in execution order
    pub ordinals: Vec<Version>,
}

impl MigrationPlan {
    /// Build the plan for moving from `source` to `target`
    pub fn between(source: Version, target: Version) -> Self {
        let (direction, ordinals) = if target > source {
            (Some(Direction::Up), ((source + 1)..=target).collect())
        } else if target < source {
            (Some(Direction::Down), ((target + 1)..=source).rev().collect())
        } else {
            (None, Vec::new())
        };

        Self {
            source_version: source,
            target_version: target,
            direction,
            ordinals,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ordinals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ordinals.len()
    }

    /// Version persisted after applying `ordinal` in this plan's direction
    pub fn version_after(&self, ordinal: Version) -> Version {
        match self.direction {
            Some(Direction::Down) => ordinal - 1,
            _ => ordinal,
        }
    }
}

/// Outcome of a completed `migrate` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub source_version: Version,
    pub final_version: Version,
    pub steps_executed: usize,
    pub direction: Option<Direction>,
}

impl RunResult {
    pub(crate) fn unchanged(version: Version) -> Self {
        Self {
            source_version: version,
            final_version: version,
            steps_executed: 0,
            direction: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_up() {
        let plan = MigrationPlan::between(1, 4);
        assert_eq!(plan.direction, Some(Direction::Up));
        assert_eq!(plan.ordinals, vec![2, 3, 4]);
        assert_eq!(plan.version_after(3), 3);
    }

    #[test]
    fn test_plan_down() {
        let plan = MigrationPlan::between(3, 0);
        assert_eq!(plan.direction, Some(Direction::Down));
        assert_eq!(plan.ordinals, vec![3, 2, 1]);
        assert_eq!(plan.version_after(1), 0);
    }

    #[test]
    fn test_plan_noop() {
        let plan = MigrationPlan::between(2, 2);
        assert!(plan.is_empty());
        assert_eq!(plan.direction, None);
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        let json = serde_json::to_string(&Direction::Down).unwrap();
        assert_eq!(json, "\"down\"");
    }
}
