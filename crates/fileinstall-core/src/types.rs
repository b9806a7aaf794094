//! Shared type definitions used across fileinstall crates.

use serde::{Deserialize, Serialize};

/// Unique name of a workspace unit.
pub type UnitName = String;

/// Nature that marks a unit as a master (descriptor owner).
pub const MASTER_NATURE: &str = "fileinstall";

/// Nature that marks a unit as buildable, a prerequisite for being a worker.
pub const BUILD_NATURE: &str = "java";

/// Tri-state outcome of comparing a fresh observation with the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// Condition holds now and did not before (or was never observed)
    Positive,
    /// Condition fails now and did not before (or was never observed)
    Negative,
    /// Same polarity as the previous observation
    Unchanged,
}

impl Verdict {
    /// Map a raw condition to its polarity verdict.
    pub fn from_condition(condition: bool) -> Self {
        if condition { Self::Positive } else { Self::Negative }
    }

    /// Returns true for `Positive` or `Negative`.
    pub fn is_change(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positive => write!(f, "positive"),
            Self::Negative => write!(f, "negative"),
            Self::Unchanged => write!(f, "unchanged"),
        }
    }
}

/// Maximum problem severity reported by the last build of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// No problems recorded
    #[default]
    None,
    /// Warnings only
    Warning,
    /// At least one error
    Error,
}

impl Severity {
    /// Returns true if the build counts as successful (no error-severity problems).
    pub fn is_build_success(&self) -> bool {
        *self != Self::Error
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Phase announced by a build report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildPhase {
    /// Build is about to start
    Started,
    /// Build finished (successfully or not)
    Finished,
    /// Clean is starting
    Clean,
}

impl std::fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Finished => write!(f, "finished"),
            Self::Clean => write!(f, "clean"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_from_condition() {
        assert_eq!(Verdict::from_condition(true), Verdict::Positive);
        assert_eq!(Verdict::from_condition(false), Verdict::Negative);
        assert!(Verdict::Positive.is_change());
        assert!(!Verdict::Unchanged.is_change());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::None);
        assert!(Severity::Warning.is_build_success());
        assert!(!Severity::Error.is_build_success());
    }

    #[test]
    fn test_build_phase_serde() {
        let phase: BuildPhase = serde_json::from_str("\"finished\"").unwrap();
        assert_eq!(phase, BuildPhase::Finished);
        assert_eq!(BuildPhase::Clean.to_string(), "clean");
    }
}
