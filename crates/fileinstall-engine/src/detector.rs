//! Change detection for a single boolean health condition.

use fileinstall_core::Verdict;
use serde::Serialize;

/// The worker conditions a detector can track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthCheck {
    /// Last build had no error-severity problems
    BuildSuccess,
    /// Generated manifest exists in the build output
    ManifestPresent,
}

impl std::fmt::Display for HealthCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BuildSuccess => write!(f, "build"),
            Self::ManifestPresent => write!(f, "manifest"),
        }
    }
}

/// Turns fresh observations of a condition into change verdicts.
///
/// Starts unobserved, so the first evaluation always reports `Positive` or
/// `Negative`. Afterwards only a polarity flip is reported; repeated
/// evaluations of an unchanged condition return `Unchanged` and leave the
/// detector untouched.
#[derive(Debug, Clone)]
pub struct HealthDetector {
    check: HealthCheck,
    last: Option<bool>,
}

impl HealthDetector {
    /// Create an unobserved detector.
    pub fn new(check: HealthCheck) -> Self {
        Self { check, last: None }
    }

    /// Which condition this detector tracks.
    pub fn check(&self) -> HealthCheck {
        self.check
    }

    /// Run `probe` and compare its result with the previous observation.
    pub fn evaluate(&mut self, probe: impl FnOnce() -> bool) -> Verdict {
        let condition = probe();
        if self.last == Some(condition) {
            return Verdict::Unchanged;
        }
        self.last = Some(condition);
        Verdict::from_condition(condition)
    }

    /// Polarity of the last observation; false while unobserved.
    pub fn is_positive(&self) -> bool {
        self.last == Some(true)
    }

    /// Has the detector evaluated at least once?
    pub fn is_observed(&self) -> bool {
        self.last.is_some()
    }
}
