//! Tracked worker units.

use std::sync::{Mutex, MutexGuard, PoisonError};

use fileinstall_config::CheckFlags;
use fileinstall_core::workspace::has_file;
use fileinstall_core::{Verdict, Workspace};
use tracing::debug;

use crate::detector::{HealthCheck, HealthDetector};

/// Verdicts of one classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// Build-success detector verdict
    pub build: Verdict,
    /// Manifest-present detector verdict
    pub manifest: Verdict,
}

#[derive(Debug)]
struct Detectors {
    build: HealthDetector,
    manifest: HealthDetector,
}

/// Health state of one worker unit.
///
/// The detectors sit behind a mutex only so the state can be shared through
/// the registry; classification of a given worker is never expected to run
/// concurrently.
#[derive(Debug)]
pub struct WorkerState {
    name: String,
    detectors: Mutex<Detectors>,
}

impl WorkerState {
    /// Create an unobserved worker.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            detectors: Mutex::new(Detectors {
                build: HealthDetector::new(HealthCheck::BuildSuccess),
                manifest: HealthDetector::new(HealthCheck::ManifestPresent),
            }),
        }
    }

    /// Worker unit name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn detectors(&self) -> MutexGuard<'_, Detectors> {
        self.detectors.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Probe both conditions once and report what changed.
    pub fn refresh_and_classify(&self, workspace: &dyn Workspace) -> Classification {
        let mut detectors = self.detectors();
        let manifest = detectors
            .manifest
            .evaluate(|| probe_manifest(workspace, &self.name));
        let build = detectors
            .build
            .evaluate(|| probe_build_success(workspace, &self.name));
        debug!(worker = %self.name, %build, %manifest, "worker classified");
        Classification { build, manifest }
    }

    /// Cached polarity of the build-success detector.
    pub fn is_build_success(&self) -> bool {
        self.detectors().build.is_positive()
    }

    /// Cached polarity of the manifest-present detector.
    pub fn is_manifest_present(&self) -> bool {
        self.detectors().manifest.is_positive()
    }

    /// True iff every enabled worker check is currently positive.
    pub fn is_healthy(&self, checks: &CheckFlags) -> bool {
        let detectors = self.detectors();
        (!checks.worker_build_success || detectors.build.is_positive())
            && (!checks.worker_manifest_present || detectors.manifest.is_positive())
    }
}

/// Did the last build of `unit` finish without errors?
pub fn probe_build_success(workspace: &dyn Workspace, unit: &str) -> bool {
    workspace.max_severity(unit).is_build_success()
}

/// Is the generated manifest of `unit` on disk? Probe failures count as absent.
pub fn probe_manifest(workspace: &dyn Workspace, unit: &str) -> bool {
    match workspace.manifest_path(unit) {
        Ok(path) => has_file(&path),
        Err(e) => {
            debug!(worker = unit, "manifest probe failed, treating as absent: {}", e);
            false
        }
    }
}
