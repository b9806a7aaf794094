//! The activation engine.
//!
//! Reacts to unit lifecycle and build events, keeps the [`Registry`] in sync
//! with the workspace and decides when a worker's descriptors are written or
//! removed. All handlers are synchronous and infallible from the caller's
//! point of view: failures are logged and the handler moves on.

use std::sync::Arc;

use fileinstall_config::CheckFlags;
use fileinstall_core::workspace::has_file;
use fileinstall_core::{Verdict, Workspace};
use tracing::{debug, info, warn};

use crate::master::MasterState;
use crate::registry::Registry;
use crate::status::{DescriptorStatus, EngineStatus, MasterStatus, WorkerStatus};
use crate::worker::{Classification, WorkerState};

/// What the engine should do with a worker after a classification pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Ignore,
    Activate,
    Deactivate,
}

/// Result of running a worker through the decision rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The unit is not a tracked worker
    Untracked,
    /// No enabled check changed
    Ignored,
    /// Descriptors written; carries the number of matching masters
    Activated(usize),
    /// Descriptors removed; carries the number of matching masters
    Deactivated(usize),
}

/// Apply the enabled-checks policy to one classification.
///
/// Only enabled checks whose verdict changed are counted. No change is a
/// no-op; any negative change deactivates, even alongside a positive one.
pub fn decide(classification: Classification, checks: &CheckFlags) -> Action {
    let mut positive = 0;
    let mut negative = 0;
    let enabled = [
        (checks.worker_build_success, classification.build),
        (checks.worker_manifest_present, classification.manifest),
    ];
    for (_, verdict) in enabled.into_iter().filter(|(on, _)| *on) {
        match verdict {
            Verdict::Positive => positive += 1,
            Verdict::Negative => negative += 1,
            Verdict::Unchanged => {}
        }
    }

    if positive == 0 && negative == 0 {
        Action::Ignore
    } else if negative > 0 {
        Action::Deactivate
    } else {
        Action::Activate
    }
}

pub struct Engine {
    workspace: Arc<dyn Workspace>,
    registry: Registry,
}

impl Engine {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self {
            workspace,
            registry: Registry::new(),
        }
    }

    pub fn workspace(&self) -> &dyn Workspace {
        self.workspace.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn master_units(&self) -> Vec<String> {
        match self.workspace.list_units() {
            Ok(units) => units
                .into_iter()
                .filter(|u| self.workspace.is_master(u))
                .collect(),
            Err(e) => {
                warn!("Failed to list workspace units: {}", e);
                Vec::new()
            }
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Startup scan: forget everything, then activate every open master.
    pub fn start(&self) {
        self.registry.clear();
        let masters = self.master_units();
        info!(count = masters.len(), "Starting engine");
        for unit in masters {
            self.handle_create(&unit);
        }
    }

    /// Deactivate every known master, then forget everything.
    pub fn stop(&self) {
        let masters = self.registry.masters();
        info!(count = masters.len(), "Stopping engine");
        for master in masters {
            self.handle_delete(master.name());
        }
        self.registry.clear();
    }

    /// Track existing masters and their required workers without touching
    /// any descriptor.
    ///
    /// Workers are observed once so their cached health is meaningful.
    /// Returns the number of masters found.
    pub fn scan(&self) -> usize {
        let masters = self.master_units();
        for unit in &masters {
            self.registry
                .master_or_insert(unit, || MasterState::new(unit, self.workspace.unit_path(unit)));
        }
        for master in self.registry.masters() {
            for dep in master.dependencies() {
                if self.is_worker_candidate(&dep) {
                    let (worker, _) = self.registry.worker_or_insert(&dep);
                    worker.refresh_and_classify(self.workspace());
                }
            }
        }
        debug!(
            masters = masters.len(),
            workers = self.registry.workers().len(),
            "Workspace scanned"
        );
        masters.len()
    }

    // =========================================================================
    // Unit lifecycle events
    // =========================================================================

    /// A unit was created or opened.
    pub fn handle_create(&self, unit: &str) {
        debug!(unit, "handle create");
        if self.workspace.is_master(unit) {
            self.master_create(unit);
        }
        self.worker_create(unit);
    }

    /// A unit was deleted or closed.
    pub fn handle_delete(&self, unit: &str) {
        debug!(unit, "handle delete");
        self.master_delete(unit);
        self.worker_delete(unit);
    }

    /// A unit's descriptor changed: it may have been closed or lost a role.
    pub fn handle_change(&self, unit: &str) {
        debug!(unit, "handle change");
        if !self.workspace.unit_is_open(unit) {
            self.handle_delete(unit);
            return;
        }
        if self.registry.master(unit).is_some() && !self.workspace.is_master(unit) {
            self.master_delete(unit);
        }
        if self.registry.has_worker(unit) && !self.workspace.is_buildable(unit) {
            self.worker_delete(unit);
        }
        self.handle_create(unit);
    }

    // =========================================================================
    // Build events
    // =========================================================================

    pub fn build_about_to_start(&self, unit: &str) {
        if self.is_tracked_worker(unit) {
            debug!(worker = unit, "Build about to start");
        }
    }

    /// A build of `unit` completed: reclassify and fan out.
    pub fn build_finished(&self, unit: &str) -> Outcome {
        let Some(worker) = self.registry.worker(unit) else {
            debug!(unit, "Build finished for untracked unit, ignoring");
            return Outcome::Untracked;
        };
        self.classify(&worker)
    }

    pub fn clean_starting(&self, unit: &str) {
        if self.is_tracked_worker(unit) {
            debug!(worker = unit, "Clean starting");
        }
    }

    /// Register `unit` as a fresh master, dropping any state left by a
    /// previous [`scan`](Self::scan), and deploy its healthy dependencies.
    pub fn activate_master(&self, unit: &str) {
        if self.registry.remove_master(unit).is_some() {
            debug!(master = unit, "Replacing scanned master state");
        }
        self.handle_create(unit);
    }

    /// Is `unit` currently tracked as a worker?
    pub fn is_tracked_worker(&self, unit: &str) -> bool {
        self.registry.has_worker(unit)
    }

    /// Is `unit` currently tracked as a master?
    pub fn has_master(&self, unit: &str) -> bool {
        self.registry.master(unit).is_some()
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn is_worker_candidate(&self, unit: &str) -> bool {
        self.workspace.unit_is_open(unit) && self.workspace.is_buildable(unit)
    }

    fn master_create(&self, unit: &str) {
        let (master, created) = self
            .registry
            .master_or_insert(unit, || MasterState::new(unit, self.workspace.unit_path(unit)));
        if !created {
            debug!(master = unit, "Master already registered");
            return;
        }
        info!(master = unit, "Master registered");

        if let Err(e) = master.ensure_configuration_extracted() {
            warn!(master = unit, "Failed to extract default configuration: {}", e);
        }
        if let Err(e) = master.conf() {
            warn!(master = unit, "Skipping master, configuration failed to load: {}", e);
            return;
        }

        // Tracked workers keep their last verdict; only healthy ones deploy.
        let checks = self.registry.check_flags();
        let count = master.create_all_descriptors(self.workspace(), |dep| {
            self.registry
                .worker(dep)
                .is_none_or(|worker| worker.is_healthy(&checks))
        });
        info!(master = unit, count, "Master activated");

        for dep in master.dependencies() {
            self.worker_create(&dep);
        }
    }

    fn master_delete(&self, unit: &str) {
        let Some(master) = self.registry.remove_master(unit) else {
            return;
        };
        let count = master.delete_all_descriptors(self.workspace());
        info!(master = unit, count, "Master removed");
    }

    fn worker_create(&self, unit: &str) -> Outcome {
        if !self.is_worker_candidate(unit) || !self.registry.is_worker_required(unit) {
            return Outcome::Untracked;
        }
        let (worker, created) = self.registry.worker_or_insert(unit);
        if created {
            info!(worker = unit, "Worker registered");
        }
        self.classify(&worker)
    }

    fn worker_delete(&self, unit: &str) {
        if self.registry.remove_worker(unit).is_none() {
            return;
        }
        let count = self.registry.deactivate_worker(self.workspace(), unit);
        info!(worker = unit, count, "Worker removed");
    }

    fn classify(&self, worker: &WorkerState) -> Outcome {
        let classification = worker.refresh_and_classify(self.workspace());
        let checks = self.registry.check_flags();
        let name = worker.name();

        match decide(classification, &checks) {
            Action::Ignore => {
                info!(worker = name, "Worker ignored, no enabled check changed");
                Outcome::Ignored
            }
            Action::Activate => {
                let count = self.registry.activate_worker(self.workspace(), name);
                info!(worker = name, count, "Worker activated");
                Outcome::Activated(count)
            }
            Action::Deactivate => {
                let count = self.registry.deactivate_worker(self.workspace(), name);
                info!(worker = name, count, "Worker deactivated");
                Outcome::Deactivated(count)
            }
        }
    }

    /// Serializable view of the registry, with descriptor presence read from disk.
    pub fn snapshot(&self) -> EngineStatus {
        let workspace = self.workspace();
        let checks = self.registry.check_flags();
        let masters = self.registry.masters();

        let master_status = masters
            .iter()
            .map(|master| {
                let config_error = master.conf().err().map(|e| e.to_string());
                let dependencies = master.dependencies();
                let descriptors = dependencies
                    .iter()
                    .map(|worker| {
                        let path = master.descriptor_file(workspace, worker).ok();
                        let present = path.as_deref().is_some_and(has_file);
                        DescriptorStatus {
                            worker: worker.clone(),
                            path,
                            present,
                        }
                    })
                    .collect();
                MasterStatus {
                    name: master.name().to_string(),
                    dependencies,
                    descriptors,
                    config_error,
                }
            })
            .collect();

        let worker_status = self
            .registry
            .workers()
            .iter()
            .map(|worker| WorkerStatus {
                name: worker.name().to_string(),
                build_success: worker.is_build_success(),
                manifest_present: worker.is_manifest_present(),
                healthy: worker.is_healthy(&checks),
                required_by: masters
                    .iter()
                    .filter(|m| m.requires(worker.name()))
                    .map(|m| m.name().to_string())
                    .collect(),
            })
            .collect();

        EngineStatus {
            workspace: workspace.root_path().to_path_buf(),
            checks,
            masters: master_status,
            workers: worker_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileinstall_config::CONF_FILE;
    use fileinstall_core::workspace::MANIFEST_PATH;
    use fileinstall_core::{BuildPhase, BuildReport, DirWorkspace};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    const BOTH: CheckFlags = CheckFlags {
        master_deploy_present: false,
        master_launch_running: false,
        worker_build_success: true,
        worker_manifest_present: true,
    };

    fn verdicts(build: Verdict, manifest: Verdict) -> Classification {
        Classification { build, manifest }
    }

    #[test]
    fn test_decide_no_change_is_ignore() {
        let c = verdicts(Verdict::Unchanged, Verdict::Unchanged);
        assert_eq!(decide(c, &BOTH), Action::Ignore);
    }

    #[test]
    fn test_decide_negative_dominates() {
        assert_eq!(
            decide(verdicts(Verdict::Positive, Verdict::Negative), &BOTH),
            Action::Deactivate
        );
        assert_eq!(
            decide(verdicts(Verdict::Negative, Verdict::Positive), &BOTH),
            Action::Deactivate
        );
        assert_eq!(
            decide(verdicts(Verdict::Negative, Verdict::Unchanged), &BOTH),
            Action::Deactivate
        );
    }

    #[test]
    fn test_decide_positive_activates() {
        assert_eq!(
            decide(verdicts(Verdict::Positive, Verdict::Unchanged), &BOTH),
            Action::Activate
        );
        assert_eq!(
            decide(verdicts(Verdict::Positive, Verdict::Positive), &BOTH),
            Action::Activate
        );
    }

    #[test]
    fn test_decide_disabled_checks_do_not_count() {
        let build_only = CheckFlags {
            worker_build_success: true,
            ..Default::default()
        };
        assert_eq!(
            decide(verdicts(Verdict::Positive, Verdict::Negative), &build_only),
            Action::Activate
        );
        assert_eq!(
            decide(verdicts(Verdict::Unchanged, Verdict::Negative), &build_only),
            Action::Ignore
        );
        assert_eq!(
            decide(verdicts(Verdict::Negative, Verdict::Negative), &CheckFlags::default()),
            Action::Ignore
        );
    }

    fn unit(root: &Path, name: &str, yaml: &str) {
        fs::create_dir_all(root.join(name)).unwrap();
        fs::write(root.join(name).join(".unit.yaml"), yaml).unwrap();
    }

    fn healthy_worker(root: &Path, name: &str) {
        unit(root, name, "natures: [java]\n");
        let manifest = root.join(name).join("target/classes").join(MANIFEST_PATH);
        fs::create_dir_all(manifest.parent().unwrap()).unwrap();
        fs::write(manifest, "Manifest-Version: 1.0\n").unwrap();
    }

    fn engine(tmp: &TempDir) -> (Arc<DirWorkspace>, Engine) {
        let ws = Arc::new(DirWorkspace::new(tmp.path()).unwrap());
        let engine = Engine::new(ws.clone());
        (ws, engine)
    }

    #[test]
    fn test_start_activates_healthy_dependencies() {
        let tmp = TempDir::new().unwrap();
        unit(tmp.path(), "m", "natures: [fileinstall]\n");
        fs::write(tmp.path().join("m").join(CONF_FILE), "dependencies: [w]\n").unwrap();
        healthy_worker(tmp.path(), "w");
        let (_ws, engine) = engine(&tmp);

        engine.start();
        assert!(engine.has_master("m"));
        assert!(engine.is_tracked_worker("w"));
        assert!(tmp.path().join("m/deploy/w.cfg").is_file());

        engine.stop();
        assert!(!engine.has_master("m"));
        assert!(!engine.is_tracked_worker("w"));
        assert!(!tmp.path().join("m/deploy/w.cfg").exists());
    }

    #[test]
    fn test_master_create_extracts_default_configuration() {
        let tmp = TempDir::new().unwrap();
        unit(tmp.path(), "m", "natures: [fileinstall]\n");
        let (_ws, engine) = engine(&tmp);

        engine.handle_create("m");
        assert!(engine.has_master("m"));
        assert!(tmp.path().join("m").join(CONF_FILE).is_file());
    }

    #[test]
    fn test_broken_configuration_skips_fan_out() {
        let tmp = TempDir::new().unwrap();
        unit(tmp.path(), "m", "natures: [fileinstall]\n");
        fs::write(tmp.path().join("m").join(CONF_FILE), "dependencies: [w\n").unwrap();
        healthy_worker(tmp.path(), "w");
        let (_ws, engine) = engine(&tmp);

        engine.handle_create("m");
        assert!(!engine.is_tracked_worker("w"));
        assert!(!tmp.path().join("m/deploy").exists());
        assert!(engine.snapshot().masters[0].config_error.is_some());
    }

    #[test]
    fn test_change_to_closed_deletes() {
        let tmp = TempDir::new().unwrap();
        unit(tmp.path(), "m", "natures: [fileinstall]\n");
        fs::write(tmp.path().join("m").join(CONF_FILE), "dependencies: [w]\n").unwrap();
        healthy_worker(tmp.path(), "w");
        let (_ws, engine) = engine(&tmp);
        engine.start();
        assert!(tmp.path().join("m/deploy/w.cfg").is_file());

        unit(tmp.path(), "w", "open: false\nnatures: [java]\n");
        engine.handle_change("w");
        assert!(!engine.is_tracked_worker("w"));
        assert!(!tmp.path().join("m/deploy/w.cfg").exists());

        unit(tmp.path(), "w", "natures: [java]\n");
        engine.handle_change("w");
        assert!(engine.is_tracked_worker("w"));
        assert!(tmp.path().join("m/deploy/w.cfg").is_file());
    }

    #[test]
    fn test_change_dropping_master_nature_removes_master() {
        let tmp = TempDir::new().unwrap();
        unit(tmp.path(), "m", "natures: [fileinstall]\n");
        fs::write(tmp.path().join("m").join(CONF_FILE), "dependencies: [w]\n").unwrap();
        healthy_worker(tmp.path(), "w");
        let (ws, engine) = engine(&tmp);
        engine.start();

        assert!(ws.remove_nature("m", "fileinstall").unwrap());
        engine.handle_change("m");
        assert!(!engine.has_master("m"));
        assert!(!tmp.path().join("m/deploy/w.cfg").exists());
    }

    fn failing(ws: &DirWorkspace, name: &str) {
        ws.reports()
            .write_report(&BuildReport::new(name, BuildPhase::Finished).with_problems(3, 0))
            .unwrap();
    }

    #[test]
    fn test_registered_master_does_not_redeploy_failing_worker() {
        let tmp = TempDir::new().unwrap();
        unit(tmp.path(), "m", "natures: [fileinstall]\n");
        fs::write(tmp.path().join("m").join(CONF_FILE), "dependencies: [w]\n").unwrap();
        healthy_worker(tmp.path(), "w");
        let (ws, engine) = engine(&tmp);
        let descriptor = tmp.path().join("m/deploy/w.cfg");
        engine.start();
        assert!(descriptor.is_file());

        failing(&ws, "w");
        assert_eq!(engine.build_finished("w"), Outcome::Deactivated(1));
        assert!(!descriptor.exists());

        engine.handle_change("m");
        assert!(engine.has_master("m"));
        assert!(!descriptor.exists());

        engine.handle_delete("m");
        engine.handle_create("m");
        assert!(engine.has_master("m"));
        assert!(!descriptor.exists());

        ws.reports()
            .write_report(&BuildReport::new("w", BuildPhase::Finished))
            .unwrap();
        assert_eq!(engine.build_finished("w"), Outcome::Activated(1));
        assert!(descriptor.is_file());
    }

    #[test]
    fn test_activate_master_after_scan_deploys_only_healthy() {
        let tmp = TempDir::new().unwrap();
        unit(tmp.path(), "m", "natures: [fileinstall]\n");
        fs::write(tmp.path().join("m").join(CONF_FILE), "dependencies: [good, bad]\n").unwrap();
        healthy_worker(tmp.path(), "good");
        healthy_worker(tmp.path(), "bad");
        let (ws, engine) = engine(&tmp);
        failing(&ws, "bad");

        assert_eq!(engine.scan(), 1);
        engine.handle_create("m");
        assert!(!tmp.path().join("m/deploy").exists());

        engine.activate_master("m");
        assert!(tmp.path().join("m/deploy/good.cfg").is_file());
        assert!(!tmp.path().join("m/deploy/bad.cfg").exists());
    }

    #[test]
    fn test_worker_without_master_is_not_tracked() {
        let tmp = TempDir::new().unwrap();
        healthy_worker(tmp.path(), "w");
        let (_ws, engine) = engine(&tmp);

        engine.handle_create("w");
        assert!(!engine.is_tracked_worker("w"));
        assert_eq!(engine.build_finished("w"), Outcome::Untracked);
    }

    #[test]
    fn test_scan_writes_nothing() {
        let tmp = TempDir::new().unwrap();
        unit(tmp.path(), "m", "natures: [fileinstall]\n");
        fs::write(tmp.path().join("m").join(CONF_FILE), "dependencies: [w, gone]\n").unwrap();
        healthy_worker(tmp.path(), "w");
        let (ws, engine) = engine(&tmp);
        ws.reports()
            .write_report(&BuildReport::new("w", BuildPhase::Finished))
            .unwrap();

        assert_eq!(engine.scan(), 1);
        assert!(engine.is_tracked_worker("w"));
        assert!(!engine.is_tracked_worker("gone"));
        assert!(!tmp.path().join("m/deploy").exists());

        let status = engine.snapshot();
        assert_eq!(status.masters[0].dependencies, vec!["w", "gone"]);
        assert_eq!(status.descriptor_count(), 0);
        assert!(status.workers[0].healthy);
        assert_eq!(status.workers[0].required_by, vec!["m"]);
    }
}
