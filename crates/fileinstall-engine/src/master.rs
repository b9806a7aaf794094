//! Master units and the descriptors they host.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock, PoisonError};

use fileinstall_config::{Conf, Variables, extract_default};
use fileinstall_core::log_descriptor_event;
use fileinstall_core::workspace::{delete_file, has_file, is_unit_name, write_text_file};
use fileinstall_core::{FileinstallError, Result, Workspace};
use tracing::{debug, warn};

/// A master unit tracked by the engine.
///
/// The configuration is read from disk on first use and cached for the
/// lifetime of this state. A failed load is not cached, so a corrected
/// `fileinstall.yaml` is picked up on the next access. Each distinct load
/// error is warned about once; repeats go to debug.
#[derive(Debug)]
pub struct MasterState {
    name: String,
    path: PathBuf,
    conf: OnceLock<Conf>,
    last_error: Mutex<Option<String>>,
}

impl MasterState {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            conf: OnceLock::new(),
            last_error: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The master's configuration, loading it on first access.
    pub fn conf(&self) -> Result<&Conf> {
        if let Some(conf) = self.conf.get() {
            return Ok(conf);
        }
        let conf = Conf::load(&self.path)?;
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        debug!(
            master = %self.name,
            dependencies = ?conf.dependencies,
            "configuration loaded"
        );
        Ok(self.conf.get_or_init(|| conf))
    }

    /// Log a configuration load failure, at warn level only when it differs
    /// from the previous one. Returns true if it was warned about.
    fn report_unavailable(&self, error: &FileinstallError) -> bool {
        let message = error.to_string();
        let mut last = self.last_error.lock().unwrap_or_else(PoisonError::into_inner);
        if last.as_deref() == Some(message.as_str()) {
            debug!(master = %self.name, "configuration still unavailable: {}", message);
            return false;
        }
        warn!(master = %self.name, "configuration unavailable: {}", message);
        *last = Some(message);
        true
    }

    /// Place the bundled default configuration in the unit if none exists.
    pub fn ensure_configuration_extracted(&self) -> Result<bool> {
        let written = extract_default(&self.path)?;
        if written {
            debug!(master = %self.name, "default configuration extracted");
        }
        Ok(written)
    }

    /// Declared dependencies, deduplicated in declaration order.
    ///
    /// Empty if the configuration cannot be loaded.
    pub fn dependencies(&self) -> Vec<String> {
        match self.conf() {
            Ok(conf) => {
                let mut seen = HashSet::new();
                conf.dependencies
                    .iter()
                    .filter(|d| seen.insert(d.as_str()))
                    .cloned()
                    .collect()
            }
            Err(e) => {
                self.report_unavailable(&e);
                Vec::new()
            }
        }
    }

    /// Does this master declare `worker` as a dependency?
    pub fn requires(&self, worker: &str) -> bool {
        match self.conf() {
            Ok(conf) => conf.requires(worker),
            Err(e) => {
                self.report_unavailable(&e);
                false
            }
        }
    }

    fn variables(&self, workspace: &dyn Workspace, worker: &str) -> Variables {
        Variables::new(workspace.root_path(), worker, &workspace.unit_path(worker))
    }

    /// Absolute path of the descriptor this master holds for `worker`.
    pub fn descriptor_file(&self, workspace: &dyn Workspace, worker: &str) -> Result<PathBuf> {
        let conf = self.conf()?;
        let relative = self
            .variables(workspace, worker)
            .substitute(&conf.descriptor_path());
        Ok(self.path.join(relative.trim_start_matches('/')))
    }

    /// Write the descriptor for `worker`, overwriting any previous one.
    pub fn create_descriptor(&self, workspace: &dyn Workspace, worker: &str) -> Result<PathBuf> {
        if !workspace.unit_exists(worker) {
            return Err(FileinstallError::descriptor_write(
                &self.name,
                worker,
                "worker unit does not exist",
            ));
        }
        let conf = self
            .conf()
            .map_err(|e| FileinstallError::descriptor_write(&self.name, worker, e.to_string()))?;
        let variables = self.variables(workspace, worker);
        let relative = variables.substitute(&conf.descriptor_path());
        let file = self.path.join(relative.trim_start_matches('/'));
        let body = variables.substitute(&conf.descriptor_body);

        write_text_file(&file, &body)
            .map_err(|e| FileinstallError::descriptor_write(&self.name, worker, e.to_string()))?;
        log_descriptor_event!(self.name.as_str(), worker, "created", path = %file.display());
        Ok(file)
    }

    /// Remove the descriptor for `worker`. A missing file is not an error.
    pub fn delete_descriptor(&self, workspace: &dyn Workspace, worker: &str) -> Result<bool> {
        if !is_unit_name(worker) {
            return Err(FileinstallError::descriptor_delete(
                &self.name,
                worker,
                "not a unit name",
            ));
        }
        let file = self
            .descriptor_file(workspace, worker)
            .map_err(|e| FileinstallError::descriptor_delete(&self.name, worker, e.to_string()))?;
        let removed = delete_file(&file)
            .map_err(|e| FileinstallError::descriptor_delete(&self.name, worker, e.to_string()))?;
        if removed {
            log_descriptor_event!(self.name.as_str(), worker, "deleted", path = %file.display());
        }
        Ok(removed)
    }

    /// Is a descriptor for `worker` currently on disk?
    pub fn has_descriptor(&self, workspace: &dyn Workspace, worker: &str) -> bool {
        self.descriptor_file(workspace, worker)
            .map(|file| has_file(&file))
            .unwrap_or(false)
    }

    /// Create descriptors for every declared dependency whose unit is open
    /// and which `deploy` accepts.
    ///
    /// Failures are logged and skipped. Returns the number written.
    pub fn create_all_descriptors(
        &self,
        workspace: &dyn Workspace,
        deploy: impl Fn(&str) -> bool,
    ) -> usize {
        let mut created = 0;
        for worker in self.dependencies() {
            if !workspace.unit_is_open(&worker) {
                debug!(master = %self.name, %worker, "dependency not open, skipping");
                continue;
            }
            if !deploy(&worker) {
                debug!(master = %self.name, %worker, "dependency not deployable, skipping");
                continue;
            }
            match self.create_descriptor(workspace, &worker) {
                Ok(_) => created += 1,
                Err(e) => warn!("{}", e),
            }
        }
        created
    }

    /// Delete descriptors for every declared dependency.
    ///
    /// Failures are logged and skipped. Returns the number removed.
    pub fn delete_all_descriptors(&self, workspace: &dyn Workspace) -> usize {
        let mut removed = 0;
        for worker in self.dependencies() {
            match self.delete_descriptor(workspace, &worker) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => warn!("{}", e),
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fileinstall_config::CONF_FILE;
    use fileinstall_core::DirWorkspace;
    use std::fs;
    use tempfile::TempDir;

    fn unit(root: &Path, name: &str, natures: &str) {
        fs::create_dir_all(root.join(name)).unwrap();
        fs::write(root.join(name).join(".unit.yaml"), format!("natures: [{natures}]\n")).unwrap();
    }

    fn setup(conf: &str) -> (TempDir, DirWorkspace, MasterState) {
        let tmp = TempDir::new().unwrap();
        unit(tmp.path(), "m", "fileinstall");
        unit(tmp.path(), "w1", "java");
        unit(tmp.path(), "w2", "java");
        fs::write(tmp.path().join("m").join(CONF_FILE), conf).unwrap();
        let ws = DirWorkspace::new(tmp.path()).unwrap();
        let master = MasterState::new("m", ws.unit_path("m"));
        (tmp, ws, master)
    }

    #[test]
    fn test_create_descriptor_substitutes_variables() {
        let (_tmp, ws, master) = setup("dependencies: [w1]\n");
        let file = master.create_descriptor(&ws, "w1").unwrap();

        assert_eq!(file, ws.unit_path("m").join("deploy/w1.cfg"));
        let body = fs::read_to_string(&file).unwrap();
        assert!(body.starts_with("# Auto generated, do not change.\n"));
        let worker_path = ws.unit_path("w1");
        assert!(body.contains(&format!(
            "felix.fileinstall.dir={}/target/classes\n",
            worker_path.display()
        )));
        assert!(body.contains(&format!("workspace.root={}\n", ws.root_path().display())));
        assert!(body.contains("workspace.unit=w1\n"));
        assert!(!body.contains("@{"));
    }

    #[test]
    fn test_create_descriptor_overwrites() {
        let (_tmp, ws, master) = setup("dependencies: [w1]\n");
        let file = master.create_descriptor(&ws, "w1").unwrap();
        fs::write(&file, "stale").unwrap();
        master.create_descriptor(&ws, "w1").unwrap();
        assert_ne!(fs::read_to_string(&file).unwrap(), "stale");
    }

    #[test]
    fn test_create_descriptor_missing_worker_fails() {
        let (_tmp, ws, master) = setup("dependencies: [ghost]\n");
        let err = master.create_descriptor(&ws, "ghost").unwrap_err();
        assert!(err.is_descriptor_error());
        assert!(!master.has_descriptor(&ws, "ghost"));
    }

    #[test]
    fn test_delete_descriptor_tolerates_missing() {
        let (_tmp, ws, master) = setup("dependencies: [w1]\n");
        assert!(!master.delete_descriptor(&ws, "w1").unwrap());
        master.create_descriptor(&ws, "w1").unwrap();
        assert!(master.has_descriptor(&ws, "w1"));
        assert!(master.delete_descriptor(&ws, "w1").unwrap());
        assert!(!master.has_descriptor(&ws, "w1"));
    }

    #[test]
    fn test_create_all_skips_closed_and_missing() {
        let (tmp, ws, master) = setup("dependencies: [w1, w2, ghost, w1]\n");
        fs::write(tmp.path().join("w2/.unit.yaml"), "open: false\n").unwrap();

        assert_eq!(master.dependencies(), vec!["w1", "w2", "ghost"]);
        assert_eq!(master.create_all_descriptors(&ws, |_| true), 1);
        assert!(master.has_descriptor(&ws, "w1"));
        assert!(!master.has_descriptor(&ws, "w2"));

        assert_eq!(master.delete_all_descriptors(&ws), 1);
        assert!(!master.has_descriptor(&ws, "w1"));
    }

    #[test]
    fn test_create_all_honours_deploy_filter() {
        let (_tmp, ws, master) = setup("dependencies: [w1, w2]\n");
        assert_eq!(master.create_all_descriptors(&ws, |w| w != "w2"), 1);
        assert!(master.has_descriptor(&ws, "w1"));
        assert!(!master.has_descriptor(&ws, "w2"));
    }

    #[test]
    fn test_leading_slash_stays_inside_master() {
        let (_tmp, ws, master) = setup("dependencies: [w1]\ndescriptor:\n  folder: \"\"\n");
        let file = master.create_descriptor(&ws, "w1").unwrap();
        assert_eq!(file, ws.unit_path("m").join("w1.cfg"));
    }

    #[test]
    fn test_invalid_configuration_requires_nothing() {
        let (tmp, ws, master) = setup("dependencies: [w1\n");
        assert!(master.conf().is_err());
        assert!(!master.requires("w1"));
        assert_eq!(master.create_all_descriptors(&ws, |_| true), 0);

        fs::write(tmp.path().join("m").join(CONF_FILE), "dependencies: [w1]\n").unwrap();
        assert!(master.requires("w1"));
    }

    #[test]
    fn test_delete_descriptor_rejects_path_names() {
        let (tmp, ws, master) = setup("dependencies: [w1]\n");
        fs::create_dir_all(tmp.path().join("m/deploy")).unwrap();
        let outside = tmp.path().join("victim.cfg");
        fs::write(&outside, "keep").unwrap();

        let err = master.delete_descriptor(&ws, "../../victim").unwrap_err();
        assert!(err.is_descriptor_error());
        assert!(outside.is_file());
    }

    #[test]
    fn test_repeated_load_failure_warns_once() {
        let (tmp, _ws, master) = setup("dependencies: [w1\n");
        let first = master.conf().unwrap_err();
        assert!(master.report_unavailable(&first));
        assert!(!master.report_unavailable(&master.conf().unwrap_err()));

        fs::write(tmp.path().join("m").join(CONF_FILE), "checks: [\n").unwrap();
        assert!(master.report_unavailable(&master.conf().unwrap_err()));
        assert!(!master.report_unavailable(&master.conf().unwrap_err()));

        fs::write(tmp.path().join("m").join(CONF_FILE), "dependencies: [w1]\n").unwrap();
        assert!(master.requires("w1"));
        assert!(master.last_error.lock().unwrap().is_none());
    }

    #[test]
    fn test_configuration_cached_after_load() {
        let (tmp, _ws, master) = setup("dependencies: [w1]\n");
        assert!(master.requires("w1"));
        fs::write(tmp.path().join("m").join(CONF_FILE), "dependencies: [w2]\n").unwrap();
        assert!(master.requires("w1"));
        assert!(!master.requires("w2"));
    }

    #[test]
    fn test_ensure_configuration_extracted() {
        let tmp = TempDir::new().unwrap();
        unit(tmp.path(), "m", "fileinstall");
        let master = MasterState::new("m", tmp.path().join("m"));
        assert!(master.ensure_configuration_extracted().unwrap());
        assert!(!master.ensure_configuration_extracted().unwrap());
        assert!(master.dependencies().is_empty());
    }
}
