//! Master configuration.
//!
//! A master unit may carry `fileinstall.yaml`. It is parsed as a YAML tree,
//! deep-merged over the bundled default (local values win, mappings merge
//! key by key, everything else is replaced) and then deserialized into the
//! typed [`Conf`]. The descriptor body is rendered once, at load time.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use tracing::debug;

use fileinstall_core::workspace::{copy_text_if_absent, is_unit_name};
use fileinstall_core::{FileinstallError, Result};

use crate::render::render_flat;

/// Configuration file name inside a master unit.
pub const CONF_FILE: &str = "fileinstall.yaml";

/// Default configuration shipped with the binary.
pub const BUNDLED_CONF: &str = include_str!("../resources/fileinstall.yaml");

/// Health check switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CheckFlags {
    /// Verify the master deploy folder is present
    #[serde(default)]
    pub master_deploy_present: bool,
    /// Verify the master launch configuration is running
    #[serde(default)]
    pub master_launch_running: bool,
    /// Verify the worker builds without errors
    #[serde(default)]
    pub worker_build_success: bool,
    /// Verify the worker manifest is present
    #[serde(default)]
    pub worker_manifest_present: bool,
}

impl CheckFlags {
    /// Combine flags from several masters: a check is enabled if any enables it.
    pub fn any_of<'a>(flags: impl IntoIterator<Item = &'a CheckFlags>) -> Self {
        flags.into_iter().fold(Self::default(), |total, next| Self {
            master_deploy_present: total.master_deploy_present || next.master_deploy_present,
            master_launch_running: total.master_launch_running || next.master_launch_running,
            worker_build_success: total.worker_build_success || next.worker_build_success,
            worker_manifest_present: total.worker_manifest_present
                || next.worker_manifest_present,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConf {
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    checks: CheckFlags,
    descriptor: RawDescriptor,
}

#[derive(Debug, Deserialize)]
struct RawDescriptor {
    folder: String,
    file: String,
    #[serde(default)]
    template: Mapping,
}

/// Typed master configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conf {
    /// Worker unit names this master depends on
    pub dependencies: Vec<String>,
    /// Enabled health checks
    pub checks: CheckFlags,
    /// Descriptor folder template, relative to the master unit
    pub descriptor_folder: String,
    /// Descriptor file name template
    pub descriptor_file: String,
    /// Rendered descriptor body, variables not yet substituted
    pub descriptor_body: String,
}

impl Conf {
    /// Load a master's configuration from its unit directory.
    ///
    /// Falls back entirely to the bundled default when the unit has no
    /// `fileinstall.yaml`.
    pub fn load(master_dir: &Path) -> Result<Self> {
        let path = master_dir.join(CONF_FILE);
        if !path.exists() {
            debug!("No local configuration at {:?}, using bundled default", path);
            return Self::parse(None, &path);
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            FileinstallError::ConfigNotFound {
                path: path.clone(),
                source: Some(e),
            }
        })?;
        Self::parse(Some(&content), &path)
    }

    /// The bundled default configuration.
    pub fn bundled() -> Result<Self> {
        Self::parse(None, Path::new(CONF_FILE))
    }

    /// Parse local YAML (if any) merged over the bundled default.
    ///
    /// `path` is only used for error reporting.
    pub fn parse(local: Option<&str>, path: &Path) -> Result<Self> {
        let mut tree: Value = serde_yaml::from_str(BUNDLED_CONF)
            .map_err(|e| FileinstallError::config_invalid("<bundled>", e.to_string()))?;

        if let Some(local) = local {
            let overlay: Value = serde_yaml::from_str(local)
                .map_err(|e| FileinstallError::config_invalid(path, e.to_string()))?;
            merge(&mut tree, overlay);
        }

        let raw: RawConf = serde_yaml::from_value(tree)
            .map_err(|e| FileinstallError::config_invalid(path, e.to_string()))?;

        let conf = Self {
            dependencies: raw.dependencies,
            checks: raw.checks,
            descriptor_folder: raw.descriptor.folder,
            descriptor_file: raw.descriptor.file,
            descriptor_body: render_flat(&raw.descriptor.template),
        };
        conf.validate(path)?;
        Ok(conf)
    }

    /// Validate field contents that the schema cannot express.
    pub fn validate(&self, path: &Path) -> Result<()> {
        if self.descriptor_file.trim().is_empty() {
            return Err(FileinstallError::config_invalid(
                path,
                "descriptor.file must not be empty",
            ));
        }
        if let Some(bad) = self.dependencies.iter().find(|d| d.trim().is_empty()) {
            return Err(FileinstallError::config_invalid(
                path,
                format!("dependencies must not contain blank names, got {bad:?}"),
            ));
        }
        if let Some(bad) = self.dependencies.iter().find(|d| !is_unit_name(d)) {
            return Err(FileinstallError::config_invalid(
                path,
                format!("dependency {bad:?} is not a unit name"),
            ));
        }
        Ok(())
    }

    /// Descriptor path template: `folder + "/" + file`.
    pub fn descriptor_path(&self) -> String {
        format!("{}/{}", self.descriptor_folder, self.descriptor_file)
    }

    /// Is `worker` one of the declared dependencies?
    pub fn requires(&self, worker: &str) -> bool {
        self.dependencies.iter().any(|d| d == worker)
    }
}

/// Copy the bundled default into a master unit if it has no configuration.
///
/// Never overwrites an existing file. Returns true if the file was written.
pub fn extract_default(master_dir: &Path) -> Result<bool> {
    let path: PathBuf = master_dir.join(CONF_FILE);
    copy_text_if_absent(&path, BUNDLED_CONF)
}

/// Deep-merge `overlay` into `base`.
fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (_, Value::Null) => {}
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_bundled_defaults() {
        let conf = Conf::bundled().unwrap();
        assert!(conf.dependencies.is_empty());
        assert!(conf.checks.worker_build_success);
        assert!(conf.checks.worker_manifest_present);
        assert!(!conf.checks.master_deploy_present);
        assert_eq!(conf.descriptor_path(), "deploy/@{worker-unit-name}.cfg");
        assert!(conf.descriptor_body.starts_with("# Auto generated, do not change.\n"));
        assert!(conf.descriptor_body.contains("felix.fileinstall.dir=@{worker-unit-path}/target/classes\n"));
    }

    #[test]
    fn test_local_overrides_merge_over_default() {
        let local = r#"
dependencies: [bundle-a, bundle-b]
checks:
  worker-manifest-present: false
descriptor:
  folder: "load"
"#;
        let conf = Conf::parse(Some(local), Path::new("fileinstall.yaml")).unwrap();
        assert_eq!(conf.dependencies, vec!["bundle-a", "bundle-b"]);
        assert!(conf.checks.worker_build_success);
        assert!(!conf.checks.worker_manifest_present);
        assert_eq!(conf.descriptor_folder, "load");
        assert_eq!(conf.descriptor_file, "@{worker-unit-name}.cfg");
        assert!(conf.requires("bundle-b"));
        assert!(!conf.requires("bundle-c"));
    }

    #[test]
    fn test_template_mapping_merges_key_by_key() {
        let local = r#"
descriptor:
  template:
    felix:
      fileinstall:
        poll: 250
"#;
        let conf = Conf::parse(Some(local), Path::new("fileinstall.yaml")).unwrap();
        assert!(conf.descriptor_body.contains("felix.fileinstall.poll=250\n"));
        assert!(conf.descriptor_body.contains("felix.fileinstall.filter=.*\n"));
    }

    #[test]
    fn test_empty_local_file_is_default() {
        let conf = Conf::parse(Some(""), Path::new("fileinstall.yaml")).unwrap();
        assert_eq!(conf, Conf::bundled().unwrap());
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let err = Conf::parse(Some("dependencies: [unclosed"), Path::new("m/fileinstall.yaml"))
            .unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("m/fileinstall.yaml"));
    }

    #[test]
    fn test_wrong_type_is_config_error() {
        let err = Conf::parse(Some("checks:\n  worker-build-success: maybe\n"), Path::new("x"))
            .unwrap_err();
        assert!(matches!(err, FileinstallError::ConfigInvalid { .. }));
    }

    #[test]
    fn test_blank_file_name_rejected() {
        let err = Conf::parse(Some("descriptor:\n  file: \"\"\n"), Path::new("x")).unwrap_err();
        assert!(err.to_string().contains("descriptor.file"));
    }

    #[test]
    fn test_dependency_must_be_unit_name() {
        for bad in ["../../victim", "nested/unit", ".hidden", "back\\slash"] {
            let local = format!("dependencies: [ok, {bad:?}]\n");
            let err = Conf::parse(Some(&local), Path::new("x")).unwrap_err();
            assert!(err.is_config_error(), "{bad} accepted");
            assert!(err.to_string().contains("not a unit name"));
        }
    }

    #[test]
    fn test_check_flags_any_of() {
        let a = CheckFlags {
            worker_build_success: true,
            ..Default::default()
        };
        let b = CheckFlags {
            worker_manifest_present: true,
            ..Default::default()
        };
        let total = CheckFlags::any_of([&a, &b]);
        assert!(total.worker_build_success);
        assert!(total.worker_manifest_present);
        assert!(!total.master_deploy_present);

        assert_eq!(CheckFlags::any_of(Vec::<&CheckFlags>::new()), CheckFlags::default());
    }

    #[test]
    fn test_load_and_extract_default() {
        let tmp = TempDir::new().unwrap();
        let conf = Conf::load(tmp.path()).unwrap();
        assert_eq!(conf, Conf::bundled().unwrap());

        assert!(extract_default(tmp.path()).unwrap());
        assert!(tmp.path().join(CONF_FILE).exists());

        fs::write(tmp.path().join(CONF_FILE), "dependencies: [only]\n").unwrap();
        assert!(!extract_default(tmp.path()).unwrap());
        assert_eq!(Conf::load(tmp.path()).unwrap().dependencies, vec!["only"]);
    }
}
