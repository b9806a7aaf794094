//! Workspace host: units, natures, build health and plain file helpers.
//!
//! The engine never touches the host directly; it asks a [`Workspace`]. The
//! shipped implementation, [`DirWorkspace`], maps a directory tree onto the
//! host model:
//!
//! ```text
//! <root>/
//! ├── .builds/<unit>.json        build reports (see `report`)
//! ├── master/
//! │   ├── .unit.yaml             natures: [fileinstall]
//! │   └── fileinstall.yaml       master configuration
//! └── bundle-a/
//!     ├── .unit.yaml             natures: [java], output: target/classes
//!     └── target/classes/META-INF/MANIFEST.MF
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FileinstallError, Result};
use crate::report::BuildReportReader;
use crate::types::{BUILD_NATURE, MASTER_NATURE, Severity, UnitName};

/// File name of the per-unit descriptor.
pub const UNIT_FILE: &str = ".unit.yaml";

/// Manifest location relative to a unit's build output directory.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Build output directory used when a unit does not declare one.
pub const DEFAULT_OUTPUT: &str = "target/classes";

/// Host registry queried by the engine.
///
/// All methods must be safe to call re-entrantly from engine tasks.
pub trait Workspace: Send + Sync {
    /// Absolute path of the workspace root.
    fn root_path(&self) -> &Path;

    /// Filesystem path of a unit (whether or not it exists).
    fn unit_path(&self, unit: &str) -> PathBuf;

    /// Does the unit exist?
    fn unit_exists(&self, unit: &str) -> bool;

    /// Does the unit exist and is it open?
    fn unit_is_open(&self, unit: &str) -> bool;

    /// Does the unit carry a nature? Closed units carry none.
    fn has_nature(&self, unit: &str, nature: &str) -> bool;

    /// Names of all existing units, sorted.
    fn list_units(&self) -> Result<Vec<UnitName>>;

    /// Maximum problem severity of the unit's last build.
    fn max_severity(&self, unit: &str) -> Severity;

    /// Expected location of the unit's generated manifest.
    fn manifest_path(&self, unit: &str) -> Result<PathBuf>;

    /// Does the unit have master characteristics?
    fn is_master(&self, unit: &str) -> bool {
        self.has_nature(unit, MASTER_NATURE)
    }

    /// Can the unit be tracked as a worker?
    fn is_buildable(&self, unit: &str) -> bool {
        self.has_nature(unit, BUILD_NATURE)
    }
}

/// Contents of `<unit>/.unit.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitDescriptor {
    /// Whether the unit is open
    #[serde(default = "default_open")]
    pub open: bool,

    /// Natures carried by the unit
    #[serde(default)]
    pub natures: Vec<String>,

    /// Build output directory, relative to the unit
    #[serde(default = "default_output")]
    pub output: String,
}

fn default_open() -> bool {
    true
}

fn default_output() -> String {
    DEFAULT_OUTPUT.to_string()
}

impl Default for UnitDescriptor {
    fn default() -> Self {
        Self {
            open: default_open(),
            natures: Vec::new(),
            output: default_output(),
        }
    }
}

/// Directory-backed [`Workspace`].
#[derive(Debug, Clone)]
pub struct DirWorkspace {
    root: PathBuf,
    reports: BuildReportReader,
}

impl DirWorkspace {
    /// Open a workspace rooted at an existing directory.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(FileinstallError::WorkspaceNotFound { path: root });
        }
        let root = root
            .canonicalize()
            .map_err(|e| FileinstallError::io("resolving workspace root", &root, e))?;
        let reports = BuildReportReader::for_workspace(&root);
        debug!("Workspace initialized at {:?}", root);
        Ok(Self { root, reports })
    }

    /// Build report reader for this workspace.
    pub fn reports(&self) -> &BuildReportReader {
        &self.reports
    }

    /// Path of a unit's descriptor file.
    pub fn descriptor_path(&self, unit: &str) -> PathBuf {
        self.unit_path(unit).join(UNIT_FILE)
    }

    /// Read a unit descriptor; a missing file yields the defaults.
    pub fn read_descriptor(&self, unit: &str) -> Result<UnitDescriptor> {
        let path = self.descriptor_path(unit);
        if !path.exists() {
            return Ok(UnitDescriptor::default());
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| FileinstallError::io("reading unit descriptor", &path, e))?;
        if content.trim().is_empty() {
            return Ok(UnitDescriptor::default());
        }
        serde_yaml::from_str(&content).map_err(|e| FileinstallError::UnitDescriptorParse {
            path,
            message: e.to_string(),
        })
    }

    /// Write a unit descriptor.
    pub fn write_descriptor(&self, unit: &str, descriptor: &UnitDescriptor) -> Result<()> {
        if !self.unit_exists(unit) {
            return Err(FileinstallError::unit_not_found(unit));
        }
        let path = self.descriptor_path(unit);
        let content = serde_yaml::to_string(descriptor)
            .map_err(|e| FileinstallError::internal(format!("serializing unit descriptor: {e}")))?;
        write_text_file(&path, &content)
    }

    /// Add natures to a unit, keeping existing ones and their order.
    ///
    /// Returns true if the descriptor changed.
    pub fn add_natures(&self, unit: &str, natures: &[&str]) -> Result<bool> {
        let mut descriptor = self.read_descriptor(unit)?;
        let before = descriptor.natures.len();
        for nature in natures {
            if !descriptor.natures.iter().any(|n| n == nature) {
                descriptor.natures.push((*nature).to_string());
            }
        }
        if descriptor.natures.len() == before && self.descriptor_path(unit).exists() {
            return Ok(false);
        }
        self.write_descriptor(unit, &descriptor)?;
        Ok(true)
    }

    /// Remove a nature from a unit. Does nothing if the nature is absent.
    ///
    /// Returns true if the descriptor changed.
    pub fn remove_nature(&self, unit: &str, nature: &str) -> Result<bool> {
        let mut descriptor = self.read_descriptor(unit)?;
        let before = descriptor.natures.len();
        descriptor.natures.retain(|n| n != nature);
        if descriptor.natures.len() == before {
            return Ok(false);
        }
        self.write_descriptor(unit, &descriptor)?;
        Ok(true)
    }
}

impl Workspace for DirWorkspace {
    fn root_path(&self) -> &Path {
        &self.root
    }

    fn unit_path(&self, unit: &str) -> PathBuf {
        self.root.join(unit)
    }

    fn unit_exists(&self, unit: &str) -> bool {
        is_unit_name(unit) && self.unit_path(unit).is_dir()
    }

    fn unit_is_open(&self, unit: &str) -> bool {
        if !self.unit_exists(unit) {
            return false;
        }
        match self.read_descriptor(unit) {
            Ok(descriptor) => descriptor.open,
            Err(e) => {
                warn!(unit, "Unreadable unit descriptor, assuming open: {}", e);
                true
            }
        }
    }

    fn has_nature(&self, unit: &str, nature: &str) -> bool {
        if !self.unit_exists(unit) {
            return false;
        }
        match self.read_descriptor(unit) {
            Ok(descriptor) => descriptor.open && descriptor.natures.iter().any(|n| n == nature),
            Err(e) => {
                warn!(unit, nature, "Nature lookup failed: {}", e);
                false
            }
        }
    }

    fn list_units(&self) -> Result<Vec<UnitName>> {
        let entries = std::fs::read_dir(&self.root)
            .map_err(|e| FileinstallError::io("listing workspace", &self.root, e))?;

        let mut units = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                if is_unit_name(name) {
                    units.push(name.to_string());
                }
            }
        }
        units.sort();
        Ok(units)
    }

    fn max_severity(&self, unit: &str) -> Severity {
        self.reports.severity(unit)
    }

    fn manifest_path(&self, unit: &str) -> Result<PathBuf> {
        if !self.unit_exists(unit) {
            return Err(FileinstallError::ManifestProbe {
                unit: unit.to_string(),
                message: "unit does not exist".into(),
            });
        }
        let descriptor = self
            .read_descriptor(unit)
            .map_err(|e| FileinstallError::ManifestProbe {
                unit: unit.to_string(),
                message: e.to_string(),
            })?;
        Ok(self
            .unit_path(unit)
            .join(&descriptor.output)
            .join(MANIFEST_PATH))
    }
}

/// Unit names are plain, non-hidden directory names.
pub fn is_unit_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\'])
}

/// Write a text file, creating parent directories as needed.
pub fn write_text_file(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| FileinstallError::DirectoryCreation {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }
    std::fs::write(path, text).map_err(|e| FileinstallError::io("writing file", path, e))
}

/// Delete a file. A missing file is not an error.
///
/// Returns true if a file was removed.
pub fn delete_file(path: &Path) -> Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(FileinstallError::io("deleting file", path, e)),
    }
}

/// Does a regular file exist at `path`?
pub fn has_file(path: &Path) -> bool {
    path.is_file()
}

/// Write `text` to `path` only if nothing exists there yet.
///
/// Returns true if the file was written.
pub fn copy_text_if_absent(path: &Path, text: &str) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    write_text_file(path, text)?;
    Ok(true)
}
