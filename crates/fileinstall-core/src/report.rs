//! Build reports from `<workspace>/.builds/<unit>.json`.
//!
//! The external build tool announces each build phase of a unit by writing a
//! small JSON report. The watcher turns report changes into build events; the
//! workspace reads the latest report to answer "what was the maximum problem
//! severity of the last build".
//!
//! ```json
//! {"unit": "bundle-a", "phase": "finished", "errors": 0, "warnings": 3}
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{FileinstallError, Result};
use crate::types::{BuildPhase, Severity, UnitName};

/// Name of the report directory inside the workspace root.
pub const REPORTS_DIR: &str = ".builds";

fn default_phase() -> BuildPhase {
    BuildPhase::Finished
}

/// Contents of one unit's build report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildReport {
    /// Unit the report belongs to
    pub unit: UnitName,

    /// Build phase being announced
    #[serde(default = "default_phase")]
    pub phase: BuildPhase,

    /// Number of error-severity problems
    #[serde(default)]
    pub errors: u32,

    /// Number of warning-severity problems
    #[serde(default)]
    pub warnings: u32,

    /// When the report was written
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl BuildReport {
    /// Create a report for a unit in the given phase with no problems.
    pub fn new(unit: impl Into<String>, phase: BuildPhase) -> Self {
        Self {
            unit: unit.into(),
            phase,
            errors: 0,
            warnings: 0,
            timestamp: Some(Utc::now()),
        }
    }

    /// Set the problem counts.
    pub fn with_problems(mut self, errors: u32, warnings: u32) -> Self {
        self.errors = errors;
        self.warnings = warnings;
        self
    }

    /// Maximum problem severity recorded by this report.
    pub fn severity(&self) -> Severity {
        if self.errors > 0 {
            Severity::Error
        } else if self.warnings > 0 {
            Severity::Warning
        } else {
            Severity::None
        }
    }
}

/// Reader (and writer) for the report directory.
#[derive(Debug, Clone)]
pub struct BuildReportReader {
    reports_dir: PathBuf,
}

impl BuildReportReader {
    /// Create a reader for the report directory of a workspace root.
    pub fn for_workspace(root: &Path) -> Self {
        Self {
            reports_dir: root.join(REPORTS_DIR),
        }
    }

    /// Directory holding the reports.
    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Path of a unit's report file.
    pub fn report_path(&self, unit: &str) -> PathBuf {
        self.reports_dir.join(format!("{unit}.json"))
    }

    /// Read a unit's report. `Ok(None)` if the unit has never reported.
    pub fn read_report(&self, unit: &str) -> Result<Option<BuildReport>> {
        let path = self.report_path(unit);
        if !path.exists() {
            debug!("Build report not found: {:?}", path);
            return Ok(None);
        }
        parse_report_file(&path).map(Some)
    }

    /// Maximum severity of the last build of `unit`.
    ///
    /// A unit that never reported has no problems. An unreadable report counts
    /// as an error: a failed probe must not look like a healthy build.
    pub fn severity(&self, unit: &str) -> Severity {
        match self.read_report(unit) {
            Ok(Some(report)) => report.severity(),
            Ok(None) => Severity::None,
            Err(e) => {
                warn!(unit, "Failed to read build report: {}", e);
                Severity::Error
            }
        }
    }

    /// Write a report, creating the report directory when needed.
    pub fn write_report(&self, report: &BuildReport) -> Result<()> {
        std::fs::create_dir_all(&self.reports_dir).map_err(|e| {
            FileinstallError::DirectoryCreation {
                path: self.reports_dir.clone(),
                source: e,
            }
        })?;
        let path = self.report_path(&report.unit);
        let content = serde_json::to_string_pretty(report).map_err(|e| {
            FileinstallError::internal(format!("serializing build report: {e}"))
        })?;
        std::fs::write(&path, content)
            .map_err(|e| FileinstallError::io("writing build report", path, e))
    }
}

/// Read and parse a report file.
pub fn parse_report_file(path: &Path) -> Result<BuildReport> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| FileinstallError::io("reading build report", path, e))?;

    serde_json::from_str(&content).map_err(|e| FileinstallError::BuildReportParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
