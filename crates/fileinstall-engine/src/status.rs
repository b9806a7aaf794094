//! Serializable view of the engine registry.

use std::path::PathBuf;

use fileinstall_config::CheckFlags;
use serde::Serialize;

/// Point-in-time view of every tracked master and worker.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub workspace: PathBuf,
    /// Check flags aggregated over all masters
    pub checks: CheckFlags,
    pub masters: Vec<MasterStatus>,
    pub workers: Vec<WorkerStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MasterStatus {
    pub name: String,
    pub dependencies: Vec<String>,
    pub descriptors: Vec<DescriptorStatus>,
    /// Set when the master's configuration cannot be loaded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DescriptorStatus {
    pub worker: String,
    pub path: Option<PathBuf>,
    pub present: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub name: String,
    pub build_success: bool,
    pub manifest_present: bool,
    pub healthy: bool,
    pub required_by: Vec<String>,
}

impl EngineStatus {
    /// Number of descriptors currently on disk across all masters.
    pub fn descriptor_count(&self) -> usize {
        self.masters
            .iter()
            .flat_map(|m| &m.descriptors)
            .filter(|d| d.present)
            .count()
    }

    /// Human-readable multi-line summary.
    pub fn render_text(&self) -> String {
        let mut out = format!("workspace: {}\n", self.workspace.display());
        out.push_str(&format!(
            "checks: build-success={} manifest-present={}\n",
            self.checks.worker_build_success, self.checks.worker_manifest_present
        ));

        if self.masters.is_empty() {
            out.push_str("no masters\n");
        }
        for master in &self.masters {
            out.push_str(&format!("master {}\n", master.name));
            if let Some(err) = &master.config_error {
                out.push_str(&format!("  configuration error: {err}\n"));
            }
            for descriptor in &master.descriptors {
                let mark = if descriptor.present { "deployed" } else { "-" };
                out.push_str(&format!("  {:<24} {}\n", descriptor.worker, mark));
            }
        }

        for worker in &self.workers {
            out.push_str(&format!(
                "worker {} build={} manifest={} healthy={} required-by=[{}]\n",
                worker.name,
                worker.build_success,
                worker.manifest_present,
                worker.healthy,
                worker.required_by.join(",")
            ));
        }
        out
    }
}
