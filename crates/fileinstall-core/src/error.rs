//! Error types for fileinstall operations.
//!
//! This module defines [`FileinstallError`], the single error enum shared by
//! every fileinstall crate. Engine handlers run as background tasks, so these
//! errors end up in the log stream rather than in front of a caller: the enum
//! carries enough context (unit, path, operation) for the log line to be
//! actionable on its own.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`FileinstallError`].
pub type Result<T> = std::result::Result<T, FileinstallError>;

/// Error type for all fileinstall operations.
#[derive(Debug, Error)]
pub enum FileinstallError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is malformed or does not match the schema
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Missing required configuration field
    #[error("Missing required config field: {field}")]
    ConfigMissingField { field: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Workspace directory not found
    #[error("Workspace not found: {path}")]
    WorkspaceNotFound { path: PathBuf },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Parsing Errors
    // =========================================================================
    /// Build report could not be parsed
    #[error("Invalid build report {path}: {message}")]
    BuildReportParse { path: PathBuf, message: String },

    /// Unit descriptor (`.unit.yaml`) could not be parsed
    #[error("Invalid unit descriptor {path}: {message}")]
    UnitDescriptorParse { path: PathBuf, message: String },

    // =========================================================================
    // Unit Errors
    // =========================================================================
    /// Unit does not exist in the workspace
    #[error("Unit not found: {unit}")]
    UnitNotFound { unit: String },

    /// Manifest location could not be resolved
    #[error("Manifest probe failed for {unit}: {message}")]
    ManifestProbe { unit: String, message: String },

    // =========================================================================
    // Descriptor Errors
    // =========================================================================
    /// Descriptor file could not be written
    #[error("Failed to write descriptor for {worker} in {master}: {message}")]
    DescriptorWrite {
        master: String,
        worker: String,
        message: String,
    },

    /// Descriptor file could not be deleted
    #[error("Failed to delete descriptor for {worker} in {master}: {message}")]
    DescriptorDelete {
        master: String,
        worker: String,
        message: String,
    },

    // =========================================================================
    // File Watching Errors
    // =========================================================================
    /// File watcher initialization failed
    #[error("Failed to initialize file watcher: {message}")]
    WatcherInit { message: String },

    /// File watcher error
    #[error("File watcher error: {message}")]
    WatcherError { message: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in fileinstall)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FileinstallError {
    /// Create a ConfigInvalid error
    pub fn config_invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a unit not found error
    pub fn unit_not_found(unit: impl Into<String>) -> Self {
        Self::UnitNotFound { unit: unit.into() }
    }

    /// Create a descriptor write error
    pub fn descriptor_write(
        master: impl Into<String>,
        worker: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DescriptorWrite {
            master: master.into(),
            worker: worker.into(),
            message: message.into(),
        }
    }

    /// Create a descriptor delete error
    pub fn descriptor_delete(
        master: impl Into<String>,
        worker: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::DescriptorDelete {
            master: master.into(),
            worker: worker.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    // =========================================================================
    // Error classification helpers
    // =========================================================================

    /// Returns true if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound { .. } | Self::ConfigInvalid { .. } | Self::ConfigMissingField { .. }
        )
    }

    /// Returns true if this is a descriptor write/delete error
    pub fn is_descriptor_error(&self) -> bool {
        matches!(self, Self::DescriptorWrite { .. } | Self::DescriptorDelete { .. })
    }

    /// Returns actionable guidance for the operator
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => {
                Some("Check YAML syntax in the master's fileinstall.yaml")
            }
            Self::WorkspaceNotFound { .. } => {
                Some("Pass an existing directory with --workspace or FILEINSTALL_WORKSPACE")
            }
            Self::UnitNotFound { .. } => Some("Check the dependency list of the master unit"),
            Self::UnitDescriptorParse { .. } => Some("Check YAML syntax in the unit's .unit.yaml"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_invalid_error() {
        let err = FileinstallError::config_invalid("/ws/master/fileinstall.yaml", "bad indent");
        assert!(err.to_string().contains("Invalid configuration"));
        assert!(err.is_config_error());
        assert!(!err.is_descriptor_error());
        assert!(err.guidance().is_some());
    }

    #[test]
    fn test_descriptor_errors() {
        let write = FileinstallError::descriptor_write("master", "worker-a", "disk full");
        assert!(write.to_string().contains("worker-a"));
        assert!(write.is_descriptor_error());

        let delete = FileinstallError::descriptor_delete("master", "worker-a", "denied");
        assert!(delete.to_string().contains("master"));
        assert!(delete.is_descriptor_error());
    }

    #[test]
    fn test_unit_not_found_guidance() {
        let err = FileinstallError::unit_not_found("ghost");
        assert_eq!(err.to_string(), "Unit not found: ghost");
        assert_eq!(err.guidance(), Some("Check the dependency list of the master unit"));
    }
}
