//! # fileinstall-core
//!
//! Core types, errors, and host plumbing for the fileinstall system.
//!
//! This crate provides:
//! - [`FileinstallError`] - Error types for all fileinstall operations
//! - [`logging`] - Tracing setup and log management utilities
//! - [`types`] - Shared type definitions (verdicts, severities, build phases)
//! - [`workspace`] - The [`Workspace`] host trait and its directory-backed implementation
//! - [`report`] - Build report files written by the external build tool
//! - [`watcher`] - Debounced workspace watching that yields build and lifecycle events
//!
//! ## Example
//!
//! ```no_run
//! use fileinstall_core::{DirWorkspace, Workspace, logging};
//!
//! fn main() -> fileinstall_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let workspace = DirWorkspace::new("/path/to/workspace")?;
//!     for unit in workspace.list_units()? {
//!         tracing::info!(unit, master = workspace.is_master(&unit), "unit");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod report;
pub mod types;
pub mod watcher;
pub mod workspace;

pub use error::{FileinstallError, Result};
pub use logging::{LogGuard, init_logging};
pub use report::{BuildReport, BuildReportReader};
pub use types::{BuildPhase, Severity, UnitName, Verdict};
pub use watcher::{BuildEvent, UnitEvent, WatcherConfig, WorkspaceEvent, WorkspaceWatcher};
pub use workspace::{DirWorkspace, UnitDescriptor, Workspace};
