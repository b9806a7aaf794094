//! # fileinstall-engine
//!
//! Tracks master and worker units of a workspace and keeps each master's
//! hot-deploy descriptors in step with the build health of its workers.
//!
//! - [`detector`] - Change detection for a single health condition
//! - [`worker`] - Per-worker build and manifest state
//! - [`master`] - Per-master configuration and descriptor files
//! - [`registry`] - Shared maps of masters and workers, plus fan-out
//! - [`engine`] - Lifecycle and build event handling, the activation policy
//! - [`queue`] - Background task queue in front of the engine
//! - [`status`] - Serializable registry snapshot
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fileinstall_core::DirWorkspace;
//! use fileinstall_engine::{Engine, Task, TaskQueue};
//!
//! # async fn example() -> fileinstall_core::Result<()> {
//! let workspace = Arc::new(DirWorkspace::new("/path/to/workspace")?);
//! let engine = Arc::new(Engine::new(workspace));
//! engine.start();
//!
//! let (queue, sender) = TaskQueue::new(Arc::clone(&engine));
//! let runner = tokio::spawn(queue.run());
//! sender.submit(Task::BuildFinished("my-bundle".to_string()))?;
//! drop(sender);
//! runner.await.ok();
//! # Ok(())
//! # }
//! ```

pub mod detector;
pub mod engine;
pub mod master;
pub mod queue;
pub mod registry;
pub mod status;
pub mod worker;

pub use detector::{HealthCheck, HealthDetector};
pub use engine::{Action, Engine, Outcome, decide};
pub use master::MasterState;
pub use queue::{Task, TaskQueue, TaskSender, UPDATE_SETTLE_DELAY};
pub use registry::Registry;
pub use status::{EngineStatus, MasterStatus, WorkerStatus};
pub use worker::{Classification, WorkerState};
