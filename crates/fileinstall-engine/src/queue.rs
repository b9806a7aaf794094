//! Background task queue feeding the engine.
//!
//! Event sources submit [`Task`]s through a cloneable [`TaskSender`] and
//! return immediately. A single runner executes the tasks one at a time on
//! the blocking pool, so a panicking task is contained and logged.

use std::sync::Arc;
use std::time::Duration;

use fileinstall_core::{BuildEvent, FileinstallError, Result, UnitEvent, UnitName, WorkspaceEvent};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::engine::Engine;

/// Delay between the delete and create halves of [`Task::Update`].
pub const UPDATE_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// One unit of work for the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    Create(UnitName),
    Delete(UnitName),
    Change(UnitName),
    /// Delete, settle, then create
    Update(UnitName),
    BuildStarting(UnitName),
    BuildFinished(UnitName),
    CleanStarting(UnitName),
}

impl Task {
    pub fn unit(&self) -> &str {
        match self {
            Self::Create(u)
            | Self::Delete(u)
            | Self::Change(u)
            | Self::Update(u)
            | Self::BuildStarting(u)
            | Self::BuildFinished(u)
            | Self::CleanStarting(u) => u,
        }
    }

    /// Map a watcher event to a task. Error events yield nothing.
    pub fn from_event(event: WorkspaceEvent) -> Option<Self> {
        match event {
            WorkspaceEvent::Build(build) => Some(build.into()),
            WorkspaceEvent::Unit(unit) => Some(unit.into()),
            WorkspaceEvent::Error { unit, error } => {
                warn!(unit = %unit, "Workspace event error: {}", error);
                None
            }
        }
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Create(_) => "create",
            Self::Delete(_) => "delete",
            Self::Change(_) => "change",
            Self::Update(_) => "update",
            Self::BuildStarting(_) => "build-starting",
            Self::BuildFinished(_) => "build-finished",
            Self::CleanStarting(_) => "clean-starting",
        };
        write!(f, "{}({})", kind, self.unit())
    }
}

impl From<BuildEvent> for Task {
    fn from(event: BuildEvent) -> Self {
        match event {
            BuildEvent::AboutToStart(u) => Self::BuildStarting(u),
            BuildEvent::Finished(u) => Self::BuildFinished(u),
            BuildEvent::CleanStarting(u) => Self::CleanStarting(u),
        }
    }
}

impl From<UnitEvent> for Task {
    fn from(event: UnitEvent) -> Self {
        match event {
            UnitEvent::Opened(u) => Self::Create(u),
            UnitEvent::Changed(u) => Self::Change(u),
            UnitEvent::Closed(u) => Self::Delete(u),
        }
    }
}

/// Run one task to completion on the calling thread.
pub fn execute(engine: &Engine, task: &Task, settle: Duration) {
    match task {
        Task::Create(u) => engine.handle_create(u),
        Task::Delete(u) => engine.handle_delete(u),
        Task::Change(u) => engine.handle_change(u),
        Task::Update(u) => {
            engine.handle_delete(u);
            std::thread::sleep(settle);
            engine.handle_create(u);
        }
        Task::BuildStarting(u) => engine.build_about_to_start(u),
        Task::BuildFinished(u) => {
            engine.build_finished(u);
        }
        Task::CleanStarting(u) => engine.clean_starting(u),
    }
}

/// Producer handle for the task queue.
#[derive(Debug, Clone)]
pub struct TaskSender {
    tx: mpsc::UnboundedSender<Task>,
}

impl TaskSender {
    /// Queue a task without waiting for it to run.
    pub fn submit(&self, task: Task) -> Result<()> {
        debug!(%task, "Task submitted");
        self.tx
            .send(task)
            .map_err(|e| FileinstallError::internal(format!("task queue closed, dropped {}", e.0)))
    }
}

/// Single consumer executing tasks in submission order.
pub struct TaskQueue {
    engine: Arc<Engine>,
    rx: mpsc::UnboundedReceiver<Task>,
    settle: Duration,
}

impl TaskQueue {
    pub fn new(engine: Arc<Engine>) -> (Self, TaskSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queue = Self {
            engine,
            rx,
            settle: UPDATE_SETTLE_DELAY,
        };
        (queue, TaskSender { tx })
    }

    /// Override the update settle delay.
    pub fn with_settle_delay(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    /// Execute tasks until every sender is dropped.
    ///
    /// Returns the number of tasks that completed without panicking.
    pub async fn run(mut self) -> usize {
        let mut completed = 0;
        while let Some(task) = self.rx.recv().await {
            let engine = Arc::clone(&self.engine);
            let settle = self.settle;
            let label = task.to_string();
            let handle = tokio::task::spawn_blocking(move || execute(&engine, &task, settle));
            match handle.await {
                Ok(()) => {
                    completed += 1;
                    debug!(task = %label, "Task completed");
                }
                Err(e) => error!(task = %label, "Task failed: {}", e),
            }
        }
        debug!(completed, "Task queue drained");
        completed
    }
}
