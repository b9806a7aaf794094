//! Workspace watcher: the build-event and lifecycle-event source.
//!
//! Watches the workspace root recursively using `notify` with debouncing and
//! turns raw file system events into [`WorkspaceEvent`]s:
//!
//! - `.builds/<unit>.json` created/modified -> [`BuildEvent`] per report phase
//! - `<unit>/` directory created -> [`UnitEvent::Opened`]
//! - `<unit>/` directory removed -> [`UnitEvent::Closed`]
//! - `<unit>/.unit.yaml` created/modified/removed -> [`UnitEvent::Changed`]
//!
//! Every other path (sources, build output, generated descriptors) is ignored.
//!
//! ## Example
//!
//! ```no_run
//! use fileinstall_core::watcher::{WorkspaceWatcher, WatcherConfig, WorkspaceEvent};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> fileinstall_core::Result<()> {
//!     let config = WatcherConfig::new(PathBuf::from("/path/to/workspace"));
//!     let (_watcher, mut rx) = WorkspaceWatcher::with_config(config)?;
//!
//!     while let Some(event) = rx.recv().await {
//!         match event {
//!             WorkspaceEvent::Build(build) => println!("build: {:?}", build),
//!             WorkspaceEvent::Unit(unit) => println!("unit: {:?}", unit),
//!             WorkspaceEvent::Error { unit, error } => eprintln!("{}: {}", unit, error),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::{FileinstallError, Result};
use crate::report::{REPORTS_DIR, parse_report_file};
use crate::types::{BuildPhase, UnitName};
use crate::workspace::{UNIT_FILE, is_unit_name};

/// Default debounce duration in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 50;

/// Default channel buffer size for events.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Build notification for one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// A build of the unit is about to start
    AboutToStart(UnitName),
    /// A build of the unit finished
    Finished(UnitName),
    /// A clean of the unit is starting
    CleanStarting(UnitName),
}

impl BuildEvent {
    /// Create the event announced by a report phase.
    pub fn from_phase(unit: impl Into<String>, phase: BuildPhase) -> Self {
        let unit = unit.into();
        match phase {
            BuildPhase::Started => Self::AboutToStart(unit),
            BuildPhase::Finished => Self::Finished(unit),
            BuildPhase::Clean => Self::CleanStarting(unit),
        }
    }

    /// Unit the event is about.
    pub fn unit(&self) -> &str {
        match self {
            Self::AboutToStart(unit) | Self::Finished(unit) | Self::CleanStarting(unit) => unit,
        }
    }
}

/// Unit lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitEvent {
    /// Unit directory appeared
    Opened(UnitName),
    /// Unit descriptor changed (open flag or natures may differ)
    Changed(UnitName),
    /// Unit directory disappeared
    Closed(UnitName),
}

impl UnitEvent {
    /// Unit the event is about.
    pub fn unit(&self) -> &str {
        match self {
            Self::Opened(unit) | Self::Changed(unit) | Self::Closed(unit) => unit,
        }
    }
}

/// Event emitted by the workspace watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceEvent {
    /// Build notification
    Build(BuildEvent),
    /// Lifecycle notification
    Unit(UnitEvent),
    /// A report could not be read. Non-fatal; watching continues.
    Error {
        /// Unit the report belongs to (or "watcher")
        unit: String,
        /// Error message
        error: String,
    },
}

impl WorkspaceEvent {
    /// Unit associated with this event.
    pub fn unit(&self) -> &str {
        match self {
            Self::Build(build) => build.unit(),
            Self::Unit(unit) => unit.unit(),
            Self::Error { unit, .. } => unit,
        }
    }

    /// Returns true if this is an error event.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// Configuration for the workspace watcher.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Workspace root to watch
    pub root: PathBuf,

    /// Debounce duration for coalescing rapid changes
    pub debounce_duration: Duration,

    /// Channel buffer size for events
    pub channel_buffer: usize,
}

impl WatcherConfig {
    /// Create a new config for the given workspace root.
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            debounce_duration: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
        }
    }

    /// Set the debounce duration.
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce_duration = duration;
        self
    }

    /// Set the channel buffer size.
    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.channel_buffer = size;
        self
    }
}

/// Debounced recursive watcher over a workspace root.
pub struct WorkspaceWatcher {
    _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    root: PathBuf,
}

impl WorkspaceWatcher {
    /// Create a watcher and the receiver for its events.
    ///
    /// The report directory is created if missing so that report writes land
    /// in an already-watched directory.
    pub fn with_config(config: WatcherConfig) -> Result<(Self, mpsc::Receiver<WorkspaceEvent>)> {
        let (event_tx, event_rx) = mpsc::channel(config.channel_buffer);

        let reports_dir = config.root.join(REPORTS_DIR);
        if !reports_dir.exists() {
            std::fs::create_dir_all(&reports_dir).map_err(|e| FileinstallError::Io {
                operation: "creating report directory".to_string(),
                path: reports_dir.clone(),
                source: e,
            })?;
            info!("Created report directory: {:?}", reports_dir);
        }

        // Event paths come back absolute and resolved.
        let root = config
            .root
            .canonicalize()
            .map_err(|e| FileinstallError::io("resolving workspace root", &config.root, e))?;
        let root_clone = root.clone();
        let event_tx_clone = event_tx.clone();

        let mut debouncer = new_debouncer(
            config.debounce_duration,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for event in events {
                        for workspace_event in classify_event(&event.event, &root_clone) {
                            if event_tx_clone.blocking_send(workspace_event).is_err() {
                                warn!("Event channel closed, dropping workspace event");
                            }
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        let error = FileinstallError::WatcherError {
                            message: error.to_string(),
                        };
                        error!("{}", error);
                        let _ = event_tx_clone.blocking_send(WorkspaceEvent::Error {
                            unit: "watcher".to_string(),
                            error: error.to_string(),
                        });
                    }
                }
            },
        )
        .map_err(|e| FileinstallError::WatcherInit {
            message: format!("Failed to create debouncer: {}", e),
        })?;

        debouncer
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| FileinstallError::WatcherInit {
                message: format!("Failed to watch directory {:?}: {}", root, e),
            })?;

        info!("Started watching workspace: {:?}", root);

        Ok((
            Self {
                _debouncer: debouncer,
                root,
            },
            event_rx,
        ))
    }

    /// Workspace root being watched.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Where a path sits relative to the workspace root.
#[derive(Debug, PartialEq, Eq)]
enum PathRole {
    Report(UnitName),
    UnitDir(UnitName),
    UnitFile(UnitName),
    Other,
}

fn path_role(path: &Path, root: &Path) -> PathRole {
    let Ok(relative) = path.strip_prefix(root) else {
        return PathRole::Other;
    };
    let parts: Vec<&str> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    match parts.as_slice() {
        [dir, file] if *dir == REPORTS_DIR => match file.strip_suffix(".json") {
            Some(unit) if is_unit_name(unit) => PathRole::Report(unit.to_string()),
            _ => PathRole::Other,
        },
        [unit] if is_unit_name(unit) => PathRole::UnitDir(unit.to_string()),
        [unit, file] if *file == UNIT_FILE && is_unit_name(unit) => {
            PathRole::UnitFile(unit.to_string())
        }
        _ => PathRole::Other,
    }
}

/// Map a raw file system event onto workspace events.
fn classify_event(event: &Event, root: &Path) -> Vec<WorkspaceEvent> {
    let mut out = Vec::new();

    for path in &event.paths {
        let role = path_role(path, root);
        if role == PathRole::Other {
            continue;
        }
        debug!("Processing event {:?} for {:?}", event.kind, path);

        let workspace_event = match (role, event.kind) {
            (PathRole::Report(unit), EventKind::Create(_) | EventKind::Modify(_)) => {
                if !path.exists() {
                    continue;
                }
                match parse_report_file(path) {
                    Ok(report) => WorkspaceEvent::Build(BuildEvent::from_phase(unit, report.phase)),
                    Err(e) => WorkspaceEvent::Error {
                        unit,
                        error: e.to_string(),
                    },
                }
            }
            (PathRole::UnitDir(unit), EventKind::Create(_)) => {
                if !path.is_dir() {
                    continue;
                }
                WorkspaceEvent::Unit(UnitEvent::Opened(unit))
            }
            (PathRole::UnitDir(unit), EventKind::Remove(_)) => {
                WorkspaceEvent::Unit(UnitEvent::Closed(unit))
            }
            // Renames surface as modify-name events on either side.
            (PathRole::UnitDir(unit), EventKind::Modify(notify::event::ModifyKind::Name(_))) => {
                if path.is_dir() {
                    WorkspaceEvent::Unit(UnitEvent::Opened(unit))
                } else {
                    WorkspaceEvent::Unit(UnitEvent::Closed(unit))
                }
            }
            (
                PathRole::UnitFile(unit),
                EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_),
            ) => WorkspaceEvent::Unit(UnitEvent::Changed(unit)),
            _ => continue,
        };

        if !out.contains(&workspace_event) {
            out.push(workspace_event);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{BuildReport, BuildReportReader};
    use notify::event::{CreateKind, ModifyKind, RemoveKind};
    use std::fs;
    use tempfile::TempDir;

    async fn next_matching(
        rx: &mut mpsc::Receiver<WorkspaceEvent>,
        predicate: impl Fn(&WorkspaceEvent) -> bool,
    ) -> WorkspaceEvent {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let event = tokio::time::timeout(remaining, rx.recv())
                .await
                .expect("Timeout waiting for event")
                .expect("Channel closed");
            if predicate(&event) {
                return event;
            }
        }
    }

    #[test]
    fn test_watcher_config_custom() {
        let config = WatcherConfig::new(PathBuf::from("/tmp/ws"))
            .with_debounce(Duration::from_millis(100))
            .with_buffer_size(512);

        assert_eq!(config.root, PathBuf::from("/tmp/ws"));
        assert_eq!(config.debounce_duration, Duration::from_millis(100));
        assert_eq!(config.channel_buffer, 512);
    }

    #[test]
    fn test_path_role() {
        let root = Path::new("/ws");
        assert_eq!(
            path_role(Path::new("/ws/.builds/a.json"), root),
            PathRole::Report("a".into())
        );
        assert_eq!(path_role(Path::new("/ws/a"), root), PathRole::UnitDir("a".into()));
        assert_eq!(
            path_role(Path::new("/ws/a/.unit.yaml"), root),
            PathRole::UnitFile("a".into())
        );
        assert_eq!(path_role(Path::new("/ws/a/src/lib.rs"), root), PathRole::Other);
        assert_eq!(path_role(Path::new("/ws/.builds"), root), PathRole::Other);
        assert_eq!(path_role(Path::new("/ws/.builds/notes.txt"), root), PathRole::Other);
        assert_eq!(path_role(Path::new("/elsewhere/a"), root), PathRole::Other);
    }

    #[test]
    fn test_classify_unit_events() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        fs::create_dir(root.join("unit")).unwrap();

        let created = Event::new(EventKind::Create(CreateKind::Folder)).add_path(root.join("unit"));
        assert_eq!(
            classify_event(&created, root),
            vec![WorkspaceEvent::Unit(UnitEvent::Opened("unit".into()))]
        );

        let removed = Event::new(EventKind::Remove(RemoveKind::Folder)).add_path(root.join("gone"));
        assert_eq!(
            classify_event(&removed, root),
            vec![WorkspaceEvent::Unit(UnitEvent::Closed("gone".into()))]
        );

        let changed = Event::new(EventKind::Modify(ModifyKind::Any))
            .add_path(root.join("unit").join(UNIT_FILE));
        assert_eq!(
            classify_event(&changed, root),
            vec![WorkspaceEvent::Unit(UnitEvent::Changed("unit".into()))]
        );

        let ignored = Event::new(EventKind::Create(CreateKind::File))
            .add_path(root.join("unit").join("deploy").join("x.cfg"));
        assert!(classify_event(&ignored, root).is_empty());
    }

    #[test]
    fn test_classify_report_events() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let reader = BuildReportReader::for_workspace(root);
        reader
            .write_report(&BuildReport::new("w", BuildPhase::Started))
            .unwrap();
        fs::write(reader.report_path("bad"), "garbage").unwrap();

        let started = Event::new(EventKind::Modify(ModifyKind::Any)).add_path(reader.report_path("w"));
        assert_eq!(
            classify_event(&started, root),
            vec![WorkspaceEvent::Build(BuildEvent::AboutToStart("w".into()))]
        );

        let bad = Event::new(EventKind::Create(CreateKind::File)).add_path(reader.report_path("bad"));
        let events = classify_event(&bad, root);
        assert_eq!(events.len(), 1);
        assert!(events[0].is_error());
        assert_eq!(events[0].unit(), "bad");
    }

    #[tokio::test]
    async fn test_watcher_creates_report_directory() {
        let tmp = TempDir::new().unwrap();
        let config = WatcherConfig::new(tmp.path().to_path_buf());

        let (_watcher, _rx) = WorkspaceWatcher::with_config(config).unwrap();

        assert!(tmp.path().join(REPORTS_DIR).is_dir());
    }

    #[tokio::test]
    async fn test_watcher_detects_build_report() {
        let tmp = TempDir::new().unwrap();
        let config = WatcherConfig::new(tmp.path().to_path_buf())
            .with_debounce(Duration::from_millis(10));
        let (_watcher, mut rx) = WorkspaceWatcher::with_config(config).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let reader = BuildReportReader::for_workspace(tmp.path());
        reader
            .write_report(&BuildReport::new("bundle", BuildPhase::Finished))
            .unwrap();

        let event = next_matching(&mut rx, |e| matches!(e, WorkspaceEvent::Build(_))).await;
        assert_eq!(event, WorkspaceEvent::Build(BuildEvent::Finished("bundle".into())));
    }

    #[tokio::test]
    async fn test_watcher_detects_unit_lifecycle() {
        let tmp = TempDir::new().unwrap();
        let config = WatcherConfig::new(tmp.path().to_path_buf())
            .with_debounce(Duration::from_millis(10));
        let (_watcher, mut rx) = WorkspaceWatcher::with_config(config).unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        fs::create_dir(tmp.path().join("fresh")).unwrap();
        let opened = next_matching(&mut rx, |e| matches!(e, WorkspaceEvent::Unit(_))).await;
        assert_eq!(opened, WorkspaceEvent::Unit(UnitEvent::Opened("fresh".into())));

        fs::remove_dir(tmp.path().join("fresh")).unwrap();
        let closed = next_matching(&mut rx, |e| {
            matches!(e, WorkspaceEvent::Unit(UnitEvent::Closed(_)))
        })
        .await;
        assert_eq!(closed.unit(), "fresh");
    }
}
