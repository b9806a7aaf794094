//! fileinstall - hot-deploy descriptor manager
//!
//! Watches a workspace of build units and keeps the deploy descriptors of
//! master units in step with the build health of their worker units.
//!
//! ## Usage
//!
//! ```bash
//! # Watch a workspace until Ctrl-C
//! fileinstall --workspace ~/ws run
//!
//! # Turn a unit into a master and deploy its dependencies
//! fileinstall --workspace ~/ws activate my-runtime
//!
//! # Recreate every descriptor of a master
//! fileinstall --workspace ~/ws update my-runtime
//!
//! # Show what is deployed where
//! fileinstall --workspace ~/ws status --json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use fileinstall_core::types::{BUILD_NATURE, MASTER_NATURE};
use fileinstall_core::watcher::DEFAULT_DEBOUNCE_MS;
use fileinstall_core::{
    DirWorkspace, FileinstallError, LogGuard, WatcherConfig, Workspace, WorkspaceWatcher,
    init_logging,
};
use fileinstall_engine::{Engine, Task, TaskQueue, UPDATE_SETTLE_DELAY};
use tracing::{debug, error, info, warn};

/// fileinstall hot-deploy descriptor manager
///
/// Maintains one deploy descriptor per (master, worker) pair and writes or
/// removes it as the worker's build succeeds or fails.
#[derive(Parser, Debug)]
#[command(name = "fileinstall")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging (increases log level)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Directory for log files (defaults to ~/.fileinstall/logs/)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Workspace root directory
    #[arg(short, long, env = "FILEINSTALL_WORKSPACE", default_value = ".", global = true)]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the workspace and maintain descriptors until interrupted
    Run {
        /// Debounce window for file system events, in milliseconds
        #[arg(long, default_value_t = DEFAULT_DEBOUNCE_MS)]
        debounce_ms: u64,
    },
    /// Make a unit a master and create its descriptors
    Activate { unit: String },
    /// Remove the master role from a unit and delete its descriptors
    Deactivate { unit: String },
    /// Delete and recreate a unit's descriptors
    Update { unit: String },
    /// Print tracked masters, workers and descriptors
    Status {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let _guard = match setup_logging(&cli) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::from(1);
        }
    };

    match run_command(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fileinstall error: {:#}", e);
            eprintln!("Error: {:#}", e);
            if let Some(hint) = e
                .downcast_ref::<FileinstallError>()
                .and_then(FileinstallError::guidance)
            {
                eprintln!("Hint: {}", hint);
            }
            ExitCode::from(1)
        }
    }
}

/// Set up logging based on CLI arguments.
fn setup_logging(cli: &Cli) -> fileinstall_core::Result<LogGuard> {
    init_logging(cli.log_dir.clone(), cli.verbose > 0)
}

async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let workspace = DirWorkspace::new(&cli.workspace)
        .with_context(|| format!("opening workspace {}", cli.workspace.display()))?;
    let workspace = Arc::new(workspace);
    let engine = Arc::new(Engine::new(workspace.clone()));

    match cli.command {
        Command::Run { debounce_ms } => run_daemon(workspace, engine, debounce_ms).await,
        Command::Activate { unit } => {
            require_unit(workspace.as_ref(), &unit)?;
            let added = workspace.add_natures(&unit, &[MASTER_NATURE, BUILD_NATURE])?;
            debug!(unit = %unit, added, "natures updated");
            one_shot(engine, move |engine| {
                engine.scan();
                engine.activate_master(&unit);
            })
            .await
        }
        Command::Deactivate { unit } => {
            require_unit(workspace.as_ref(), &unit)?;
            let ws = workspace.clone();
            one_shot(engine, move |engine| {
                engine.scan();
                match ws.remove_nature(&unit, MASTER_NATURE) {
                    Ok(removed) => debug!(unit = %unit, removed, "natures updated"),
                    Err(e) => warn!(unit = %unit, "Failed to remove nature: {}", e),
                }
                engine.handle_delete(&unit);
            })
            .await
        }
        Command::Update { unit } => {
            require_unit(workspace.as_ref(), &unit)?;
            one_shot(engine, move |engine| {
                engine.scan();
                engine.handle_delete(&unit);
                std::thread::sleep(UPDATE_SETTLE_DELAY);
                engine.handle_create(&unit);
            })
            .await
        }
        Command::Status { json } => {
            let status = tokio::task::spawn_blocking(move || {
                engine.scan();
                engine.snapshot()
            })
            .await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print!("{}", status.render_text());
            }
            Ok(())
        }
    }
}

fn require_unit(workspace: &dyn Workspace, unit: &str) -> anyhow::Result<()> {
    if !workspace.unit_exists(unit) {
        bail!("unit '{}' not found in {}", unit, workspace.root_path().display());
    }
    Ok(())
}

/// Run a synchronous engine action off the async runtime.
async fn one_shot(
    engine: Arc<Engine>,
    action: impl FnOnce(&Engine) + Send + 'static,
) -> anyhow::Result<()> {
    tokio::task::spawn_blocking(move || action(&engine))
        .await
        .context("engine action panicked")
}

async fn run_daemon(
    workspace: Arc<DirWorkspace>,
    engine: Arc<Engine>,
    debounce_ms: u64,
) -> anyhow::Result<()> {
    let config = WatcherConfig::new(workspace.root_path().to_path_buf())
        .with_debounce(Duration::from_millis(debounce_ms));
    let (watcher, mut events) = WorkspaceWatcher::with_config(config)?;
    info!(root = %watcher.root().display(), "Watching workspace");

    {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || engine.start())
            .await
            .context("startup scan panicked")?;
    }

    let (queue, sender) = TaskQueue::new(Arc::clone(&engine));
    let runner = tokio::spawn(queue.run());

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    warn!("Watcher channel closed");
                    break;
                };
                if let Some(task) = Task::from_event(event) {
                    sender.submit(task)?;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
        }
    }

    drop(watcher);
    drop(sender);
    let completed = runner.await.context("task runner panicked")?;
    debug!(completed, "Task runner finished");

    tokio::task::spawn_blocking(move || engine.stop())
        .await
        .context("shutdown panicked")?;
    info!("fileinstall stopped");
    Ok(())
}
