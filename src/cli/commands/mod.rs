//! CLI command implementations
//!
//! Each command is implemented in its own submodule. The queue commands
//! (build, clean, rebuild, deploy) share the loading and event-rendering
//! helpers defined here.

pub mod build;
pub mod check;
pub mod clean;
pub mod deploy;
pub mod rebuild;

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use indicatif::ProgressBar;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{self, EventSummary};
use crate::config::defaults::PIPELINE_FILE_NAME;
use crate::core::events::EngineEvent;
use crate::core::manager::BuildManager;
use crate::core::pipeline::Pipeline;
use crate::core::workspace::Workspace;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build projects and the projects they depend on
    Build {
        /// Projects to build (all of them when omitted)
        projects: Vec<String>,

        /// Pipeline file to load instead of ./buildmill.toml
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Build every build configuration, not just the active one
        #[arg(long)]
        all_configurations: bool,

        /// Give up on the whole queue after the first failed step
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Run the clean steps of projects and their dependencies
    Clean {
        /// Projects to clean (all of them when omitted)
        projects: Vec<String>,

        /// Pipeline file to load instead of ./buildmill.toml
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Clean every build configuration, not just the active one
        #[arg(long)]
        all_configurations: bool,

        /// Give up on the whole queue after the first failed step
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Clean projects, then build them again
    Rebuild {
        /// Projects to rebuild (all of them when omitted)
        projects: Vec<String>,

        /// Pipeline file to load instead of ./buildmill.toml
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Rebuild every build configuration, not just the active one
        #[arg(long)]
        all_configurations: bool,

        /// Give up on the whole queue after the first failed step
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Build projects, then run their deploy steps
    Deploy {
        /// Projects to deploy (all of them when omitted)
        projects: Vec<String>,

        /// Pipeline file to load instead of ./buildmill.toml
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,

        /// Give up on the whole queue after the first failed step
        #[arg(long)]
        stop_on_error: bool,
    },

    /// Validate the pipeline file without running anything
    Check {
        /// Pipeline file to load instead of ./buildmill.toml
        #[arg(short, long, value_name = "FILE")]
        file: Option<PathBuf>,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self) -> Result<()> {
        match self {
            Self::Build {
                projects,
                file,
                all_configurations,
                stop_on_error,
            } => {
                let current_dir = std::env::current_dir()?;
                let options = build::BuildOptions {
                    projects,
                    file,
                    all_configurations,
                    stop_on_error,
                };
                build::execute(&current_dir, options).await
            }
            Self::Clean {
                projects,
                file,
                all_configurations,
                stop_on_error,
            } => {
                let current_dir = std::env::current_dir()?;
                let options = clean::CleanOptions {
                    projects,
                    file,
                    all_configurations,
                    stop_on_error,
                };
                clean::execute(&current_dir, options).await
            }
            Self::Rebuild {
                projects,
                file,
                all_configurations,
                stop_on_error,
            } => {
                let current_dir = std::env::current_dir()?;
                let options = rebuild::RebuildOptions {
                    projects,
                    file,
                    all_configurations,
                    stop_on_error,
                };
                rebuild::execute(&current_dir, options).await
            }
            Self::Deploy {
                projects,
                file,
                stop_on_error,
            } => {
                let current_dir = std::env::current_dir()?;
                let options = deploy::DeployOptions {
                    projects,
                    file,
                    stop_on_error,
                };
                deploy::execute(&current_dir, options).await
            }
            Self::Check { file } => {
                let current_dir = std::env::current_dir()?;
                check::execute(&current_dir, file).await
            }
        }
    }
}

/// Load the pipeline file and build the workspace model from it
pub(crate) fn load_workspace(
    project_dir: &Path,
    file: Option<PathBuf>,
) -> Result<(Pipeline, Workspace)> {
    let path = file.unwrap_or_else(|| project_dir.join(PIPELINE_FILE_NAME));
    if !path.exists() {
        bail!("No {PIPELINE_FILE_NAME} found. Create one to describe your projects.");
    }

    let pipeline =
        Pipeline::load(&path).with_context(|| format!("Failed to load {}", path.display()))?;
    let workspace = pipeline
        .to_workspace()
        .with_context(|| format!("Invalid pipeline in {}", path.display()))?;
    Ok((pipeline, workspace))
}

/// Projects a batch should run: the requested names or every project,
/// expanded to include everything they depend on
pub(crate) fn batch_projects(
    pipeline: &Pipeline,
    workspace: &Workspace,
    requested: &[String],
) -> Result<Vec<String>> {
    let names: Vec<String> = if requested.is_empty() {
        pipeline.project_names()
    } else {
        requested.to_vec()
    };
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    Ok(workspace.dependency_closure(&refs)?)
}

/// Cancel the batch on Ctrl-C; returns the batch's cancel token
pub(crate) fn install_cancel_handler(manager: &BuildManager) -> CancellationToken {
    let cancel = manager.cancel_handle();
    let handler = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handler.cancel();
        }
    });
    cancel
}

/// Run the queue while rendering its events; returns whether every step
/// succeeded
pub(crate) async fn drain_with_output(
    manager: &mut BuildManager,
    workspace: &mut Workspace,
    rx: &mut UnboundedReceiver<EngineEvent>,
    summary: &mut EventSummary,
) -> bool {
    let progress = if output::is_quiet() {
        ProgressBar::hidden()
    } else {
        output::create_build_bar(manager.queued_step_count() as u64)
    };

    let (success, ()) = tokio::join!(
        manager.drain(workspace),
        output::pump_events(rx, &progress, summary),
    );
    progress.finish_and_clear();
    success
}
