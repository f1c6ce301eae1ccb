//! Deploy command implementation
//!
//! Implements `buildmill deploy`: queue every selected project's build
//! steps, then every selected project's deploy steps. Deployment always
//! works on the active configurations.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::cli::output::{self, status, EventSummary};
use crate::core::events::EventSink;
use crate::core::manager::{AbortPolicy, BuildManager};

/// Deploy options
pub struct DeployOptions {
    /// Projects to deploy, all of them when empty
    pub projects: Vec<String>,
    /// Pipeline file overriding ./buildmill.toml
    pub file: Option<PathBuf>,
    /// Give up on the whole queue after the first failed step
    pub stop_on_error: bool,
}

/// Execute the deploy command
pub async fn execute(project_dir: &Path, options: DeployOptions) -> Result<()> {
    let (pipeline, mut workspace) = super::load_workspace(project_dir, options.file)?;
    let names = super::batch_projects(&pipeline, &workspace, &options.projects)?;
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let (events, mut rx) = EventSink::channel();
    workspace.set_event_sink(events.clone());
    let mut manager = BuildManager::new(events);
    let cancel = super::install_cancel_handler(&manager);

    let policy = if options.stop_on_error {
        AbortPolicy::All
    } else {
        AbortPolicy::FailingTarget
    };

    let mut summary = EventSummary::default();
    let queued = match manager.deploy_projects(&mut workspace, &refs, policy) {
        Ok(queued) => queued,
        Err(error) => {
            output::flush_events(&mut rx, &mut summary);
            return Err(error.into());
        }
    };
    tracing::info!("Queued {queued} steps across {} projects", names.len());

    let success =
        super::drain_with_output(&mut manager, &mut workspace, &mut rx, &mut summary).await;
    if success {
        if !output::is_quiet() {
            if queued == 0 {
                println!("{} Nothing to deploy", status::SUCCESS);
            } else {
                println!("{} Deploy finished", status::SUCCESS);
            }
        }
        Ok(())
    } else if cancel.is_cancelled() {
        bail!("Deployment canceled");
    } else {
        bail!("Deployment failed");
    }
}
