//! Check command implementation
//!
//! Implements `buildmill check`: load the pipeline file, report what it
//! declares, and run pre-flight validation over every step without
//! executing anything.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cli::output::{self, EventSummary};
use crate::core::events::EventSink;
use crate::core::manager::{AbortPolicy, BuildManager, ConfigSelection};
use crate::core::target::Target;

/// Execute the check command
pub async fn execute(project_dir: &Path, file: Option<PathBuf>) -> Result<()> {
    let (pipeline, mut workspace) = super::load_workspace(project_dir, file)?;

    let names = pipeline.project_names();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let order = workspace.dependency_order(&refs)?;

    println!("Checking pipeline...\n");
    println!("✓ Pipeline file is valid");

    println!("\nProjects ({}):", order.len());
    for name in &order {
        let Some(project) = workspace.find_project(name) else {
            continue;
        };
        let target = project.active_target();
        let config = target.and_then(Target::active_build_configuration);
        let build_steps = config.map_or(0, |config| config.build_steps().count());
        let clean_steps = config.map_or(0, |config| config.clean_steps().count());
        let deploy_steps = target
            .and_then(Target::active_deploy_configuration)
            .map_or(0, |deploy| deploy.deploy_steps().count());
        println!("  • {name}: {build_steps} build, {clean_steps} clean, {deploy_steps} deploy");

        let depends = workspace.direct_dependencies(name);
        if !depends.is_empty() {
            println!("    depends on: {}", depends.join(", "));
        }
    }

    if order.len() > 1 {
        println!("\nBuild order: {}", order.join(" -> "));
    }

    // Run the same pre-flight the batch commands run, then discard the
    // queue instead of draining it.
    let (events, mut rx) = EventSink::channel();
    workspace.set_event_sink(events.clone());
    let mut manager = BuildManager::new(events);
    let mut summary = EventSummary::default();
    let mut checked = 0;

    let rebuild = manager.rebuild_projects(
        &mut workspace,
        &refs,
        ConfigSelection::All,
        AbortPolicy::FailingTarget,
    );
    match rebuild {
        Ok(queued) => {
            checked += queued;
            manager.cancel();
        }
        Err(error) => {
            output::flush_events(&mut rx, &mut summary);
            return Err(error).context("Check failed - fix the issues above");
        }
    }
    match manager.deploy_projects(&mut workspace, &refs, AbortPolicy::FailingTarget) {
        Ok(queued) => {
            checked += queued;
            manager.cancel();
        }
        Err(error) => {
            output::flush_events(&mut rx, &mut summary);
            return Err(error).context("Check failed - fix the issues above");
        }
    }
    output::flush_events(&mut rx, &mut summary);

    println!("\n✓ {checked} pre-flight checks passed - ready to build");
    Ok(())
}
