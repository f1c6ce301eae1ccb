//! Pipeline file (buildmill.toml) parsing and workspace construction
//!
//! The pipeline file declares projects, their dependencies, and the commands
//! behind their build, clean and deploy steps. Loading produces a
//! [`Workspace`] with one target ("default" kit) and one build configuration
//! per project; deploy steps add a deploy configuration.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::defaults::{
    DEFAULT_BUILD_CONFIGURATION, DEFAULT_DEPLOY_CONFIGURATION, DEFAULT_KIT,
};
use crate::core::configuration::{BuildConfiguration, DeployConfiguration};
use crate::core::environment::EnvironmentItem;
use crate::core::process_step::ProcessStep;
use crate::core::project::Project;
use crate::core::step::BuildStep;
use crate::core::target::Target;
use crate::core::workspace::Workspace;
use crate::error::{GraphError, PipelineError};

fn default_source_directory() -> String {
    ".".to_string()
}

fn default_build_directory() -> String {
    "%{sourceDir}".to_string()
}

fn default_true() -> bool {
    true
}

/// The parsed pipeline file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Pipeline {
    /// Declared projects, keyed by display name
    #[serde(default)]
    pub project: BTreeMap<String, ProjectDecl>,
}

/// One `[project.NAME]` table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct ProjectDecl {
    /// Names of projects this one depends on
    #[serde(default)]
    pub depends: Vec<String>,

    /// Where the sources live, relative to the pipeline file
    #[serde(default = "default_source_directory")]
    pub source_directory: String,

    /// Build directory, subject to macro expansion
    #[serde(default = "default_build_directory")]
    pub build_directory: String,

    /// Start from an empty environment instead of the system one
    #[serde(default)]
    pub clear_environment: bool,

    /// Environment deltas (`K=v`, `K`, `K+=v`, `K=+v`), applied in order
    #[serde(default)]
    pub environment: Vec<String>,

    /// Build steps, in execution order
    #[serde(default)]
    pub build: Vec<StepDecl>,

    /// Clean steps, in execution order
    #[serde(default)]
    pub clean: Vec<StepDecl>,

    /// Deploy steps; any entry creates a deploy configuration
    #[serde(default)]
    pub deploy: Vec<StepDecl>,
}

impl Default for ProjectDecl {
    fn default() -> Self {
        Self {
            depends: Vec::new(),
            source_directory: default_source_directory(),
            build_directory: default_build_directory(),
            clear_environment: false,
            environment: Vec::new(),
            build: Vec::new(),
            clean: Vec::new(),
            deploy: Vec::new(),
        }
    }
}

/// One `[[project.NAME.build]]` (or clean/deploy) entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub struct StepDecl {
    /// Executable to run; searched on PATH unless it contains a separator
    pub command: String,

    /// Argument string, split with POSIX shell rules at spawn time
    #[serde(default)]
    pub arguments: String,

    /// Display name; defaults to the command
    #[serde(default)]
    pub name: Option<String>,

    /// Disabled steps are kept but skipped by the scheduler
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Treat a non-zero exit code as success
    #[serde(default)]
    pub ignore_exit_code: bool,

    /// Working directory override; defaults to the build directory
    #[serde(default)]
    pub directory: Option<String>,
}

impl Pipeline {
    /// Load a pipeline from a file path
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|error| {
            if error.kind() == std::io::ErrorKind::NotFound {
                PipelineError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                PipelineError::Io {
                    path: path.to_path_buf(),
                    error: error.to_string(),
                }
            }
        })?;
        Self::from_toml(&content)
    }

    /// Parse a pipeline from TOML text
    pub fn from_toml(content: &str) -> Result<Self, PipelineError> {
        toml::from_str(content).map_err(|source| PipelineError::Parse { source })
    }

    /// Serialize back to TOML text
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Declared project names, in declaration (alphabetical) order
    pub fn project_names(&self) -> Vec<String> {
        self.project.keys().cloned().collect()
    }

    /// Build a [`Workspace`] from the declarations
    ///
    /// Projects are created first, dependency edges second, so forward
    /// references between projects work regardless of declaration order.
    pub fn to_workspace(&self) -> Result<Workspace, PipelineError> {
        let mut workspace = Workspace::new();

        for (name, decl) in &self.project {
            let mut config =
                BuildConfiguration::new(DEFAULT_BUILD_CONFIGURATION, decl.build_directory.clone());
            config.set_clear_system_environment(decl.clear_environment);
            let mut changes = Vec::new();
            for entry in &decl.environment {
                match EnvironmentItem::from_setting(entry) {
                    Some(item) => changes.push(item),
                    None => {
                        return Err(PipelineError::InvalidEnvironment {
                            project: name.clone(),
                            entry: entry.clone(),
                        })
                    }
                }
            }
            config.set_user_environment_changes(changes);
            for step in &decl.build {
                config.build_steps_mut().append_step(build_step(step));
            }
            for step in &decl.clean {
                config.clean_steps_mut().append_step(build_step(step));
            }

            let mut target = Target::new(DEFAULT_KIT);
            target.add_build_configuration(config);
            if !decl.deploy.is_empty() {
                let mut deploy = DeployConfiguration::new(DEFAULT_DEPLOY_CONFIGURATION);
                for step in &decl.deploy {
                    deploy.deploy_steps_mut().append_step(build_step(step));
                }
                target.add_deploy_configuration(deploy);
            }

            let mut project = Project::new(name, decl.source_directory.clone());
            project.add_target(target);
            workspace.add_project(project);
        }

        for (name, decl) in &self.project {
            for dependency in &decl.depends {
                workspace
                    .add_dependency(name, dependency)
                    .map_err(|error| match error {
                        GraphError::UnknownProject { .. } => PipelineError::UnknownDependency {
                            project: name.clone(),
                            dependency: dependency.clone(),
                        },
                        other => PipelineError::Graph(other),
                    })?;
            }
        }

        Ok(workspace)
    }
}

fn build_step(decl: &StepDecl) -> Box<dyn BuildStep> {
    let mut step = ProcessStep::new();
    let name = decl.name.clone().unwrap_or_else(|| decl.command.clone());
    step.data_mut().set_display_name(name);
    step.data_mut().set_enabled(decl.enabled);
    step.set_command(&decl.command);
    step.set_arguments(&decl.arguments);
    if let Some(directory) = &decl.directory {
        step.set_working_directory(directory);
    }
    step.set_ignore_return_value(decl.ignore_exit_code);
    Box::new(step)
}
