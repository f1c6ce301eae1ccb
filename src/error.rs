//! Error types for buildmill
//!
//! Domain-specific error types using thiserror.

use std::path::PathBuf;
use thiserror::Error;

/// Project dependency graph errors
#[derive(Error, Debug)]
pub enum GraphError {
    /// Circular dependency detected
    #[error("Circular dependency detected: {}", cycle.join(" -> "))]
    CircularDependency { cycle: Vec<String> },

    /// Project not found in the workspace
    #[error("Project '{name}' not found in the workspace")]
    UnknownProject { name: String },

    /// Dependency edge already present
    #[error("Project '{project}' already depends on '{dependency}'")]
    DuplicateDependency { project: String, dependency: String },
}

/// Build queue errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// A build is already in progress
    #[error("A build is already in progress")]
    AlreadyBuilding,

    /// A step failed its pre-flight validation
    #[error("Step '{step}' of project '{project}' failed pre-flight validation")]
    PreflightFailed { project: String, step: String },

    /// Dependency ordering failed
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Settings map (de)serialization errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Required key missing
    #[error("Missing key '{key}' in settings map")]
    MissingKey { key: String },

    /// Value has the wrong type
    #[error("Key '{key}' has the wrong type: expected {expected}")]
    WrongType { key: String, expected: &'static str },

    /// No factory registered for a step id
    #[error("No step factory registered for id '{id}'")]
    UnknownStepId { id: String },

    /// A count key disagrees with the entries present
    #[error("Key '{key}' announces {expected} entries but '{missing}' is absent")]
    InconsistentCount {
        key: String,
        expected: usize,
        missing: String,
    },
}

/// Pipeline file errors
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pipeline file not found
    #[error("Pipeline file not found at '{path}'")]
    NotFound { path: PathBuf },

    /// TOML parse error
    #[error("Failed to parse pipeline file: {source}")]
    Parse { source: toml::de::Error },

    /// Dependency on a project the file does not declare
    #[error("Project '{project}' depends on unknown project '{dependency}'")]
    UnknownDependency { project: String, dependency: String },

    /// An environment entry that fits no operation form
    #[error("Project '{project}' has an unparsable environment entry '{entry}'")]
    InvalidEnvironment { project: String, entry: String },

    /// Dependency edges form a cycle
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// IO error
    #[error("IO error for '{path}': {error}")]
    Io { path: PathBuf, error: String },
}

/// Child process errors
#[derive(Error, Debug)]
pub enum ProcessError {
    /// Process could not be started
    #[error("Could not start process '{command}': {error}")]
    Spawn { command: String, error: String },

    /// Reading from a process pipe failed
    #[error("Failed to read process output: {error}")]
    Pipe { error: String },
}

/// Top-level buildmill error type
#[derive(Error, Debug)]
pub enum BuildmillError {
    /// Graph error
    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    /// Queue error
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Settings map error
    #[error("Settings error: {0}")]
    Store(#[from] StoreError),

    /// Pipeline file error
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Process error
    #[error("Process error: {0}")]
    Process(#[from] ProcessError),

    /// IO error
    #[error("IO error: {source}")]
    Io { source: std::io::Error },

    /// Generic error
    #[error("{0}")]
    Generic(String),
}
