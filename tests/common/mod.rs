//! Common test utilities and helpers
//!
//! This module provides shared utilities for integration tests.

use std::path::PathBuf;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Test workspace context
///
/// Creates a temporary directory for test pipelines and provides
/// utilities for setting up test scenarios.
pub struct TestWorkspace {
    /// Temporary directory holding the pipeline file
    pub dir: TempDir,
}

impl TestWorkspace {
    /// Create a new test workspace in a temporary directory
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Create a workspace that already contains the given pipeline file
    pub fn with_pipeline(pipeline: &str) -> Self {
        let workspace = Self::new();
        workspace.create_file("buildmill.toml", pipeline);
        workspace
    }

    /// Get the path to the test workspace directory
    pub fn path(&self) -> PathBuf {
        self.dir.path().to_path_buf()
    }

    /// Create a file in the test workspace
    pub fn create_file(&self, name: &str, content: &str) {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        std::fs::write(path, content).expect("Failed to write file");
    }

    /// Check if a file exists in the test workspace
    pub fn file_exists(&self, name: &str) -> bool {
        self.dir.path().join(name).exists()
    }

    /// Read a file from the test workspace
    #[allow(dead_code)]
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(name)).expect("Failed to read file")
    }

    /// Run the buildmill binary in this workspace
    pub fn run(&self, args: &[&str]) -> Output {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_buildmill"));
        cmd.current_dir(self.path());
        for arg in args {
            cmd.arg(arg);
        }
        cmd.output().expect("Failed to execute buildmill")
    }
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Two projects where `app` depends on `lib`; every step drops a marker
/// file and appends its name to `order.log`
#[allow(dead_code)]
pub const SAMPLE_PIPELINE: &str = r#"
[project.lib]
source-directory = "lib"
[[project.lib.build]]
command = "sh"
arguments = "-c 'touch lib-built; echo lib-build >> ../order.log'"
[[project.lib.clean]]
command = "sh"
arguments = "-c 'rm -f lib-built; echo lib-clean >> ../order.log'"
[[project.lib.deploy]]
command = "sh"
arguments = "-c 'touch lib-deployed; echo lib-deploy >> ../order.log'"

[project.app]
depends = ["lib"]
source-directory = "app"
[[project.app.build]]
command = "sh"
arguments = "-c 'test -f ../lib/lib-built && touch app-built; echo app-build >> ../order.log'"
[[project.app.clean]]
command = "sh"
arguments = "-c 'rm -f app-built; echo app-clean >> ../order.log'"
[[project.app.deploy]]
command = "sh"
arguments = "-c 'touch app-deployed; echo app-deploy >> ../order.log'"
"#;
