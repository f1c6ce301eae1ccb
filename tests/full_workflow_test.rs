//! Integration tests for the full pipeline workflow
//!
//! Drives the binary through a whole lifecycle on one pipeline:
//! check -> build -> deploy -> clean -> rebuild.

use std::process::{Command, Output};

use assert_fs::prelude::*;
use assert_fs::TempDir;
use predicates::prelude::*;

/// Two projects where `tool` links against `core` and both stage into dist/
const WORKFLOW_PIPELINE: &str = r#"
[project.core]
source-directory = "core"

[[project.core.build]]
name = "Compile core"
command = "sh"
arguments = "-c 'touch core-built; echo core-build >> ../workflow.log'"

[[project.core.clean]]
name = "Clean core"
command = "sh"
arguments = "-c 'rm -f core-built'"

[[project.core.deploy]]
name = "Stage core"
command = "sh"
arguments = "-c 'mkdir -p ../dist && cp core-built ../dist/core'"

[project.tool]
source-directory = "tool"
depends = ["core"]

[[project.tool.build]]
name = "Compile tool"
command = "sh"
arguments = "-c 'test -f ../core/core-built && touch tool-built; echo tool-build >> ../workflow.log'"

[[project.tool.clean]]
name = "Clean tool"
command = "sh"
arguments = "-c 'rm -f tool-built'"

[[project.tool.deploy]]
name = "Stage tool"
command = "sh"
arguments = "-c 'mkdir -p ../dist && cp tool-built ../dist/tool'"
"#;

/// Helper to run buildmill with arguments
fn run_buildmill(dir: &TempDir, args: &[&str]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_buildmill"));
    cmd.current_dir(dir.path());
    for arg in args {
        cmd.arg(arg);
    }
    cmd.output().expect("Failed to execute buildmill")
}

/// Helper to create a workspace holding the workflow pipeline
fn workflow_dir() -> TempDir {
    let dir = TempDir::new().expect("Failed to create temp directory");
    dir.child("buildmill.toml")
        .write_str(WORKFLOW_PIPELINE)
        .expect("Failed to write pipeline file");
    dir
}

#[test]
fn test_check_build_deploy_workflow() {
    let dir = workflow_dir();

    // Step 1: check validates without running anything
    let check = run_buildmill(&dir, &["check"]);
    let check_stdout = String::from_utf8_lossy(&check.stdout);
    assert!(
        check.status.success(),
        "check should succeed: {}",
        String::from_utf8_lossy(&check.stderr)
    );
    assert!(predicate::str::contains("pre-flight checks passed").eval(&check_stdout));
    dir.child("core/core-built").assert(predicate::path::missing());

    // Step 2: build produces artifacts in dependency order
    let build = run_buildmill(&dir, &["build"]);
    assert!(
        build.status.success(),
        "build should succeed: {}",
        String::from_utf8_lossy(&build.stderr)
    );
    dir.child("core/core-built").assert(predicate::path::exists());
    dir.child("tool/tool-built").assert(predicate::path::exists());

    // Step 3: deploy stages both projects
    let deploy = run_buildmill(&dir, &["deploy"]);
    assert!(
        deploy.status.success(),
        "deploy should succeed: {}",
        String::from_utf8_lossy(&deploy.stderr)
    );
    dir.child("dist/core").assert(predicate::path::exists());
    dir.child("dist/tool").assert(predicate::path::exists());
}

#[test]
fn test_clean_then_rebuild_restores_artifacts() {
    let dir = workflow_dir();

    let build = run_buildmill(&dir, &["build"]);
    assert!(build.status.success());

    let clean = run_buildmill(&dir, &["clean"]);
    assert!(clean.status.success());
    dir.child("core/core-built").assert(predicate::path::missing());
    dir.child("tool/tool-built").assert(predicate::path::missing());

    let rebuild = run_buildmill(&dir, &["rebuild"]);
    assert!(rebuild.status.success());
    dir.child("core/core-built").assert(predicate::path::exists());
    dir.child("tool/tool-built").assert(predicate::path::exists());

    // Each build list ran twice, once for build and once for rebuild
    dir.child("workflow.log").assert(
        predicate::str::contains("core-build")
            .count(2)
            .and(predicate::str::contains("tool-build").count(2)),
    );
}

#[test]
fn test_failed_build_blocks_deployment() {
    let dir = TempDir::new().expect("Failed to create temp directory");
    dir.child("buildmill.toml")
        .write_str(
            r#"
[project.svc]
source-directory = "svc"

[[project.svc.build]]
name = "Compile"
command = "sh"
arguments = "-c 'exit 1'"

[[project.svc.deploy]]
name = "Stage"
command = "sh"
arguments = "-c 'mkdir -p ../dist && touch ../dist/svc'"
"#,
        )
        .expect("Failed to write pipeline file");

    let deploy = run_buildmill(&dir, &["deploy"]);
    let stderr = String::from_utf8_lossy(&deploy.stderr);

    assert!(!deploy.status.success());
    assert!(predicate::str::contains("Deployment failed").eval(&stderr));
    dir.child("dist/svc").assert(predicate::path::missing());
}

#[test]
fn test_help_lists_the_workflow_commands() {
    let dir = TempDir::new().expect("Failed to create temp directory");

    let help = run_buildmill(&dir, &["--help"]);
    let stdout = String::from_utf8_lossy(&help.stdout);

    assert!(help.status.success());
    for command in ["build", "clean", "rebuild", "deploy", "check"] {
        assert!(
            predicate::str::contains(command).eval(&stdout),
            "help should list {command}: {stdout}"
        );
    }
}
