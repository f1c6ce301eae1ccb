//! Integration tests for `buildmill check`
//!
//! Covers:
//! - Reporting projects, step counts and the build order
//! - Pre-flight validation of every step without running anything
//! - Rejection of broken pipeline files

mod common;

use std::collections::BTreeSet;

use common::{TestWorkspace, SAMPLE_PIPELINE};
use proptest::prelude::*;

#[test]
fn test_check_reports_a_valid_pipeline() {
    let workspace = TestWorkspace::with_pipeline(SAMPLE_PIPELINE);

    let output = workspace.run(&["check"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "check should succeed: {stderr}");
    assert!(stdout.contains("Pipeline file is valid"));
    assert!(stdout.contains("lib: 1 build, 1 clean, 1 deploy"));
    assert!(stdout.contains("depends on: lib"));
    assert!(stdout.contains("Build order: lib -> app"));
    assert!(stdout.contains("pre-flight checks passed"));
}

#[test]
fn test_check_runs_nothing() {
    let workspace = TestWorkspace::with_pipeline(SAMPLE_PIPELINE);

    let output = workspace.run(&["check"]);

    assert!(output.status.success());
    assert!(!workspace.file_exists("lib/lib-built"));
    assert!(!workspace.file_exists("app/app-built"));
    assert!(!workspace.file_exists("order.log"));
}

#[test]
fn test_check_without_pipeline_fails() {
    let workspace = TestWorkspace::new();

    let output = workspace.run(&["check"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("No buildmill.toml found"));
}

#[test]
fn test_check_rejects_unparsable_toml() {
    let workspace = TestWorkspace::with_pipeline("not toml at all [[[");

    let output = workspace.run(&["check"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Failed to parse pipeline file"), "{stderr}");
}

#[test]
fn test_check_rejects_unknown_dependencies() {
    let workspace = TestWorkspace::with_pipeline(
        r#"
[project.app]
source-directory = "app"
depends = ["ghost"]

[[project.app.build]]
name = "Compile"
command = "sh"
arguments = "-c true"
"#,
    );

    let output = workspace.run(&["check"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(
        stderr.contains("depends on unknown project 'ghost'"),
        "{stderr}"
    );
}

#[test]
fn test_check_rejects_dependency_cycles() {
    let workspace = TestWorkspace::with_pipeline(
        r#"
[project.a]
source-directory = "a"
depends = ["b"]

[project.b]
source-directory = "b"
depends = ["a"]
"#,
    );

    let output = workspace.run(&["check"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("Circular dependency detected"), "{stderr}");
}

#[test]
fn test_check_flags_unresolvable_commands() {
    let workspace = TestWorkspace::with_pipeline(
        r#"
[project.app]
source-directory = "app"

[[project.app.build]]
name = "Compile"
command = "definitely-not-a-real-tool-470"
"#,
    );

    let output = workspace.run(&["check"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success());
    assert!(stderr.contains("could not be found"), "{stderr}");
    assert!(stderr.contains("Check failed"), "{stderr}");
}

// ============================================
// Property-Based Tests
// ============================================

/// Strategy for generating valid project names
fn project_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,12}".prop_filter("non-empty", |s| !s.is_empty())
}

/// Render a pipeline where every project has one marker-creating build step
fn pipeline_for(names: &BTreeSet<String>) -> String {
    let mut pipeline = String::new();
    for name in names {
        pipeline.push_str(&format!(
            r#"
[project.{name}]
source-directory = "{name}"

[[project.{name}.build]]
name = "Touch marker"
command = "sh"
arguments = "-c 'touch built-marker'"
"#
        ));
    }
    pipeline
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// For any pipeline, `buildmill check` reports every project and never
    /// runs a single step.
    #[test]
    fn prop_check_validates_without_running_steps(
        names in proptest::collection::btree_set(project_name_strategy(), 1..4)
    ) {
        let workspace = TestWorkspace::with_pipeline(&pipeline_for(&names));

        let output = workspace.run(&["check"]);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        prop_assert!(
            output.status.success(),
            "check should succeed: stdout={}, stderr={}",
            stdout, stderr
        );
        for name in &names {
            prop_assert!(
                stdout.contains(&format!("{name}: 1 build")),
                "project {} missing from report: {}",
                name, stdout
            );
            prop_assert!(
                !workspace.file_exists(&format!("{name}/built-marker")),
                "check must not run the build step of {}",
                name
            );
        }
    }

    /// Running check twice produces the same verdict and still no artifacts
    #[test]
    fn prop_check_is_idempotent(
        names in proptest::collection::btree_set(project_name_strategy(), 1..3)
    ) {
        let workspace = TestWorkspace::with_pipeline(&pipeline_for(&names));

        let first = workspace.run(&["check"]);
        let second = workspace.run(&["check"]);

        prop_assert_eq!(first.status.success(), second.status.success());
        for name in &names {
            let marker = format!("{name}/built-marker");
            prop_assert!(!workspace.file_exists(&marker));
        }
    }
}
