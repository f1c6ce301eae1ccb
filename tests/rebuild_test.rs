//! Integration tests for `buildmill rebuild`
//!
//! Covers:
//! - Every project's clean steps run before any build step
//! - Each pass is in dependency order
//! - Artifacts exist again afterwards

mod common;

use common::{TestWorkspace, SAMPLE_PIPELINE};

#[test]
fn test_rebuild_cleans_everything_before_building_anything() {
    let workspace = TestWorkspace::with_pipeline(SAMPLE_PIPELINE);

    let output = workspace.run(&["rebuild"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "rebuild should succeed: {stderr}");
    let log = workspace.read_file("order.log");
    let order: Vec<&str> = log.lines().collect();
    assert_eq!(
        order,
        vec!["lib-clean", "app-clean", "lib-build", "app-build"]
    );
    assert!(workspace.file_exists("lib/lib-built"));
    assert!(workspace.file_exists("app/app-built"));
}

#[test]
fn test_rebuild_replaces_stale_artifacts() {
    let workspace = TestWorkspace::with_pipeline(SAMPLE_PIPELINE);
    workspace.create_file("lib/lib-built", "stale");

    let output = workspace.run(&["rebuild", "lib"]);

    assert!(output.status.success());
    assert_eq!(workspace.read_file("lib/lib-built"), "");
}
