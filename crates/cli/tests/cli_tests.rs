//! CLI integration tests

use std::process::{Command, Output};

fn meshctl(args: &[&str]) -> Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "meshctl", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = meshctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("topology"), "Should show topology command");
    assert!(stdout.contains("explain"), "Should show explain command");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("crd"), "Should show crd command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = meshctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("meshctl"), "Should show binary name");
}

#[test]
fn test_topology_paths_help() {
    let output = meshctl(&["topology", "paths", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Topology paths help should succeed");
    assert!(stdout.contains("<NODE>"), "Should show node argument");
    assert!(stdout.contains("--topology"), "Should show topology option");
}

#[test]
fn test_explain_help() {
    let output = meshctl(&["explain", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Explain help should succeed");
    assert!(stdout.contains("<POD>"), "Should show pod argument");
}

#[test]
fn test_status_help() {
    let output = meshctl(&["status", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "Status help should succeed");
    assert!(stdout.contains("--url"), "Should show url option");
    assert!(stdout.contains("MESHCTL_STATUS_URL"), "Should show env var");
}

/// The CRD is generated offline, no cluster needed
#[test]
fn test_crd_prints_definition() {
    let output = meshctl(&["crd"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "crd should succeed");
    let crd: serde_json::Value = serde_json::from_str(&stdout).expect("CRD should be JSON");
    assert_eq!(crd["kind"], "CustomResourceDefinition");
    assert_eq!(crd["metadata"]["name"], "networktopologies.meshsched.dev");
    assert_eq!(crd["spec"]["scope"], "Cluster");
}

/// Test format option
#[test]
fn test_format_option() {
    let output = meshctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(stdout.contains("--format"), "Should show format option");
    assert!(stdout.contains("table"), "Should show table format");
    assert!(stdout.contains("json"), "Should show json format");
}

/// Test invalid command error handling
#[test]
fn test_invalid_command() {
    let output = meshctl(&["invalid-command"]);
    assert!(!output.status.success(), "Invalid command should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("error") || stderr.contains("invalid"),
        "Should show error message"
    );
}

#[test]
fn test_missing_pod_argument() {
    let output = meshctl(&["explain"]);
    assert!(!output.status.success(), "Missing argument should fail");

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("required") || stderr.contains("error"),
        "Should show error about missing argument"
    );
}
