//! Integration tests for the command-line interface

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

const VALUES: &str = r#"app:
  image: registry.local/app # {"$rebase": "app:name"}
  tag: 1.0.0 # {"$rebase": "app:tag"}
  replicas: 1 # scale
"#;

fn stacker(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_stacker"))
        .args(args)
        .current_dir(cwd)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("values.yaml"), VALUES).unwrap();
    dir
}

#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    let output = stacker(&["--help"], dir.path());
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("scan"));
    assert!(stdout.contains("pin"));
    assert!(stdout.contains("apply"));
}

#[test]
fn test_cli_scan_lists_annotations() {
    let workspace = setup_workspace();
    let output = stacker(&["scan", "values.yaml"], workspace.path());
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("registry.local/app:1.0.0"));
    assert!(stdout.contains("name line 2, tag line 3"));
}

#[test]
fn test_cli_scan_fails_on_malformed_annotation() {
    let workspace = setup_workspace();
    fs::write(
        workspace.path().join("bad.yaml"),
        "a: x # {\"$rebase\": \"only-id\"}\n",
    )
    .unwrap();
    let output = stacker(&["scan", "bad.yaml"], workspace.path());
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("only-id"));
}

#[test]
fn test_cli_set_writes_file() {
    let workspace = setup_workspace();
    let output = stacker(
        &["set", "values.yaml", "app.replicas", "4"],
        workspace.path(),
    );
    assert!(output.status.success());
    let written = fs::read_to_string(workspace.path().join("values.yaml")).unwrap();
    assert!(written.contains("  replicas: 4 # scale\n"));
}

#[test]
fn test_cli_set_string_type() {
    let workspace = setup_workspace();
    let output = stacker(
        &["set", "values.yaml", "app.replicas", "4", "--type", "string"],
        workspace.path(),
    );
    assert!(output.status.success());
    let written = fs::read_to_string(workspace.path().join("values.yaml")).unwrap();
    assert!(written.contains("  replicas: \"4\" # scale\n"));
}

#[test]
fn test_cli_set_missing_path_fails() {
    let workspace = setup_workspace();
    let output = stacker(
        &["set", "values.yaml", "app.missing", "x"],
        workspace.path(),
    );
    assert!(!output.status.success());
    assert_eq!(
        fs::read_to_string(workspace.path().join("values.yaml")).unwrap(),
        VALUES
    );

    let output = stacker(
        &["set", "values.yaml", "app.missing", "x", "--create"],
        workspace.path(),
    );
    assert!(output.status.success());
    assert!(fs::read_to_string(workspace.path().join("values.yaml"))
        .unwrap()
        .ends_with("  missing: x\n"));
}

#[test]
fn test_cli_pin_dry_run_with_diff() {
    let workspace = setup_workspace();
    let output = stacker(
        &[
            "pin",
            "values.yaml",
            "--digest",
            "app=sha256:abcd",
            "--dry-run",
            "--diff",
        ],
        workspace.path(),
    );
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1.0.0@sha256:abcd"));
    assert_eq!(
        fs::read_to_string(workspace.path().join("values.yaml")).unwrap(),
        VALUES
    );
}

#[test]
fn test_cli_pin_rejects_bad_digest() {
    let workspace = setup_workspace();
    let output = stacker(
        &["pin", "values.yaml", "--digest", "app=latest"],
        workspace.path(),
    );
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ID=algorithm:hex"));
}

#[test]
fn test_cli_apply_plan() {
    let workspace = setup_workspace();
    fs::write(
        workspace.path().join("stacker.toml"),
        r#"
[meta]
name = "cli"

[digests]
app = "sha256:1234"

[[documents]]
file = "values.yaml"
fields = [{ path = "app.replicas", value = 2 }]
"#,
    )
    .unwrap();

    let workspace_arg = workspace.path().to_str().unwrap();
    let output = stacker(&["apply", "--workspace", workspace_arg], workspace.path());
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Summary:"));

    let written = fs::read_to_string(workspace.path().join("values.yaml")).unwrap();
    assert!(written.contains("tag: 1.0.0@sha256:1234 #"));
    assert!(written.contains("replicas: 2 # scale"));

    // Second run changes nothing
    let output = stacker(&["apply", "--workspace", workspace_arg], workspace.path());
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("unchanged"));
}

#[test]
fn test_cli_apply_missing_plan_fails() {
    let workspace = setup_workspace();
    let output = stacker(&["apply"], workspace.path());
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("stacker.toml"));
}
