//! Integration tests for the CLI
//!
//! Tests the command-line interface for apply, status, and list commands

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Helper to create a bundle and a plugins directory
fn setup_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();

    let bundle = dir.path().join("bundle");
    fs::create_dir(&bundle).unwrap();
    fs::write(bundle.join("1.js"), "function f(a,b){return a+b}\n").unwrap();
    fs::write(bundle.join("2.js"), "e.track(t);\n").unwrap();

    let plugins = dir.path().join("plugins");
    fs::create_dir(&plugins).unwrap();
    fs::write(
        plugins.join("subtract.toml"),
        r#"[plugin]
name = "Subtract"
description = "Turns sums into differences"
authors = ["Ada", "Grace"]

[[patches]]
id = "sum"
find = "a+b"

[[patches.replacements]]
match = 'a\+b'
replace = "a-b"
"#,
    )
    .unwrap();
    fs::write(
        plugins.join("no-track.toml"),
        r#"[plugin]
name = "NoTrack"
host_version_range = ">=1.0.0"

[[patches]]
id = "analytics"
find = ".track("

[[patches.replacements]]
match = '(\i)\.track\((\i)\)'
replace = "void 0"
"#,
    )
    .unwrap();

    dir
}

fn hostpatch(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_hostpatch"))
        .args(args)
        .env_remove("HOSTPATCH_LOG")
        .env("NO_COLOR", "1")
        .env("CLICOLOR", "0")
        .output()
        .unwrap()
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_apply_help() {
    let output = hostpatch(&["apply", "--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Apply plugin patches to a bundle"));
}

#[test]
fn test_apply_rewrites_bundle() {
    let workspace = setup_workspace();
    let bundle = workspace.path().join("bundle");
    let plugins = workspace.path().join("plugins");

    let output = hostpatch(&[
        "apply",
        "--bundle",
        path_arg(&bundle),
        "--plugins",
        path_arg(&plugins),
        "--host-version",
        "1.2.0",
    ]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "stdout: {stdout}");
    assert!(stdout.contains("Subtract/sum [module 1]: Applied"));
    assert!(stdout.contains("NoTrack/analytics [module 2]: Applied"));
    assert!(stdout.contains("Summary:"));

    assert_eq!(
        fs::read_to_string(bundle.join("1.js")).unwrap(),
        "function f(a,b){return a-b}\n"
    );
    assert_eq!(fs::read_to_string(bundle.join("2.js")).unwrap(), "void 0;\n");
}

#[test]
fn test_apply_dry_run_with_diff_writes_nothing() {
    let workspace = setup_workspace();
    let bundle = workspace.path().join("bundle");
    let plugins = workspace.path().join("plugins");

    let output = hostpatch(&[
        "apply",
        "--bundle",
        path_arg(&bundle),
        "--plugins",
        path_arg(&plugins),
        "--dry-run",
        "--diff",
    ]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());
    assert!(stdout.contains("DRY RUN"));
    assert!(stdout.contains("Would apply"));
    assert!(stdout.contains("+function f(a,b){return a-b}"));
    assert_eq!(
        fs::read_to_string(bundle.join("1.js")).unwrap(),
        "function f(a,b){return a+b}\n"
    );
}

#[test]
fn test_apply_to_out_dir() {
    let workspace = setup_workspace();
    let bundle = workspace.path().join("bundle");
    let plugins = workspace.path().join("plugins");
    let out = workspace.path().join("out");

    let output = hostpatch(&[
        "apply",
        "--bundle",
        path_arg(&bundle),
        "--plugins",
        path_arg(&plugins),
        "--out",
        path_arg(&out),
    ]);

    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(out.join("1.js")).unwrap(),
        "function f(a,b){return a-b}\n"
    );
    assert_eq!(
        fs::read_to_string(bundle.join("1.js")).unwrap(),
        "function f(a,b){return a+b}\n"
    );
}

#[test]
fn test_second_apply_reports_already_applied() {
    let workspace = setup_workspace();
    let bundle = workspace.path().join("bundle");
    let plugins = workspace.path().join("plugins");
    let args = [
        "apply",
        "--bundle",
        path_arg(&bundle),
        "--plugins",
        path_arg(&plugins),
    ];

    assert!(hostpatch(&args).status.success());
    let output = hostpatch(&args);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {stderr}");
    assert!(stdout.contains("Subtract/sum [module 1]: Already applied"));
    assert!(stdout.contains("NoTrack/analytics [module 2]: Already applied"));
    assert!(!stderr.contains("CONFLICT"));

    let status = hostpatch(&["status", "--bundle", path_arg(&bundle), "--plugins", path_arg(&plugins)]);
    let stdout = String::from_utf8_lossy(&status.stdout);
    assert!(stdout.contains("APPLIED (2 patches)"));
    assert!(!stdout.contains("NOT APPLIED"));
}

#[test]
fn test_apply_missing_target_exits_nonzero() {
    let workspace = setup_workspace();
    let bundle = workspace.path().join("bundle");
    let plugins = workspace.path().join("plugins");
    fs::write(bundle.join("2.js"), "nothing here\n").unwrap();

    let output = hostpatch(&[
        "apply",
        "--bundle",
        path_arg(&bundle),
        "--plugins",
        path_arg(&plugins),
    ]);

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("NoTrack/analytics"));
    assert!(stderr.contains("CONFLICT"));
    // The other plugin's patch still landed
    assert_eq!(
        fs::read_to_string(bundle.join("1.js")).unwrap(),
        "function f(a,b){return a-b}\n"
    );
}

#[test]
fn test_settings_disable_plugin() {
    let workspace = setup_workspace();
    let bundle = workspace.path().join("bundle");
    let plugins = workspace.path().join("plugins");
    let settings = workspace.path().join("settings.json");
    fs::write(
        &settings,
        r#"{ "plugins": { "NoTrack": { "enabled": false } } }"#,
    )
    .unwrap();

    let output = hostpatch(&[
        "apply",
        "--bundle",
        path_arg(&bundle),
        "--plugins",
        path_arg(&plugins),
        "--settings",
        path_arg(&settings),
    ]);

    assert!(output.status.success());
    assert_eq!(fs::read_to_string(bundle.join("2.js")).unwrap(), "e.track(t);\n");
    assert_eq!(
        fs::read_to_string(bundle.join("1.js")).unwrap(),
        "function f(a,b){return a-b}\n"
    );
}

#[test]
fn test_dry_run_leaves_settings_file_untouched() {
    let workspace = setup_workspace();
    let bundle = workspace.path().join("bundle");
    let plugins = workspace.path().join("plugins");
    let settings = workspace.path().join("settings.json");
    fs::write(&settings, "{}").unwrap();

    let output = hostpatch(&[
        "apply",
        "--bundle",
        path_arg(&bundle),
        "--plugins",
        path_arg(&plugins),
        "--settings",
        path_arg(&settings),
        "--dry-run",
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Would apply"));
    assert_eq!(fs::read(&settings).unwrap(), b"{}");
}

#[test]
fn test_status_is_read_only() {
    let workspace = setup_workspace();
    let bundle = workspace.path().join("bundle");
    let plugins = workspace.path().join("plugins");

    let output = hostpatch(&[
        "status",
        "--bundle",
        path_arg(&bundle),
        "--plugins",
        path_arg(&plugins),
        "--host-version",
        "0.9.0",
    ]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Patch Status Report"));
    assert!(stdout.contains("NOT APPLIED"));
    assert!(stdout.contains("SKIPPED"));
    assert_eq!(
        fs::read_to_string(bundle.join("1.js")).unwrap(),
        "function f(a,b){return a+b}\n"
    );
}

#[test]
fn test_list_plugins() {
    let workspace = setup_workspace();
    let plugins = workspace.path().join("plugins");

    let output = hostpatch(&["list", "--plugins", path_arg(&plugins)]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Subtract"));
    assert!(stdout.contains("Turns sums into differences"));
    assert!(stdout.contains("by: Ada, Grace"));
    assert!(stdout.contains("host: >=1.0.0"));
    assert!(stdout.contains("- sum (1 replacements)"));
}

#[test]
fn test_list_rejects_invalid_manifest() {
    let workspace = setup_workspace();
    let plugins = workspace.path().join("plugins");
    fs::write(plugins.join("bad.toml"), "[plugin]\nname = \"Bad\"\n[[patches]]\n").unwrap();

    let output = hostpatch(&["list", "--plugins", path_arg(&plugins)]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("bad.toml"));
}
