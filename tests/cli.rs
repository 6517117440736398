#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

#[test]
fn run_loads_default_dotenv_file() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_file(dir.path(), ".env", "ENVSHADE_CLI_DEFAULT=from_default\n");

    let output = run_envshade(
        dir.path(),
        &["run", "--", "printenv", "ENVSHADE_CLI_DEFAULT"],
        None,
    );

    assert_success(&output);
    assert_eq!(stdout_trimmed(&output), "from_default");
}

#[test]
fn run_uses_last_file_precedence_for_selected_files() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_file(dir.path(), ".env.base", "ENVSHADE_CLI_PRECEDENCE=base\n");
    write_file(dir.path(), ".env.local", "ENVSHADE_CLI_PRECEDENCE=local\n");

    let output = run_envshade(
        dir.path(),
        &[
            "run",
            "-f",
            ".env.base,.env.local",
            "--",
            "printenv",
            "ENVSHADE_CLI_PRECEDENCE",
        ],
        None,
    );

    assert_success(&output);
    assert_eq!(stdout_trimmed(&output), "local");
}

#[test]
fn run_keep_existing_controls_inherited_precedence() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_file(dir.path(), ".env", "ENVSHADE_CLI_OVERRIDE=from_file\n");
    let inherited = Some(("ENVSHADE_CLI_OVERRIDE", "from_env"));

    let overridden = run_envshade(
        dir.path(),
        &["run", "--", "printenv", "ENVSHADE_CLI_OVERRIDE"],
        inherited,
    );
    assert_success(&overridden);
    assert_eq!(stdout_trimmed(&overridden), "from_file");

    let kept = run_envshade(
        dir.path(),
        &["run", "-k", "--", "printenv", "ENVSHADE_CLI_OVERRIDE"],
        inherited,
    );
    assert_success(&kept);
    assert_eq!(stdout_trimmed(&kept), "from_env");
}

#[test]
fn run_fails_when_selected_file_is_missing() {
    let dir = TempDir::new().expect("failed to create temp dir");

    let output = run_envshade(
        dir.path(),
        &["run", "-f", "missing.env", "--", "printenv", "PATH"],
        None,
    );

    assert!(
        !output.status.success(),
        "expected missing file to fail: stdout={:?}, stderr={:?}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.env"), "stderr: {stderr:?}");
}

#[test]
fn print_lists_sorted_variables() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_file(
        dir.path(),
        ".env",
        "ENVSHADE_CLI_B=2\nENVSHADE_CLI_A=1\n",
    );

    let output = run_envshade(dir.path(), &["print"], None);
    assert_success(&output);

    let stdout = String::from_utf8_lossy(&output.stdout);
    let ours: Vec<&str> = stdout
        .lines()
        .filter(|line| line.starts_with("ENVSHADE_CLI_"))
        .collect();
    assert_eq!(ours, vec!["ENVSHADE_CLI_A=1", "ENVSHADE_CLI_B=2"]);
}

#[test]
fn get_prints_value_or_default() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_file(dir.path(), ".env", "ENVSHADE_CLI_GET=found\n");

    let found = run_envshade(dir.path(), &["get", "ENVSHADE_CLI_GET"], None);
    assert_success(&found);
    assert_eq!(stdout_trimmed(&found), "found");

    let fallback = run_envshade(
        dir.path(),
        &["get", "ENVSHADE_CLI_UNSET", "--default", "fallback"],
        None,
    );
    assert_success(&fallback);
    assert_eq!(stdout_trimmed(&fallback), "fallback");

    let missing = run_envshade(dir.path(), &["get", "ENVSHADE_CLI_UNSET"], None);
    assert!(!missing.status.success());
    let stderr = String::from_utf8_lossy(&missing.stderr);
    assert!(stderr.contains("ENVSHADE_CLI_UNSET"), "stderr: {stderr:?}");
}

#[test]
fn expand_resolves_inherited_values() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_file(
        dir.path(),
        ".env",
        "ENVSHADE_CLI_EXPANDED=${ENVSHADE_CLI_BASE}/bin\n",
    );

    let output = run_envshade(
        dir.path(),
        &["get", "--expand", "ENVSHADE_CLI_EXPANDED"],
        Some(("ENVSHADE_CLI_BASE", "/opt/app")),
    );

    assert_success(&output);
    assert_eq!(stdout_trimmed(&output), "/opt/app/bin");
}

#[test]
fn print_never_queries_the_toolchain() {
    let dir = TempDir::new().expect("failed to create temp dir");
    write_file(dir.path(), ".env", "ENVSHADE_CLI_TOOLCHAIN=1\n");
    let bin = TempDir::new().expect("failed to create temp dir");
    write_file(bin.path(), "go", "#!/bin/sh\necho /fake/gopath\n");
    std::fs::set_permissions(bin.path().join("go"), std::fs::Permissions::from_mode(0o755))
        .expect("failed to mark fake toolchain executable");

    let path = match std::env::var_os("PATH") {
        Some(inherited) => {
            let mut dirs = vec![bin.path().to_path_buf()];
            dirs.extend(std::env::split_paths(&inherited));
            std::env::join_paths(dirs).expect("failed to join PATH")
        }
        None => bin.path().as_os_str().to_owned(),
    };
    let output = Command::new(env!("CARGO_BIN_EXE_envshade"))
        .current_dir(dir.path())
        .arg("print")
        .env("PATH", path)
        .env_remove("GOPATH")
        .output()
        .expect("failed to run envshade binary");

    assert_success(&output);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ENVSHADE_CLI_TOOLCHAIN=1"), "stdout: {stdout:?}");
    assert!(
        !stdout.lines().any(|line| line.starts_with("GOPATH=")),
        "stdout: {stdout:?}"
    );
}

fn run_envshade(dir: &Path, args: &[&str], env_pair: Option<(&str, &str)>) -> Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_envshade"));
    command.current_dir(dir).args(args);
    if let Some((key, value)) = env_pair {
        command.env(key, value);
    }
    command.output().expect("failed to run envshade binary")
}

fn stdout_trimmed(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout)
        .trim_end()
        .to_string()
}

fn assert_success(output: &Output) {
    assert!(
        output.status.success(),
        "expected success: stdout={:?}, stderr={:?}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

fn write_file(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).expect("failed to write fixture file");
}
