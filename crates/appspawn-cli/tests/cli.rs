//! The `appspawn` binary's exit codes and messages.

use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};

use tempfile::TempDir;

fn appspawn(run_dir: &TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_appspawn"))
        .args(args)
        .env("APPSPAWN_RUN_DIR", run_dir.path())
        .env_remove("APPSPAWN_LOG")
        .output()
        .expect("run appspawn")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn edition_only_option_exits_with_config_error() {
    let run_dir = TempDir::new().unwrap();
    let app = TempDir::new().unwrap();
    let root = app.path().to_str().unwrap();

    let output = appspawn(&run_dir, &["start", "--app-root", root, "--concurrency-model", "thread"]);

    assert_eq!(output.status.code(), Some(78));
    assert!(stderr(&output).contains("'--concurrency-model' option is only available"));
}

#[test]
fn status_of_unknown_app_is_not_running() {
    let run_dir = TempDir::new().unwrap();
    let app = TempDir::new().unwrap();
    let root = app.path().to_str().unwrap();

    let output = appspawn(&run_dir, &["status", "--app-root", root]);

    assert_eq!(output.status.code(), Some(3));
    assert!(stderr(&output).contains("appspawn backend is not running."));
}

#[test]
fn ping_of_missing_socket_is_unavailable() {
    let run_dir = TempDir::new().unwrap();
    let socket = format!("unix:{}", run_dir.path().join("none.sock").display());

    let output = appspawn(&run_dir, &["ping", &socket, "--timeout-ms", "200"]);

    assert_eq!(output.status.code(), Some(69));
}

#[test]
fn missing_app_root_is_a_usage_error() {
    let run_dir = TempDir::new().unwrap();

    let output = appspawn(&run_dir, &["start", "--app-root", "/nonexistent/appspawn/app"]);

    assert_eq!(output.status.code(), Some(2));
    assert!(stderr(&output).contains("does not exist"));
}

#[test]
fn malformed_endpoint_is_rejected_by_the_parser() {
    let run_dir = TempDir::new().unwrap();

    let output = appspawn(&run_dir, &["ping", "localhost:80"]);

    assert_eq!(output.status.code(), Some(2));
}

/// The agent built alongside this binary, when the workspace built it.
fn sibling_agent() -> Option<PathBuf> {
    let cli = PathBuf::from(env!("CARGO_BIN_EXE_appspawn"));
    let agent = cli.with_file_name("appspawn-agent");
    agent.is_file().then_some(agent)
}

#[test]
fn second_start_fails_with_running_pid() {
    let Some(agent) = sibling_agent() else {
        eprintln!("appspawn-agent not built; skipping");
        return;
    };
    let run_dir = TempDir::new().unwrap();
    let app = TempDir::new().unwrap();
    fs::write(app.path().join("startup.sh"), "echo APP_NAME=cli\n").unwrap();
    let root = app.path().to_str().unwrap();
    let agent = agent.to_str().unwrap();
    let args = ["--agent", agent, "start", "--app-root", root];

    let first = appspawn(&run_dir, &args);
    assert_eq!(first.status.code(), Some(0), "{}", stderr(&first));
    let stdout = String::from_utf8_lossy(&first.stdout).into_owned();
    assert!(stdout.contains("appspawn backend started on PID"), "{stdout}");

    let second = appspawn(&run_dir, &args);
    let stop = appspawn(&run_dir, &["--agent", agent, "stop", "--app-root", root]);

    assert_eq!(second.status.code(), Some(1));
    assert!(second.stdout.is_empty());
    assert!(
        stderr(&second).contains("appspawn backend is already running on PID"),
        "{}",
        stderr(&second)
    );
    assert_eq!(stop.status.code(), Some(0), "{}", stderr(&stop));
}
