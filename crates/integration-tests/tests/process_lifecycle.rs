// Process Handle lifecycle against real OS processes
//
// Stub shell scripts stand in for the disassembler; they accept the real
// argument vector (-A, -S<script>, target) and ignore it.

#![cfg(unix)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use idascript_core::application::ToolRunner;
use idascript_core::domain::{InvocationTemplate, RunStatus, ToolBitness, ToolMode};
use idascript_core::port::time_provider::SystemTimeProvider;
use idascript_core::port::WaitOutcome;
use idascript_infra_system::SystemToolSpawner;

fn stub_executable(dir: &Path, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("ida-stub");
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn template(executable: &Path) -> InvocationTemplate {
    InvocationTemplate::script_mode(
        executable,
        ToolBitness::B64,
        ToolMode::Headless,
        "/tmp/script.py",
        vec![],
    )
}

fn runner() -> ToolRunner {
    ToolRunner::new(
        Arc::new(SystemToolSpawner::new()),
        Arc::new(SystemTimeProvider),
    )
}

fn pid_is_alive(pid: i32) -> bool {
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

/// Poll until `pred` holds or the deadline passes
async fn eventually(deadline: Duration, mut pred: impl FnMut() -> bool) -> bool {
    let start = tokio::time::Instant::now();
    while start.elapsed() < deadline {
        if pred() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    pred()
}

#[tokio::test]
async fn test_wait_returns_real_exit_codes() {
    for expected in [0, 1, 42] {
        let dir = tempfile::tempdir().unwrap();
        let stub = stub_executable(dir.path(), &format!("exit {}", expected));

        let runner = runner();
        let mut run = runner
            .start(template(&stub).for_target("/bin/ls"))
            .await
            .unwrap();

        assert_eq!(
            run.wait(None).await.unwrap(),
            WaitOutcome::Exited(expected)
        );
        assert_eq!(run.status(), RunStatus::Completed);
        assert_eq!(run.return_code(), Some(expected));
    }
}

#[tokio::test]
async fn test_kill_on_completed_run_is_noop() {
    let dir = tempfile::tempdir().unwrap();
    let stub = stub_executable(dir.path(), "exit 0");

    let runner = runner();
    let mut run = runner
        .start(template(&stub).for_target("/bin/ls"))
        .await
        .unwrap();
    run.wait(None).await.unwrap();

    run.kill().await;
    assert_eq!(run.status(), RunStatus::Completed);
    assert_eq!(run.return_code(), Some(0));
}

#[tokio::test]
async fn test_timeout_then_kill_terminates_process() {
    let dir = tempfile::tempdir().unwrap();
    let stub = stub_executable(dir.path(), "sleep 30");

    let runner = runner();
    let mut run = runner
        .start(template(&stub).for_target("/bin/ls"))
        .await
        .unwrap();
    let pid = run.pid() as i32;

    let outcome = run.wait(Some(Duration::from_millis(100))).await.unwrap();
    assert_eq!(outcome, WaitOutcome::TimedOut);
    assert_eq!(run.status(), RunStatus::TimedOut);
    assert!(pid_is_alive(pid));

    run.kill().await;
    assert_eq!(run.status(), RunStatus::Killed);
    assert!(
        eventually(Duration::from_secs(3), || !pid_is_alive(pid)).await,
        "root process still alive after kill"
    );
}

#[tokio::test]
async fn test_kill_takes_down_descendants() {
    let dir = tempfile::tempdir().unwrap();
    let child_pid_file = dir.path().join("child.pid");

    // The stub backgrounds a long sleep (a descendant) and then hangs on it
    let stub = stub_executable(
        dir.path(),
        "sleep 30 &\necho $! > \"$CHILD_PID_FILE\"\nwait",
    );

    let template = template(&stub).with_extra_env(HashMap::from([(
        "CHILD_PID_FILE".to_string(),
        child_pid_file.display().to_string(),
    )]));

    let runner = runner();
    let mut run = runner.start(template.for_target("/bin/ls")).await.unwrap();

    // Wait for the descendant to announce itself
    assert!(
        eventually(Duration::from_secs(3), || child_pid_file.exists()).await,
        "stub never wrote its child pid"
    );
    let child_pid: i32 = std::fs::read_to_string(&child_pid_file)
        .unwrap()
        .trim()
        .parse()
        .unwrap();
    assert!(pid_is_alive(child_pid));
    assert!(run.is_alive());

    run.kill().await;

    assert!(
        eventually(Duration::from_secs(3), || !pid_is_alive(child_pid)).await,
        "descendant still running after kill"
    );
    assert!(!run.is_alive());
}

#[tokio::test]
async fn test_script_args_reach_the_process() {
    let dir = tempfile::tempdir().unwrap();
    let argv_file = dir.path().join("argv.txt");

    let stub = stub_executable(dir.path(), "echo \"$@\" > \"$ARGV_FILE\"");
    let template = InvocationTemplate::script_mode(
        &stub,
        ToolBitness::B64,
        ToolMode::Headless,
        "/tmp/export.py",
        vec!["--fast".to_string()],
    )
    .with_extra_env(HashMap::from([(
        "ARGV_FILE".to_string(),
        argv_file.display().to_string(),
    )]));

    let runner = runner();
    let mut run = runner.start(template.for_target("/bin/ls")).await.unwrap();
    run.wait(None).await.unwrap();

    let argv = std::fs::read_to_string(&argv_file).unwrap();
    assert_eq!(argv.trim(), "-A -S/tmp/export.py --fast /bin/ls");
}

#[tokio::test]
async fn test_headless_environment_is_exported() {
    let dir = tempfile::tempdir().unwrap();
    let env_file = dir.path().join("env.txt");

    let stub = stub_executable(dir.path(), "echo \"$TVHEADLESS:$TERM\" > \"$ENV_FILE\"");
    let template = template(&stub).with_extra_env(HashMap::from([(
        "ENV_FILE".to_string(),
        env_file.display().to_string(),
    )]));

    let runner = runner();
    let mut run = runner.start(template.for_target("/bin/ls")).await.unwrap();
    run.wait(None).await.unwrap();

    let env = std::fs::read_to_string(&env_file).unwrap();
    assert_eq!(env.trim(), "1:xterm");
}
