use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Check if running as root
fn is_root() -> bool {
    unsafe { libc::getuid() == 0 }
}

fn mnexec() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_mnexec"));
    cmd.env_remove("MNEXEC_CGROUP_ROOT")
        .env_remove("MNEXEC_LOG")
        .timeout(Duration::from_secs(30));
    cmd
}

/// Parse the `^A<pid>` line out of stdout
fn marker_pid(stdout: &[u8]) -> i32 {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .find(|line| line.starts_with('\u{1}'))
        .unwrap_or_else(|| panic!("no pid marker in {text:?}"));
    line[1..].parse().unwrap()
}

fn fake_controller(root: &Path, controller: &str, group: &str) -> std::path::PathBuf {
    let dir = root.join(controller).join(group);
    fs::create_dir_all(&dir).unwrap();
    let tasks = dir.join("tasks");
    fs::write(&tasks, "").unwrap();
    tasks
}

#[test]
fn test_help() {
    mnexec()
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Execution utility for Mininet"))
        .stdout(predicate::str::contains("-g <GROUP>"))
        .stdout(predicate::str::contains("-a <PID>"));
}

#[test]
fn test_version() {
    mnexec()
        .arg("-v")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_missing_command() {
    mnexec()
        .arg("-c")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no command given"));
}

#[test]
fn test_unknown_flag() {
    mnexec().arg("-x").arg("true").assert().code(1);
}

#[test]
fn test_exec_runs_command() {
    mnexec()
        .args(["echo", "hello", "world"])
        .assert()
        .success()
        .stdout("hello world\n");
}

#[test]
fn test_exec_keeps_command_exit_code() {
    mnexec().args(["sh", "-c", "exit 7"]).assert().code(7);
}

#[test]
fn test_exec_failure() {
    mnexec()
        .arg("/nonexistent/mnexec-command")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("/nonexistent/mnexec-command: "));
}

#[test]
fn test_print_pid() {
    mnexec()
        .args(["-p", "echo", "hello"])
        .assert()
        .success()
        .stdout(predicate::str::is_match(r"^\x01[0-9]+\nhello\n$").unwrap());
}

#[test]
fn test_print_pid_is_the_exec_process() {
    // sh prints its own pid; it must match the marker since exec keeps the pid
    let output = mnexec()
        .args(["-p", "sh", "-c", "echo $$"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let shell_pid: i32 = stdout.lines().last().unwrap().parse().unwrap();
    assert_eq!(marker_pid(&output.stdout), shell_pid);
}

#[test]
fn test_close_fds() {
    mnexec().args(["-c", "true"]).assert().success();
}

#[test]
fn test_invalid_cgroup_name() {
    let root = TempDir::new().unwrap();
    let tasks = fake_controller(root.path(), "cpu", "foo;bar");

    mnexec()
        .arg("--cgroup-root")
        .arg(root.path())
        .args(["-g", "foo;bar", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid path: foo;bar"));

    assert_eq!(fs::read_to_string(tasks).unwrap(), "");
}

#[test]
fn test_cgroup_without_controllers() {
    let root = TempDir::new().unwrap();

    mnexec()
        .arg("--cgroup-root")
        .arg(root.path())
        .args(["-g", "test1", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cgroup: could not add to cgroup test1"));
}

#[test]
fn test_cgroup_with_one_controller() {
    let root = TempDir::new().unwrap();
    let tasks = fake_controller(root.path(), "cpuset", "test1");

    let output = mnexec()
        .env("MNEXEC_CGROUP_ROOT", root.path())
        .args(["-p", "-g", "test1", "true"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let pid = marker_pid(&output.stdout);
    assert_eq!(fs::read_to_string(tasks).unwrap(), format!("{pid}\n"));
}

#[test]
fn test_cgroup_with_unconfigured_cpuset() {
    let root = TempDir::new().unwrap();
    let tasks = fake_controller(root.path(), "cpu", "h1");
    let cpuset = root.path().join("cpuset/h1");
    fs::create_dir_all(&cpuset).unwrap();
    // writes to /dev/full fail with ENOSPC, as they do for a cpuset without cpus/mems
    std::os::unix::fs::symlink("/dev/full", cpuset.join("tasks")).unwrap();

    let output = mnexec()
        .arg("--cgroup-root")
        .arg(root.path())
        .args(["-p", "-g", "h1", "true"])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(0));
    let pid = marker_pid(&output.stdout);
    assert_eq!(fs::read_to_string(tasks).unwrap(), format!("{pid}\n"));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Controller rejected process"));
}

#[test]
fn test_detach() {
    mnexec()
        .args(["-d", "sh", "-c", "exit 0"])
        .assert()
        .success();
}

#[test]
fn test_detach_twice_terminates() {
    // The second mnexec is a session leader after the first detach, so it
    // forks once more and its parent exits 0.
    let started = Instant::now();

    mnexec()
        .arg("-d")
        .arg(env!("CARGO_BIN_EXE_mnexec"))
        .args(["-d", "true"])
        .assert()
        .success();

    assert!(started.elapsed() < Duration::from_secs(10));
}

#[test]
fn test_attach_to_missing_process() {
    mnexec()
        .args(["-a", "2147483647", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("/proc/2147483647/ns/net"));
}

#[test]
fn test_create_namespace_without_privilege() {
    if is_root() {
        return;
    }

    mnexec()
        .args(["-n", "true"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unshare: "));
}

#[test]
#[ignore] // Requires root
fn test_pid_namespace_reports_child_pid() {
    if !is_root() {
        return;
    }

    let started = Instant::now();
    let child = std::process::Command::new(env!("CARGO_BIN_EXE_mnexec"))
        .args(["-P", "-m", "-p", "sh", "-c", "sleep 1; echo $$"])
        .stdout(std::process::Stdio::piped())
        .spawn()
        .unwrap();
    let mnexec_pid = i32::try_from(child.id()).unwrap();

    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    // The parent only exits after the slow child is gone
    assert!(started.elapsed() >= Duration::from_secs(1));

    let marker = marker_pid(&output.stdout);
    assert_ne!(marker, mnexec_pid);

    // Inside the new PID namespace the shell is init
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.lines().last(), Some("1"));
}

#[test]
#[ignore] // Requires root
fn test_pid_namespace_exit_code() {
    if !is_root() {
        return;
    }

    mnexec().args(["-P", "sh", "-c", "exit 3"]).assert().code(3);
}

#[test]
#[ignore] // Requires root
fn test_uts_namespace_hostname() {
    if !is_root() {
        return;
    }

    let host = fs::read_to_string("/proc/sys/kernel/hostname").unwrap();

    mnexec()
        .args(["-u", "sh", "-c", "hostname mnexec-test && hostname"])
        .assert()
        .success()
        .stdout("mnexec-test\n");

    assert_eq!(fs::read_to_string("/proc/sys/kernel/hostname").unwrap(), host);
}
