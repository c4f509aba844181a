use std::net::TcpListener;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

const FAKE_SENTRY_EXE: &str = env!("CARGO_BIN_EXE_fake-sentry");

fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

fn command(addr: &str) -> Command {
    let mut command = Command::new(FAKE_SENTRY_EXE);
    command
        .env("FAKE_SENTRY__HTTP_ADDR", addr)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    command
}

fn assert_clean_shutdown(mut child: Child) {
    let pid = Pid::from_raw(child.id() as i32);
    signal::kill(pid, Signal::SIGINT).expect("Failed to send SIGINT");

    let output = child.wait().expect("Failed to wait on child process");

    assert!(
        output.success(),
        "Process exited with non-zero status: {:?}",
        output.code()
    );
}

fn wait_healthy(addr: &str) {
    for _ in 0..50 {
        let status = command(addr).arg("healthcheck").status().unwrap();
        if status.success() {
            return;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
    panic!("fake-sentry did not become healthy on {addr}");
}

#[test]
fn version() {
    let output = Command::new(FAKE_SENTRY_EXE).arg("version").output().unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap().trim(),
        env!("CARGO_PKG_VERSION")
    );
}

#[test]
fn healthcheck_fails_without_server() {
    let addr = free_addr();
    let status = command(&addr).arg("healthcheck").status().unwrap();
    assert!(!status.success());
}

#[test]
fn run_until_interrupted() {
    let addr = free_addr();
    let child = command(&addr)
        .arg("run")
        .spawn()
        .expect("Failed to spawn subprocess");

    wait_healthy(&addr);
    assert_clean_shutdown(child);
}

#[test]
fn run_with_overrides() {
    let addr = free_addr();
    let projects = tempfile::tempdir().unwrap();
    let child = Command::new(FAKE_SENTRY_EXE)
        .args(["run", "--addr", &addr, "--projects-dir"])
        .arg(projects.path())
        .spawn()
        .expect("Failed to spawn subprocess");

    wait_healthy(&addr);
    assert_clean_shutdown(child);
}

#[test]
fn run_fails_without_projects_dir() {
    let status = command(&free_addr())
        .args(["run", "--projects-dir", "/nonexistent/fake-sentry/projects"])
        .status()
        .unwrap();
    assert!(!status.success());
}
