//! Startup failures of the binary: every one exits with status 1 before
//! listening.

use std::process::{Command, Output};

fn rrredir(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rrredir"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run rrredir")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn no_targets_exits_with_usage() {
    let output = rrredir(&["-i", "127.0.0.1", "-p", "0"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Usage"), "{}", stderr(&output));
}

#[test]
fn malformed_target_exits_with_error() {
    let output = rrredir(&["-i", "127.0.0.1", "-p", "0", "10.0.0.1"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("host:port"), "{}", stderr(&output));
}

#[test]
fn unresolvable_target_exits_with_error() {
    let output = rrredir(&["-i", "127.0.0.1", "-p", "0", "no such host.invalid:80"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("cannot resolve"), "{}", stderr(&output));
}

#[test]
fn unresolvable_bind_address_exits_with_error() {
    let output = rrredir(&[
        "-i",
        "127.0.0.1",
        "-p",
        "0",
        "127.0.0.1:80@no such host.invalid",
    ]);
    assert_eq!(output.status.code(), Some(1));
    assert!(
        stderr(&output).contains("could not be resolved"),
        "{}",
        stderr(&output)
    );
}

#[test]
fn help_exits_successfully() {
    let output = rrredir(&["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("TARGET"));
}
