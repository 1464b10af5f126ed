use assert_cmd::Command;
use assert_cmd::cargo::CommandCargoExt;
use predicates::prelude::*;
use std::process::{Child, Stdio};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn tunelib(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("tunelib").unwrap();
    cmd.env("TUNELIB_DATA_DIR", home.path().join("data"))
        .env("XDG_CONFIG_HOME", home.path().join("config"))
        .env_remove("RUST_LOG");
    cmd
}

fn add_alpha(home: &TempDir) {
    tunelib(home)
        .args([
            "add",
            "file:///music/alpha.ogg",
            "--title",
            "Alpha",
            "--artist",
            "Band",
            "--duration",
            "3:05",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Added #1: Band - Alpha (03:05)"));
}

#[test]
fn empty_library_lists_nothing() {
    let home = TempDir::new().unwrap();

    tunelib(&home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("Library is empty."));
}

#[test]
fn added_entries_are_listed() {
    let home = TempDir::new().unwrap();
    add_alpha(&home);

    tunelib(&home)
        .args(["add", "file:///music/beta.ogg", "-t", "Beta", "-b", "Second"])
        .assert()
        .success();

    tunelib(&home)
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 entries:"))
        .stdout(predicate::str::contains("Band - Alpha - 03:05"))
        .stdout(predicate::str::contains("Beta [Second] - 00:00"));
}

#[test]
fn duplicate_url_is_not_added_twice() {
    let home = TempDir::new().unwrap();
    add_alpha(&home);

    tunelib(&home)
        .args(["add", "file:///music/alpha.ogg", "--title", "Other"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Already in library as #1"));
}

#[test]
fn invalid_duration_is_rejected() {
    let home = TempDir::new().unwrap();

    tunelib(&home)
        .args(["add", "file:///x.ogg", "--title", "X", "--duration", "long"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid time format"));
}

#[test]
fn show_renders_status_line() {
    let home = TempDir::new().unwrap();
    add_alpha(&home);

    tunelib(&home)
        .args(["show", "1"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("Band - Alpha "))
        .stdout(predicate::str::contains("00:00/03:05"));
}

#[test]
fn show_unknown_entry_fails() {
    let home = TempDir::new().unwrap();

    tunelib(&home)
        .args(["show", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No entry with id 42"));
}

#[test]
fn status_without_daemon() {
    let home = TempDir::new().unwrap();

    tunelib(&home)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Daemon is not running."));
}

/// Foreground daemon, killed if the test bails out before stopping it.
struct RunningDaemon(Child);

impl RunningDaemon {
    fn start(home: &TempDir) -> Self {
        let child = std::process::Command::cargo_bin("tunelib")
            .unwrap()
            .env("TUNELIB_DATA_DIR", home.path().join("data"))
            .env("XDG_CONFIG_HOME", home.path().join("config"))
            .env_remove("RUST_LOG")
            .args(["daemon", "run"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let daemon = Self(child);

        let socket = home.path().join("data").join("tunelib.sock");
        for _ in 0..50 {
            if socket.exists() {
                return daemon;
            }
            thread::sleep(Duration::from_millis(100));
        }
        panic!("daemon never created {}", socket.display());
    }
}

impl Drop for RunningDaemon {
    fn drop(&mut self) {
        if let Ok(None) = self.0.try_wait() {
            let _ = self.0.kill();
            let _ = self.0.wait();
        }
    }
}

#[test]
fn queries_go_through_running_daemon() {
    let home = TempDir::new().unwrap();
    add_alpha(&home);

    let mut daemon = RunningDaemon::start(&home);

    tunelib(&home)
        .args(["select", "SELECT title, artist FROM media"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 rows:"))
        .stdout(predicate::str::contains("{artist: Band, title: Alpha}"));

    tunelib(&home)
        .args(["column", "SELECT title FROM media"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1. Alpha"));

    tunelib(&home)
        .args(["keys", "SELECT title, artist FROM media"])
        .assert()
        .success()
        .stdout(predicate::str::contains("artist\ntitle"));

    tunelib(&home)
        .args(["select", "SELECT title FROM media WHERE id > 100"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No rows."));

    tunelib(&home)
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Daemon stopped."));

    assert!(daemon.0.wait().unwrap().success());
    assert!(!home.path().join("data").join("tunelib.pid").exists());
}
