#![allow(deprecated)] // cargo_bin is deprecated but still works

use assert_cmd::Command;
use predicates::prelude::*;
use predicates::str::contains;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

type TestResult<T = ()> = std::result::Result<T, Box<dyn Error>>;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> TestResult<Self> {
        Ok(Self {
            dir: TempDir::new()?,
        })
    }

    fn with_config(config: &str) -> TestResult<Self> {
        let workspace = Self::new()?;
        fs::write(workspace.dir.path().join(".hivebus.toml"), config)?;
        Ok(workspace)
    }

    fn history_file(&self) -> PathBuf {
        self.dir.path().join(".hive").join("history.json")
    }

    fn cmd(&self) -> TestResult<Command> {
        let mut cmd = Command::cargo_bin("hivebus")?;
        cmd.current_dir(self.dir.path()).env_remove("RUST_LOG");
        Ok(cmd)
    }

    fn record(&self, id: &str, failed: bool) -> TestResult {
        let mut cmd = self.cmd()?;
        cmd.args(["history", "record", id]);
        if failed {
            cmd.arg("--failed");
        }
        cmd.assert().success();
        Ok(())
    }

    fn list_ids(&self) -> TestResult<Vec<String>> {
        let output = self.cmd()?.args(["history", "list"]).output()?;
        assert!(output.status.success());
        let runs: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout)?;
        Ok(runs
            .iter()
            .filter_map(|r| r["id"].as_str().map(String::from))
            .collect())
    }
}

#[test]
fn empty_history_lists_nothing() -> TestResult {
    let ws = Workspace::new()?;

    ws.cmd()?
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(contains("[]"));
    ws.cmd()?
        .args(["history", "last-failed"])
        .assert()
        .code(1)
        .stderr(contains("No failed runs"));

    Ok(())
}

#[test]
fn record_keeps_newest_first_and_prunes() -> TestResult {
    let ws = Workspace::with_config("history_max_entries = 2\n")?;

    ws.record("run-1", false)?;
    ws.record("run-2", true)?;
    ws.record("run-3", false)?;

    assert_eq!(ws.list_ids()?, vec!["run-3", "run-2"]);
    Ok(())
}

#[test]
fn get_and_last_failed() -> TestResult {
    let ws = Workspace::new()?;
    ws.record("a", true)?;
    ws.record("b", false)?;

    ws.cmd()?
        .args(["history", "get", "b"])
        .assert()
        .success()
        .stdout(contains(r#""id":"b""#));
    ws.cmd()?
        .args(["history", "get", "zzz"])
        .assert()
        .code(1)
        .stderr(contains("Run not found: zzz"));
    ws.cmd()?
        .args(["history", "last-failed"])
        .assert()
        .success()
        .stdout(contains(r#""id":"a""#).and(contains(r#""failed":true"#)));

    Ok(())
}

#[test]
fn text_format_marks_failures() -> TestResult {
    let ws = Workspace::new()?;
    let mut cmd = ws.cmd()?;
    cmd.args(["history", "record", "x", "--failed", "--summary", "tests broke"])
        .assert()
        .success();

    ws.cmd()?
        .args(["--format", "text", "history", "list"])
        .assert()
        .success()
        .stdout(contains("FAILED x tests broke"));

    Ok(())
}

#[test]
fn clear_empties_but_keeps_file() -> TestResult {
    let ws = Workspace::new()?;
    ws.record("a", false)?;

    ws.cmd()?.args(["-q", "history", "clear"]).assert().success();

    assert!(ws.history_file().exists());
    assert!(ws.list_ids()?.is_empty());
    Ok(())
}

#[test]
fn corrupt_history_is_reported_not_discarded() -> TestResult {
    let ws = Workspace::new()?;
    fs::create_dir_all(ws.history_file().parent().ok_or("no parent")?)?;
    fs::write(ws.history_file(), "{\"entries\": [")?;

    ws.cmd()?
        .args(["history", "list"])
        .assert()
        .code(2)
        .stderr(contains("Corrupt JSON document"));
    ws.cmd()?
        .args(["history", "record", "new"])
        .assert()
        .code(2);

    assert_eq!(fs::read_to_string(ws.history_file())?, "{\"entries\": [");
    Ok(())
}
