#![allow(deprecated)] // cargo_bin is deprecated but still works

use assert_cmd::Command;
use predicates::str::contains;
use std::error::Error;
use std::fs;
use std::process::{Command as StdCommand, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

type TestResult<T = ()> = std::result::Result<T, Box<dyn Error>>;

fn hivebus(root: &TempDir) -> TestResult<Command> {
    let mut cmd = Command::cargo_bin("hivebus")?;
    cmd.current_dir(root.path()).env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn publish_then_read_round_trips() -> TestResult {
    let root = TempDir::new()?;

    hivebus(&root)?
        .args(["publish", "agents/test", r#"{"status":"running"}"#])
        .assert()
        .success();

    assert!(root.path().join(".hive/topics/agents_test.json").exists());

    hivebus(&root)?
        .args(["read", "agents/test"])
        .assert()
        .success()
        .stdout(contains(r#"{"status":"running"}"#));

    Ok(())
}

#[test]
fn read_missing_topic_exits_not_found() -> TestResult {
    let root = TempDir::new()?;

    hivebus(&root)?
        .args(["read", "nothing.here"])
        .assert()
        .code(1)
        .stderr(contains("Topic not found"));

    Ok(())
}

#[test]
fn publish_rejects_invalid_json() -> TestResult {
    let root = TempDir::new()?;

    hivebus(&root)?
        .args(["publish", "hive.x", "{not json"])
        .assert()
        .code(2)
        .stderr(contains("not valid JSON"));

    assert!(!root.path().join(".hive/topics/hive.x.json").exists());
    Ok(())
}

#[test]
fn topics_lists_published_topics() -> TestResult {
    let root = TempDir::new()?;

    for topic in ["hive.b", "agents/a"] {
        hivebus(&root)?
            .args(["-q", "publish", topic, "{}"])
            .assert()
            .success();
    }
    fs::write(root.path().join(".hive/topics/stray.json.tmp"), "{}")?;

    hivebus(&root)?
        .args(["topics"])
        .assert()
        .success()
        .stdout(contains(r#"["agents/a","hive.b"]"#));

    Ok(())
}

#[test]
fn config_file_moves_topic_directory() -> TestResult {
    let root = TempDir::new()?;
    fs::write(
        root.path().join(".hivebus.toml"),
        "topics_dir = \"state/topics\"\n",
    )?;

    hivebus(&root)?
        .args(["publish", "hive.x", "1"])
        .assert()
        .success();

    assert!(root.path().join("state/topics/hive.x.json").exists());
    Ok(())
}

#[test]
fn watch_prints_event_for_written_topic() -> TestResult {
    let root = TempDir::new()?;
    let topics = root.path().join(".hive/topics");
    fs::create_dir_all(&topics)?;

    let mut child = StdCommand::new(assert_cmd::cargo::cargo_bin("hivebus"))
        .current_dir(root.path())
        .args(["watch", "hive.*", "--count", "1"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;

    // Keep writing until the watcher is attached and reports the change
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut n = 0;
    while child.try_wait()?.is_none() {
        if Instant::now() > deadline {
            child.kill()?;
            return Err("watch did not report a change in time".into());
        }
        fs::write(topics.join("other.json"), format!("{}", n))?;
        fs::write(topics.join("hive.session.created.json"), format!("{}", n))?;
        n += 1;
        thread::sleep(Duration::from_millis(300));
    }

    let output = child.wait_with_output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    let line = stdout.lines().next().ok_or("no output")?;
    let event: serde_json::Value = serde_json::from_str(line)?;
    assert_eq!(event["topic"], "hive.session.created");
    assert!(event["timestamp"].is_string());

    Ok(())
}
