use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn devicefarm() -> Command {
    Command::cargo_bin("devicefarm").unwrap()
}

#[test]
fn test_init_writes_starter_config() {
    let dir = TempDir::new().unwrap();

    devicefarm()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created devicefarm.toml"));

    let content = std::fs::read_to_string(dir.path().join("devicefarm.toml")).unwrap();
    assert!(content.contains("[devicefarm]"));

    devicefarm()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_validate_starter_config() {
    let dir = TempDir::new().unwrap();
    devicefarm()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success();

    devicefarm()
        .current_dir(dir.path())
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid!"))
        .stdout(predicate::str::contains("Project: MyProject"))
        .stdout(predicate::str::contains("Test type: Instrumentation"));
}

#[test]
fn test_validate_reports_problems() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(
        &path,
        r#"
        [devicefarm]
        project = "MyProject"
        device_pool = "Top Devices"

        [device_state]
        locale = "english"

        [test]
        type = "appium_python"
    "#,
    )
    .unwrap();

    devicefarm()
        .arg("--config")
        .arg(&path)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration is not valid"))
        .stderr(predicate::str::contains("device_state.locale"))
        .stderr(predicate::str::contains("test.test_package"));
}

#[test]
fn test_validate_missing_file() {
    let dir = TempDir::new().unwrap();

    devicefarm()
        .arg("--config")
        .arg(dir.path().join("missing.toml"))
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn test_run_requires_app() {
    devicefarm()
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--app"));
}
