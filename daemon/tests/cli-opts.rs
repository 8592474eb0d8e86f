use assert_cmd::Command;

const BIN: &str = "yascheduler";

#[test]
fn test_empty_args() {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.assert().failure();
}

#[test]
fn test_help() {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.arg("-h").assert().success();
}

#[test]
fn test_version() {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.arg("version").assert().success();
}

#[test]
fn test_bad_keyword() {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.arg("bouh").assert().failure();
}

#[test]
fn test_config_missing_file_fails() {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.arg("-c")
        .arg("/nonexistent/yascheduler.conf")
        .arg("config")
        .assert()
        .failure();
}

#[test]
fn test_submit_missing_metadata_file_fails() {
    let mut cmd = Command::cargo_bin(BIN).unwrap();
    cmd.arg("-c")
        .arg("/nonexistent/yascheduler.conf")
        .arg("submit")
        .arg("my-job")
        .arg("demo")
        .arg("/nonexistent/metadata.json")
        .assert()
        .failure();
}
