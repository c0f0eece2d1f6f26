use assert_cmd::Command;
use predicates::prelude::*;
use std::path::PathBuf;

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

fn tapwright() -> Command {
    let mut cmd = Command::cargo_bin("tapwright").unwrap();
    cmd.env_remove("TAPWRIGHT_CONFIG").env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_help_exits_zero() {
    tapwright()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("tapwright"))
        .stdout(predicate::str::contains("flow"))
        .stdout(predicate::str::contains("probe"));
}

#[test]
fn test_flow_help_lists_flows() {
    tapwright()
        .args(["flow", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("login-rejected"))
        .stdout(predicate::str::contains("chat-send"))
        .stdout(predicate::str::contains("TEST_EMAIL"));
}

#[test]
fn test_password_env_value_is_hidden() {
    tapwright()
        .env("TEST_PASSWORD", "hunter2-secret")
        .args(["flow", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("hunter2-secret").not());
}

#[test]
fn test_unknown_flow_is_usage_error() {
    tapwright()
        .args(["flow", "checkout"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("checkout"));
}

#[test]
fn test_unknown_strategy_is_usage_error() {
    tapwright()
        .args(["probe", "css", "button"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("css"));
}

#[test]
fn test_missing_config_file_exits_3() {
    tapwright()
        .args(["--config", "/nonexistent/tapwright.json", "flow", "login"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Config error"))
        .stderr(predicate::str::contains("/nonexistent/tapwright.json"));
}

#[test]
fn test_malformed_config_exits_3() {
    let fixture = fixture_path("malformed.json");
    tapwright()
        .arg("--config")
        .arg(&fixture)
        .args(["flow", "chat-send"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("JSON parse error"));
}

#[test]
fn test_config_from_env_is_validated() {
    let fixture = fixture_path("ftp_server.json");
    tapwright()
        .env("TAPWRIGHT_CONFIG", &fixture)
        .args(["probe", "accessibility-id", "login-button"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("unsupported scheme"));
}

#[test]
fn test_unreachable_server_exits_2() {
    let fixture = fixture_path("unreachable_server.json");
    tapwright()
        .arg("--config")
        .arg(&fixture)
        .args(["flow", "login"])
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Session error"))
        .stderr(predicate::str::contains("127.0.0.1:1"));
}
