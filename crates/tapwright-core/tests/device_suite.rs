//! Live-device scenarios against a running Appium server.
//!
//! These tests require:
//! - An Appium server with the UiAutomator2 driver
//! - An Android emulator with the app under test installed
//! - `TAPWRIGHT_CONFIG` pointing at a harness config (server URL and caps)
//!
//! Credentials come from `TEST_EMAIL`, `TEST_PASSWORD`, `TEST_WRONG_PASSWORD`
//! and `TEST_AI_MESSAGE`, with the same defaults as the CLI.
//!
//! Run with:
//!   cargo test -p tapwright-core --test device_suite -- --ignored --test-threads=1
//!
//! All tests are #[ignore] by default so they don't run in `cargo test`.
//! Skipped flows (missing affordance on this build) pass; failed flows fail.

use tapwright_core::config::HarnessConfig;
use tapwright_core::flows::{Credentials, FlowReport, Verdict};
use tapwright_core::session::Harness;

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn credentials() -> Credentials {
    Credentials::new(
        env_or("TEST_EMAIL", "user@castalk.com"),
        env_or("TEST_PASSWORD", "Password123"),
    )
}

async fn connect() -> Harness {
    let path = std::env::var("TAPWRIGHT_CONFIG")
        .expect("TAPWRIGHT_CONFIG must point at a harness config");
    let config = HarnessConfig::from_file(&path).expect("Failed to load harness config");
    Harness::connect(config)
        .await
        .expect("Failed to open an Appium session")
}

fn assert_not_failed(report: &FlowReport) {
    eprintln!("{report}");
    assert_ne!(report.verdict(), Verdict::Failed, "{report}");
}

#[tokio::test]
#[ignore]
async fn test_login() {
    let report = connect()
        .await
        .run(|h| async move { h.auth().login(&credentials()).await })
        .await;
    assert_not_failed(&report);
}

#[tokio::test]
#[ignore]
async fn test_login_rejected() {
    let wrong = Credentials::new(
        env_or("TEST_EMAIL", "user@castalk.com"),
        env_or("TEST_WRONG_PASSWORD", "WrongPass123"),
    );
    let report = connect()
        .await
        .run(|h| async move {
            h.auth()
                .login_rejected(&wrong, "Incorrect email address or password. Please try again.")
                .await
        })
        .await;
    assert_not_failed(&report);
}

#[tokio::test]
#[ignore]
async fn test_empty_fields_disable_sign_in() {
    let report = connect()
        .await
        .run(|h| async move { h.auth().validate_empty_fields(&credentials()).await })
        .await;
    assert_not_failed(&report);
}

#[tokio::test]
#[ignore]
async fn test_biometric_login() {
    let report = connect()
        .await
        .run(|h| async move { h.auth().biometric_login().await })
        .await;
    assert_not_failed(&report);
}

#[tokio::test]
#[ignore]
async fn test_google_oauth_starts() {
    let report = connect()
        .await
        .run(|h| async move { h.auth().google_oauth_starts().await })
        .await;
    assert_not_failed(&report);
}

#[tokio::test]
#[ignore]
async fn test_chat_send() {
    let message = env_or("TEST_AI_MESSAGE", "Hi AI, test");
    let report = connect()
        .await
        .run(|h| async move {
            let login = h.auth().login(&credentials()).await;
            if login.verdict() != Verdict::Passed {
                return login;
            }
            h.chat().send_flow(&message).await
        })
        .await;
    assert_not_failed(&report);
}

#[tokio::test]
#[ignore]
async fn test_chat_report() {
    let report = connect()
        .await
        .run(|h| async move { h.chat().report_flow().await })
        .await;
    assert_not_failed(&report);
}
