//! Scripted screens shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tapwright_core::config::HarnessConfig;
use tapwright_core::locator::{Locator, EDIT_TEXT_CLASS};
use tapwright_core::mock::{ManualClock, MockElement, MockSession};
use tapwright_core::session::Harness;

pub const APP_ID: &str = "com.castalk.app";

/// A harness over `mock` with a manual clock and the default selectors.
pub fn harness(mock: &Arc<MockSession>) -> (Harness, Arc<ManualClock>) {
    harness_with(mock, HarnessConfig::default())
}

pub fn harness_with(mock: &Arc<MockSession>, mut config: HarnessConfig) -> (Harness, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    if config.app_id.is_none() {
        config.app_id = Some(APP_ID.to_string());
    }
    let harness = Harness::new(mock.clone(), config).with_clock(clock.clone());
    (harness, clock)
}

/// Landing screen with the email entry point, then the credential form with
/// two generic inputs and an exact "Sign In" button.
pub fn signin_screen(mock: &MockSession) {
    mock.add_element("entry", MockElement::new().text("Sign in with email"));
    mock.on(Locator::text_contains("Sign in with email"), ["entry"]);

    mock.add_element("email", MockElement::new().text("Enter Your Email"));
    mock.add_element("password", MockElement::new().text("Enter Your Password"));
    mock.on(Locator::class_name(EDIT_TEXT_CLASS), ["email", "password"]);

    mock.add_element(
        "submit",
        MockElement::new()
            .text("Sign In")
            .frame(40.0, 600.0, 300.0, 56.0)
            .enabled_when_filled(["email", "password"]),
    );
    mock.on(Locator::text("Sign In"), ["submit"]);
    mock.on(Locator::clickable(), ["entry", "submit"]);
}

/// The signed-in marker shows up after `after` queries.
pub fn home_after(mock: &MockSession, after: usize) {
    mock.add_element("home-tab", MockElement::new().text("Home"));
    mock.on_after(Locator::description_contains("home"), after, ["home-tab"]);
}

/// Home screen whose third button opens a chat with a text input.
pub fn chat_screen(mock: &MockSession) {
    mock.add_element("chat-entry", MockElement::new().text("Chat"));
    mock.on(Locator::class_instance("android.widget.Button", 2), ["chat-entry"]);

    mock.add_element("chat-input", MockElement::new().text("Type Something..."));
    mock.on_after(Locator::text_contains("Type Something"), 1, ["chat-input"]);
    mock.on(Locator::class_name(EDIT_TEXT_CLASS), ["chat-input"]);
}

/// The last two recorded calls; after a harness run, the teardown.
pub fn teardown_calls(mock: &MockSession) -> Vec<String> {
    let calls = mock.calls();
    let start = calls.len().saturating_sub(2);
    calls[start..].to_vec()
}
