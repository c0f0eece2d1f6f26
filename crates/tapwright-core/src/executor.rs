//! Semantic UI actions with fallback techniques.
//!
//! This module provides the [`ActionExecutor`] type, which turns intents such
//! as "click the sign-in button" or "type into the message box" into device
//! session calls. Each action has a primary technique and a fallback; an
//! action only fails once both have been refused.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tapwright_core::executor::ActionExecutor;
//! use tapwright_core::locator::{Locator, LocatorChain};
//! use tapwright_core::mock::MockSession;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tapwright_core::error::Result<()> {
//! let executor = ActionExecutor::with_session(Arc::new(MockSession::new()));
//! let chain = LocatorChain::new(Locator::text_contains("Sign In"));
//! executor.click(&chain, Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn, Instrument};

use crate::driver::DeviceSession;
use crate::element::ElementHandle;
use crate::error::{Error, Result};
use crate::finder::Finder;
use crate::locator::{Locator, LocatorChain, EDIT_TEXT_CLASS};
use crate::poller::Poller;

/// Android key code for ENTER.
pub const KEYCODE_ENTER: u32 = 66;

/// Where credentials go when the form does not expose exactly two inputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialFields {
    /// Widget class of the generic text inputs.
    pub input_class: String,
    /// Text shown in the empty user field.
    pub user_placeholder: String,
    /// Text shown in the empty password field.
    pub password_placeholder: String,
}

impl Default for CredentialFields {
    fn default() -> Self {
        Self {
            input_class: EDIT_TEXT_CLASS.to_string(),
            user_placeholder: "Enter Your Email".to_string(),
            password_placeholder: "Enter Your Password".to_string(),
        }
    }
}

/// Which path [`ActionExecutor::fill_credentials`] took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialEntry {
    /// Exactly two generic inputs were found and filled in order.
    GenericInputs,
    /// Fields were resolved by placeholder text.
    Placeholders { user: bool, password: bool },
}

impl CredentialEntry {
    /// Whether at least one field took input.
    pub fn filled_any(&self) -> bool {
        match self {
            CredentialEntry::GenericInputs => true,
            CredentialEntry::Placeholders { user, password } => *user || *password,
        }
    }
}

/// The submit control of a form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitTarget {
    /// Exact text of the primary button.
    pub label: String,
    /// Substring (any case) identifying a submit-like clickable.
    pub keyword: String,
}

impl SubmitTarget {
    pub fn new(label: impl Into<String>, keyword: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            keyword: keyword.into(),
        }
    }
}

/// Executes semantic actions against a device session.
///
/// The executor holds a [`Finder`] and delegates element resolution to it.
/// Actions are awaited one at a time; nothing here spawns tasks.
#[derive(Clone)]
pub struct ActionExecutor {
    finder: Finder,
}

impl ActionExecutor {
    pub fn new(finder: Finder) -> Self {
        Self { finder }
    }

    /// Convenience constructor with the default poller.
    pub fn with_session(session: Arc<dyn DeviceSession>) -> Self {
        Self::new(Finder::new(session, Poller::default()))
    }

    pub fn finder(&self) -> &Finder {
        &self.finder
    }

    pub fn session(&self) -> &Arc<dyn DeviceSession> {
        self.finder.session()
    }

    /// Taps `element`, falling back to a click gesture if the direct click is
    /// refused.
    pub async fn tap(&self, element: &ElementHandle) -> Result<()> {
        let session = self.session();
        let primary = match session.click(element).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_rejection() => e,
            Err(e) => return Err(e.into()),
        };

        debug!(%element, error = %primary, "click refused, trying gesture");
        session
            .click_gesture(element)
            .await
            .map_err(|fallback| Error::ActionRejected {
                action: "tap",
                reason: format!("click: {primary}; gesture: {fallback}"),
            })
    }

    /// Resolves `chain` and runs `act` on the match.
    ///
    /// A stale or vanished element sends the chain back through resolution
    /// until `timeout`, counted from the first lookup, runs out.
    async fn act_on<F, Fut>(
        &self,
        chain: &LocatorChain,
        timeout: Duration,
        mut act: F,
    ) -> Result<ElementHandle>
    where
        F: FnMut(ElementHandle) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let poller = self.finder.poller();
        let clock = poller.clock();
        let start = clock.now();
        let not_found = || Error::NotFound {
            locator: chain.to_string(),
            waited_ms: timeout.as_millis() as u64,
        };

        loop {
            let remaining = timeout.saturating_sub(clock.now().saturating_duration_since(start));
            let element = match self.finder.resolve(chain, remaining).await {
                Ok(element) => element,
                Err(Error::NotFound { .. }) => return Err(not_found()),
                Err(e) => return Err(e),
            };

            let elapsed = match act(element.clone()).await {
                Ok(()) => {
                    let elapsed = clock.now().saturating_duration_since(start);
                    debug!(%element, elapsed_ms = elapsed.as_millis() as u64, "action complete");
                    return Ok(element);
                }
                Err(Error::Driver(e)) if e.is_miss() => {
                    debug!(%element, error = %e, "element went stale, resolving again");
                    clock.now().saturating_duration_since(start)
                }
                Err(e) => return Err(e),
            };

            if elapsed >= timeout {
                return Err(not_found());
            }
            clock.sleep(poller.interval().min(timeout - elapsed)).await;
        }
    }

    /// Resolves `chain` and taps the element.
    pub async fn click(&self, chain: &LocatorChain, timeout: Duration) -> Result<ElementHandle> {
        let span = info_span!("click", chain = %chain);
        self.act_on(chain, timeout, |element| async move { self.tap(&element).await })
            .instrument(span)
            .await
    }

    /// Resolves `chain` and enters `text` into the element.
    pub async fn type_text(
        &self,
        chain: &LocatorChain,
        text: &str,
        timeout: Duration,
    ) -> Result<ElementHandle> {
        let span = info_span!("type_text", chain = %chain, len = text.len());
        self.act_on(chain, timeout, |element| async move {
            self.enter_text(&element, text).await
        })
        .instrument(span)
        .await
    }

    /// Clears `element` and types `text`, assigning the value directly if key
    /// events are refused.
    pub async fn enter_text(&self, element: &ElementHandle, text: &str) -> Result<()> {
        let session = self.session();
        if let Err(e) = session.clear(element).await {
            debug!(%element, error = %e, "clear failed, typing anyway");
        }

        let primary = match session.send_text(element, text).await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_rejection() => e,
            Err(e) => return Err(e.into()),
        };

        debug!(%element, error = %primary, "key events refused, assigning value");
        session
            .set_value(element, text)
            .await
            .map_err(|fallback| Error::ActionRejected {
                action: "type",
                reason: format!("send_text: {primary}; set_value: {fallback}"),
            })
    }

    /// Enters a user name and password.
    ///
    /// With exactly two generic inputs on screen they are filled in order;
    /// if one goes stale mid-entry the inputs are looked up again. Otherwise
    /// each field is resolved by its placeholder; a field that cannot be
    /// filled is logged and skipped.
    pub async fn fill_credentials(
        &self,
        user: &str,
        password: &str,
        fields: &CredentialFields,
        timeout: Duration,
    ) -> CredentialEntry {
        let span = info_span!("fill_credentials");
        async {
            let input_locator = Locator::class_name(&fields.input_class);
            let poller = self.finder.poller();
            let clock = poller.clock();
            let start = clock.now();
            let mut inputs = self.finder.probe_all(&input_locator).await;

            loop {
                let [user_input, password_input] = inputs.as_slice() else {
                    break;
                };
                let pair = [
                    (user_input.clone(), user, "user"),
                    (password_input.clone(), password, "password"),
                ];
                let mut stale = false;
                for (input, value, field) in pair {
                    match self.enter_text(&input, value).await {
                        Ok(()) => {}
                        Err(Error::Driver(e)) if e.is_miss() => {
                            debug!(field, error = %e, "credential input went stale");
                            stale = true;
                            break;
                        }
                        Err(e) => warn!(field, error = %e, "could not fill credential field"),
                    }
                }
                if !stale {
                    return CredentialEntry::GenericInputs;
                }

                let elapsed = clock.now().saturating_duration_since(start);
                if elapsed >= timeout {
                    warn!("credential inputs kept going stale");
                    break;
                }
                clock.sleep(poller.interval().min(timeout - elapsed)).await;
                inputs = self.finder.probe_all(&input_locator).await;
            }

            debug!(inputs = inputs.len(), "falling back to placeholder lookup");
            let user_chain = LocatorChain::new(Locator::text_contains(&fields.user_placeholder));
            let password_chain =
                LocatorChain::new(Locator::text_contains(&fields.password_placeholder));

            let user_entered = match self.type_text(&user_chain, user, timeout).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "user field not filled");
                    false
                }
            };
            let password_entered = match self.type_text(&password_chain, password, timeout).await {
                Ok(_) => true,
                Err(e) => {
                    warn!(error = %e, "password field not filled");
                    false
                }
            };

            CredentialEntry::Placeholders {
                user: user_entered,
                password: password_entered,
            }
        }
        .instrument(span)
        .await
    }

    /// Activates the submit control.
    ///
    /// Tries, in order: the exact label (probe), then a clickable whose text
    /// contains the keyword in any case (or the first clickable when none
    /// does), then the exact label in wait-mode.
    pub async fn submit(&self, target: &SubmitTarget, timeout: Duration) -> Result<ElementHandle> {
        let span = info_span!("submit", label = %target.label);
        async {
            let label = Locator::text(&target.label);

            if let Some(element) = self.finder.probe(&label).await {
                match self.tap(&element).await {
                    Ok(()) => return Ok(element),
                    Err(e) => debug!(error = %e, "exact label tap failed"),
                }
            }

            if let Some(element) = self.pick_submit_clickable(&target.keyword).await {
                match self.tap(&element).await {
                    Ok(()) => return Ok(element),
                    Err(e) => debug!(error = %e, "clickable scan tap failed"),
                }
            }

            let element = self.finder.wait(&label, timeout).await?;
            self.tap(&element).await?;
            Ok(element)
        }
        .instrument(span)
        .await
    }

    async fn pick_submit_clickable(&self, keyword: &str) -> Option<ElementHandle> {
        let clickables = self.finder.probe_all(&Locator::clickable()).await;
        let keyword = keyword.to_lowercase();

        for candidate in &clickables {
            let text = self.session().text(candidate).await.unwrap_or_default();
            if text.to_lowercase().contains(&keyword) {
                debug!(%candidate, text, "clickable matched submit keyword");
                return Some(candidate.clone());
            }
        }
        clickables.into_iter().next()
    }

    /// Scrolls the first scrollable container until `text` is visible.
    pub async fn scroll_into_view(&self, text: &str, timeout: Duration) -> Result<ElementHandle> {
        self.finder.wait(&Locator::scroll_into_view(text), timeout).await
    }

    pub async fn press_keycode(&self, keycode: u32) -> Result<()> {
        Ok(self.session().press_keycode(keycode).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverError;
    use crate::mock::{ManualClock, MockElement, MockSession};

    fn executor(session: &Arc<MockSession>) -> (ActionExecutor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let poller = Poller::new(Duration::from_secs(2), Duration::from_millis(500))
            .with_clock(clock.clone());
        (ActionExecutor::new(Finder::new(session.clone(), poller)), clock)
    }

    const TIMEOUT: Duration = Duration::from_secs(2);

    // -------------------------------------------------------------------------
    // tap / type
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn tap_falls_back_to_gesture() {
        let session = Arc::new(MockSession::new());
        session.add_element("btn", MockElement::new().rejects_click());
        let (exec, _) = executor(&session);

        exec.tap(&ElementHandle::new("btn")).await.unwrap();
        assert_eq!(session.calls(), vec!["click btn", "click_gesture btn"]);
    }

    #[tokio::test]
    async fn tap_rejected_when_both_techniques_fail() {
        let session = Arc::new(MockSession::new());
        session.add_element("btn", MockElement::new().rejects_click().rejects_gesture());
        let (exec, _) = executor(&session);

        let err = exec.tap(&ElementHandle::new("btn")).await.unwrap_err();
        assert!(matches!(err, Error::ActionRejected { action: "tap", .. }));
    }

    #[tokio::test]
    async fn tap_on_stale_handle_skips_gesture() {
        let session = Arc::new(MockSession::new());
        let (exec, _) = executor(&session);

        let err = exec.tap(&ElementHandle::new("gone")).await.unwrap_err();
        assert!(matches!(err, Error::Driver(DriverError::StaleElement(_))));
        assert_eq!(session.calls(), vec!["click gone"]);
    }

    #[tokio::test]
    async fn click_resolves_again_after_rerender() {
        let session = Arc::new(MockSession::new());
        session.add_element("fresh", MockElement::new().text("Sign In"));
        session.on_rerender(Locator::text("Sign In"), ["replaced"], ["fresh"]);
        let (exec, clock) = executor(&session);

        let chain = LocatorChain::new(Locator::text("Sign In"));
        let clicked = exec.click(&chain, TIMEOUT).await.unwrap();

        assert_eq!(clicked.id(), "fresh");
        let clicks: Vec<_> = session
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("click"))
            .collect();
        assert_eq!(clicks, vec!["click replaced", "click fresh"]);
        assert_eq!(session.queried(&Locator::text("Sign In")), 2);
        assert_eq!(clock.sleep_log(), vec![Duration::from_millis(500)]);
    }

    #[tokio::test]
    async fn click_on_element_that_stays_stale_times_out() {
        let session = Arc::new(MockSession::new());
        session.on(Locator::text("Sign In"), ["ghost"]);
        let (exec, clock) = executor(&session);

        let chain = LocatorChain::new(Locator::text("Sign In"));
        let err = exec.click(&chain, TIMEOUT).await.unwrap_err();

        match err {
            Error::NotFound { locator, waited_ms } => {
                assert!(locator.contains("Sign In"), "{locator}");
                assert_eq!(waited_ms, 2000);
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
        assert_eq!(clock.elapsed(), TIMEOUT);
        assert!(!session.calls().iter().any(|c| c.starts_with("click_gesture")));
    }

    #[tokio::test]
    async fn click_does_not_retry_rejections() {
        let session = Arc::new(MockSession::new());
        session.add_element("btn", MockElement::new().rejects_click().rejects_gesture());
        session.on(Locator::text("Sign In"), ["btn"]);
        let (exec, clock) = executor(&session);

        let chain = LocatorChain::new(Locator::text("Sign In"));
        let err = exec.click(&chain, TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::ActionRejected { action: "tap", .. }));
        assert_eq!(session.queried(&Locator::text("Sign In")), 1);
        assert_eq!(clock.sleeps(), 0);
    }

    #[tokio::test]
    async fn type_text_resolves_again_after_rerender() {
        let session = Arc::new(MockSession::new());
        session.add_element("fresh", MockElement::new());
        session.on_rerender(Locator::text_contains("Type Something"), ["replaced"], ["fresh"]);
        let (exec, _) = executor(&session);

        let chain = LocatorChain::new(Locator::text_contains("Type Something"));
        let typed = exec.type_text(&chain, "hello", TIMEOUT).await.unwrap();

        assert_eq!(typed.id(), "fresh");
        assert_eq!(session.value_of("fresh").as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn type_text_falls_back_to_set_value() {
        let session = Arc::new(MockSession::new());
        session.add_element("input", MockElement::new().rejects_keys());
        session.on(Locator::text_contains("Type Something"), ["input"]);
        let (exec, _) = executor(&session);

        let chain = LocatorChain::new(Locator::text_contains("Type Something"));
        exec.type_text(&chain, "hello", TIMEOUT).await.unwrap();
        assert_eq!(session.value_of("input").as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn type_text_rejected_when_value_cannot_be_set() {
        let session = Arc::new(MockSession::new());
        session.add_element("input", MockElement::new().rejects_keys().rejects_set_value());
        let (exec, _) = executor(&session);

        let err = exec
            .enter_text(&ElementHandle::new("input"), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ActionRejected { action: "type", .. }));
    }

    // -------------------------------------------------------------------------
    // fill_credentials
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn two_inputs_are_filled_in_order() {
        let session = Arc::new(MockSession::new());
        session.add_element("a", MockElement::new());
        session.add_element("b", MockElement::new());
        session.on(Locator::class_name(EDIT_TEXT_CLASS), ["a", "b"]);
        let (exec, _) = executor(&session);

        let entry = exec
            .fill_credentials("me@example.com", "hunter2", &CredentialFields::default(), TIMEOUT)
            .await;

        assert_eq!(entry, CredentialEntry::GenericInputs);
        assert_eq!(session.value_of("a").as_deref(), Some("me@example.com"));
        assert_eq!(session.value_of("b").as_deref(), Some("hunter2"));
    }

    #[tokio::test]
    async fn stale_inputs_are_looked_up_again() {
        let session = Arc::new(MockSession::new());
        session.add_element("email", MockElement::new());
        session.add_element("password", MockElement::new());
        session.on_rerender(
            Locator::class_name(EDIT_TEXT_CLASS),
            ["old-email", "old-password"],
            ["email", "password"],
        );
        let (exec, clock) = executor(&session);

        let entry = exec
            .fill_credentials("me@example.com", "hunter2", &CredentialFields::default(), TIMEOUT)
            .await;

        assert_eq!(entry, CredentialEntry::GenericInputs);
        assert_eq!(session.value_of("email").as_deref(), Some("me@example.com"));
        assert_eq!(session.value_of("password").as_deref(), Some("hunter2"));
        assert_eq!(clock.sleeps(), 1);
    }

    #[tokio::test]
    async fn single_input_uses_placeholders_without_panicking() {
        let session = Arc::new(MockSession::new());
        let fields = CredentialFields::default();
        session.add_element("only", MockElement::new());
        session.add_element("pw", MockElement::new());
        session.on(Locator::class_name(EDIT_TEXT_CLASS), ["only"]);
        session.on(Locator::text_contains(&fields.password_placeholder), ["pw"]);
        let (exec, _) = executor(&session);

        let entry = exec.fill_credentials("me", "secret", &fields, TIMEOUT).await;

        assert_eq!(
            entry,
            CredentialEntry::Placeholders {
                user: false,
                password: true
            }
        );
        assert_eq!(session.value_of("pw").as_deref(), Some("secret"));
        assert_eq!(session.value_of("only").as_deref(), Some(""));
    }

    #[tokio::test]
    async fn no_inputs_reports_nothing_entered() {
        let session = Arc::new(MockSession::new());
        let (exec, clock) = executor(&session);

        let entry = exec
            .fill_credentials("me", "secret", &CredentialFields::default(), TIMEOUT)
            .await;

        assert_eq!(
            entry,
            CredentialEntry::Placeholders {
                user: false,
                password: false
            }
        );
        assert!(clock.elapsed() >= TIMEOUT * 2);
    }

    #[tokio::test]
    async fn three_inputs_are_not_treated_as_a_credential_pair() {
        let session = Arc::new(MockSession::new());
        for id in ["a", "b", "c"] {
            session.add_element(id, MockElement::new());
        }
        session.on(Locator::class_name(EDIT_TEXT_CLASS), ["a", "b", "c"]);
        let (exec, _) = executor(&session);

        let entry = exec
            .fill_credentials("me", "secret", &CredentialFields::default(), TIMEOUT)
            .await;
        assert!(matches!(entry, CredentialEntry::Placeholders { .. }));
        assert_eq!(session.value_of("a").as_deref(), Some(""));
    }

    // -------------------------------------------------------------------------
    // submit
    // -------------------------------------------------------------------------

    fn sign_in() -> SubmitTarget {
        SubmitTarget::new("Sign In", "sign")
    }

    #[tokio::test]
    async fn submit_prefers_exact_label() {
        let session = Arc::new(MockSession::new());
        session.add_element("exact", MockElement::new().text("Sign In"));
        session.on(Locator::text("Sign In"), ["exact"]);
        let (exec, clock) = executor(&session);

        let clicked = exec.submit(&sign_in(), TIMEOUT).await.unwrap();
        assert_eq!(clicked.id(), "exact");
        assert_eq!(session.queried(&Locator::clickable()), 0);
        assert_eq!(clock.sleeps(), 0);
    }

    #[tokio::test]
    async fn submit_scans_clickables_for_keyword() {
        let session = Arc::new(MockSession::new());
        let labels = ["Back", "Help", "Sign in now", "Forgot password", "Register"];
        for (i, label) in labels.iter().enumerate() {
            session.add_element(&format!("c{i}"), MockElement::new().text(label));
        }
        session.on(Locator::clickable(), ["c0", "c1", "c2", "c3", "c4"]);
        let (exec, _) = executor(&session);

        let clicked = exec.submit(&sign_in(), TIMEOUT).await.unwrap();
        assert_eq!(clicked.id(), "c2");
        assert!(session.calls().contains(&"click c2".to_string()));
    }

    #[tokio::test]
    async fn submit_falls_back_to_first_clickable() {
        let session = Arc::new(MockSession::new());
        session.add_element("first", MockElement::new().text("Continue"));
        session.add_element("second", MockElement::new().text("Cancel"));
        session.on(Locator::clickable(), ["first", "second"]);
        let (exec, _) = executor(&session);

        let clicked = exec.submit(&sign_in(), TIMEOUT).await.unwrap();
        assert_eq!(clicked.id(), "first");
    }

    #[tokio::test]
    async fn submit_waits_for_label_as_last_resort() {
        let session = Arc::new(MockSession::new());
        session.add_element("late", MockElement::new().text("Sign In"));
        session.on_after(Locator::text("Sign In"), 2, ["late"]);
        let (exec, clock) = executor(&session);

        let clicked = exec.submit(&sign_in(), TIMEOUT).await.unwrap();
        assert_eq!(clicked.id(), "late");
        assert!(clock.sleeps() >= 1);
    }

    #[tokio::test]
    async fn submit_fails_when_every_tier_is_exhausted() {
        let session = Arc::new(MockSession::new());
        let (exec, _) = executor(&session);

        let err = exec.submit(&sign_in(), TIMEOUT).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    // -------------------------------------------------------------------------
    // misc
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn scroll_into_view_uses_scrollable_query() {
        let session = Arc::new(MockSession::new());
        session.add_element("row", MockElement::new());
        session.on(Locator::scroll_into_view("Settings"), ["row"]);
        let (exec, _) = executor(&session);

        let found = exec.scroll_into_view("Settings", TIMEOUT).await.unwrap();
        assert_eq!(found.id(), "row");
    }

    #[tokio::test]
    async fn press_keycode_propagates_unsupported() {
        let session = Arc::new(MockSession::new());
        session.set_keycodes_supported(false);
        let (exec, _) = executor(&session);

        assert!(exec.press_keycode(KEYCODE_ENTER).await.is_err());
    }
}
