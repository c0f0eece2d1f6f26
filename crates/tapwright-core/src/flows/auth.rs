//! Sign-in screens: email/password, biometric and Google OAuth.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::report::{FlowReport, Step, StepOutcome};
use super::SETTLE;
use crate::adb::Adb;
use crate::element::ElementHandle;
use crate::error::Result;
use crate::executor::{ActionExecutor, CredentialEntry, CredentialFields, SubmitTarget};
use crate::finder::Finder;
use crate::locator::{Locator, LocatorChain};
use crate::poller::Poller;

/// How long to wait for an error message after submitting.
const ERROR_TIMEOUT: Duration = Duration::from_secs(5);
/// How long the sign-in control may take to enable once both fields are filled.
const ENABLE_TIMEOUT: Duration = Duration::from_secs(5);
/// How long to look for a "biometrics not set up" notice.
const NOTICE_TIMEOUT: Duration = Duration::from_secs(1);
/// How long the OAuth hand-off may take to show.
const OAUTH_TIMEOUT: Duration = Duration::from_secs(6);

/// A user name and password.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Selector keywords for the sign-in screens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSelectors {
    /// Text fragments of the email sign-in entry point, most specific first.
    pub email_entry: Vec<String>,
    pub credentials: CredentialFields,
    pub submit: SubmitTarget,
    /// Text fragment present only while signed out.
    pub signin_affordance: String,
    /// Content-description fragment present only once signed in.
    pub logged_in_marker: String,
    /// Fragments of validation and rejection messages.
    pub error_keywords: Vec<String>,
    /// Description/text fragments of the biometric button.
    pub biometric: Vec<String>,
    /// Notice shown when no biometrics are enrolled.
    pub no_biometrics_notice: String,
    /// Text fragments of the Google button, most specific first.
    pub google: Vec<String>,
}

impl Default for AuthSelectors {
    fn default() -> Self {
        Self {
            email_entry: vec!["Sign in with email".into(), "Sign In".into()],
            credentials: CredentialFields::default(),
            submit: SubmitTarget::new("Sign In", "sign"),
            signin_affordance: "Sign in with email".into(),
            logged_in_marker: "home".into(),
            error_keywords: ["incorrect", "invalid", "error", "please enter", "required"]
                .into_iter()
                .map(String::from)
                .collect(),
            biometric: vec!["finger".into(), "biometric".into()],
            no_biometrics_notice: "No Biometrics".into(),
            google: vec!["Continue with Google".into(), "Google".into()],
        }
    }
}

/// Actions and flows for the sign-in screens.
#[derive(Clone)]
pub struct AuthFlow {
    executor: ActionExecutor,
    selectors: AuthSelectors,
    adb_fallback: bool,
}

impl AuthFlow {
    pub fn new(executor: ActionExecutor, selectors: AuthSelectors) -> Self {
        Self {
            executor,
            selectors,
            adb_fallback: true,
        }
    }

    /// Disables the `adb emu finger touch` fallback of
    /// [`simulate_fingerprint`](Self::simulate_fingerprint).
    pub fn without_adb_fallback(mut self) -> Self {
        self.adb_fallback = false;
        self
    }

    pub fn selectors(&self) -> &AuthSelectors {
        &self.selectors
    }

    fn finder(&self) -> &Finder {
        self.executor.finder()
    }

    fn poller(&self) -> &Poller {
        self.finder().poller()
    }

    fn locate_timeout(&self) -> Duration {
        self.poller().timeout()
    }

    // ---------------------------------------------------------------------
    // Actions
    // ---------------------------------------------------------------------

    /// Taps the email sign-in entry point.
    pub async fn open_email_signin(&self) -> Result<ElementHandle> {
        let chain: LocatorChain = self
            .selectors
            .email_entry
            .iter()
            .map(|text| Locator::text_contains(text))
            .collect();
        self.executor.click(&chain, self.locate_timeout()).await
    }

    pub async fn fill_credentials(&self, credentials: &Credentials) -> CredentialEntry {
        self.executor
            .fill_credentials(
                &credentials.user,
                &credentials.password,
                &self.selectors.credentials,
                self.locate_timeout(),
            )
            .await
    }

    pub async fn submit(&self) -> Result<ElementHandle> {
        self.executor
            .submit(&self.selectors.submit, self.locate_timeout())
            .await
    }

    /// Whether the signed-out affordance shows up within `timeout`.
    pub async fn is_signin_affordance_present(&self, timeout: Duration) -> bool {
        let session = self.executor.session().as_ref();
        let locator = Locator::text_contains(&self.selectors.signin_affordance);
        let locator = &locator;
        self.poller()
            .with_timeout(timeout)
            .poll_until(move || async move {
                session.find_all(locator).await.map(|found| !found.is_empty())
            })
            .await
    }

    /// Whether the signed-in marker shows up within `timeout`.
    pub async fn is_logged_in(&self, timeout: Duration) -> bool {
        let session = self.executor.session().as_ref();
        let locator = Locator::description_contains(&self.selectors.logged_in_marker);
        let locator = &locator;
        self.poller()
            .with_timeout(timeout)
            .poll_until(move || async move {
                session.find_all(locator).await.map(|found| !found.is_empty())
            })
            .await
    }

    /// Polls until the sign-in affordance is gone or the signed-in marker is
    /// present.
    pub async fn wait_signed_in(&self, timeout: Duration) -> bool {
        let finder = self.finder();
        let affordance = Locator::text_contains(&self.selectors.signin_affordance);
        let marker = Locator::description_contains(&self.selectors.logged_in_marker);
        let (affordance, marker) = (&affordance, &marker);

        self.poller()
            .with_timeout(timeout)
            .poll_until(move || async move {
                // A failed query must not read as "affordance gone".
                let still_signed_out = match finder.session().find_all(affordance).await {
                    Ok(found) => !found.is_empty(),
                    Err(e) => return Err(e),
                };
                Ok(!still_signed_out || finder.probe(marker).await.is_some())
            })
            .await
    }

    /// Polls for `text`, or for any of the configured error keywords when
    /// `text` is `None`.
    pub async fn expect_error(&self, text: Option<&str>, timeout: Duration) -> bool {
        let session = self.executor.session().as_ref();
        let poller = self.poller().with_timeout(timeout);
        match text {
            Some(text) => poller.poll_for_text(session, &[text]).await,
            None => poller.poll_for_text(session, &self.selectors.error_keywords).await,
        }
    }

    /// Taps the first biometric affordance found. Returns whether one was
    /// tapped.
    pub async fn click_biometric(&self) -> bool {
        let candidates = self
            .selectors
            .biometric
            .iter()
            .map(|k| Locator::description_contains(k))
            .chain(self.selectors.biometric.iter().map(|k| Locator::text_contains(k)));

        for locator in candidates {
            let Some(element) = self.finder().probe(&locator).await else {
                continue;
            };
            match self.executor.tap(&element).await {
                Ok(()) => return true,
                Err(e) => debug!(%locator, error = %e, "biometric tap failed"),
            }
        }
        false
    }

    /// Taps the Google sign-in button. Returns whether it was tapped.
    pub async fn click_google(&self) -> bool {
        let locators: Vec<Locator> = self
            .selectors
            .google
            .iter()
            .map(|text| Locator::text_contains(text))
            .collect();

        match self.finder().resolve_one_of(&locators, self.locate_timeout()).await {
            Ok(element) => self.executor.tap(&element).await.is_ok(),
            Err(e) => {
                debug!(error = %e, "no Google button");
                false
            }
        }
    }

    /// Simulates a fingerprint touch through the session, then through
    /// `adb emu finger touch` on the first device. Returns whether either
    /// command ran.
    pub async fn simulate_fingerprint(&self) -> bool {
        match self.executor.session().fingerprint(1).await {
            Ok(()) => return true,
            Err(e) => debug!(error = %e, "session fingerprint unavailable"),
        }
        if !self.adb_fallback {
            return false;
        }

        let touched = tokio::task::spawn_blocking(|| {
            let serial = Adb::first_device()?;
            Adb::finger_touch(&serial, 1)
        })
        .await;

        match touched {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "adb fingerprint fallback failed");
                false
            }
            Err(e) => {
                debug!(error = %e, "adb fingerprint task failed");
                false
            }
        }
    }

    // ---------------------------------------------------------------------
    // Flows
    // ---------------------------------------------------------------------

    /// Email/password sign-in that is expected to succeed.
    pub async fn login(&self, credentials: &Credentials) -> FlowReport {
        let mut report = FlowReport::new("login");
        if !self.enter_and_submit(credentials, &mut report).await {
            return report;
        }

        let clock = self.poller().clock().as_ref();
        let step = Step::begin("verify signed in", clock);
        let outcome = if self.wait_signed_in(self.locate_timeout()).await {
            StepOutcome::Passed
        } else {
            StepOutcome::failed("sign-in affordance still shown and no signed-in marker")
        };
        report.push(step.finish(outcome, clock));
        report
    }

    /// Email/password sign-in that is expected to be rejected with
    /// `expected_message`.
    pub async fn login_rejected(&self, credentials: &Credentials, expected_message: &str) -> FlowReport {
        let mut report = FlowReport::new("login_rejected");
        if !self.enter_and_submit(credentials, &mut report).await {
            return report;
        }

        let clock = self.poller().clock().as_ref();
        let step = Step::begin("expect error message", clock);
        let outcome = if self.expect_error(Some(expected_message), ERROR_TIMEOUT).await {
            StepOutcome::Passed
        } else {
            StepOutcome::failed(format!("error message not shown: {expected_message}"))
        };
        report.push(step.finish(outcome, clock));
        report
    }

    async fn enter_and_submit(&self, credentials: &Credentials, report: &mut FlowReport) -> bool {
        let clock = self.poller().clock().as_ref();

        let step = Step::begin("open email sign-in", clock);
        let outcome = match self.open_email_signin().await {
            Ok(_) => StepOutcome::Passed,
            Err(e) => StepOutcome::failed(format!("email sign-in entry point: {e}")),
        };
        if !report.push(step.finish(outcome, clock)) {
            return false;
        }

        if !self.fill_step(credentials, report).await {
            return false;
        }

        let step = Step::begin("submit", clock);
        let outcome = match self.submit().await {
            Ok(_) => StepOutcome::Passed,
            Err(e) => StepOutcome::failed(format!("submit control: {e}")),
        };
        report.push(step.finish(outcome, clock))
    }

    /// Fills the credential form; the step fails when neither field took input.
    async fn fill_step(&self, credentials: &Credentials, report: &mut FlowReport) -> bool {
        let clock = self.poller().clock().as_ref();
        let mut step = Step::begin("fill credentials", clock);
        let entry = self.fill_credentials(credentials).await;
        step.note(format!("{entry:?}"));
        let outcome = if entry.filled_any() {
            StepOutcome::Passed
        } else {
            StepOutcome::failed("no credential field could be filled")
        };
        report.push(step.finish(outcome, clock))
    }

    /// The sign-in control is disabled while the fields are empty and becomes
    /// enabled once both are filled.
    pub async fn validate_empty_fields(&self, credentials: &Credentials) -> FlowReport {
        let mut report = FlowReport::new("validate_empty_fields");
        let clock = self.poller().clock().as_ref();

        let step = Step::begin("open email sign-in", clock);
        let outcome = match self.open_email_signin().await {
            Ok(_) => StepOutcome::Passed,
            Err(e) => StepOutcome::failed(format!("email sign-in entry point: {e}")),
        };
        if !report.push(step.finish(outcome, clock)) {
            return report;
        }

        let step = Step::begin("clear inputs", clock);
        self.finder()
            .clear_inputs(&self.selectors.credentials.input_class)
            .await;
        clock.sleep(SETTLE).await;
        report.push(step.finish(StepOutcome::Passed, clock));

        let label = &self.selectors.submit.label;
        let step = Step::begin("locate sign-in control", clock);
        let container = self.finder().find_clickable_container(label).await;
        let Some(container) = container else {
            report.push(step.finish(
                StepOutcome::failed(format!("no clickable container for {label:?}")),
                clock,
            ));
            return report;
        };
        report.push(step.finish(StepOutcome::Passed, clock));

        let step = Step::begin("disabled while empty", clock);
        let outcome = if self.finder().attr_enabled(&container).await {
            StepOutcome::failed(format!("{label:?} is enabled with empty fields"))
        } else {
            StepOutcome::Passed
        };
        if !report.push(step.finish(outcome, clock)) {
            return report;
        }

        if !self.fill_step(credentials, &mut report).await {
            return report;
        }

        let step = Step::begin("enabled when filled", clock);
        let finder = self.finder();
        let container = &container;
        let enabled = self
            .poller()
            .with_timeout(ENABLE_TIMEOUT)
            .poll_until(move || async move { Ok(finder.attr_enabled(container).await) })
            .await;
        let outcome = if enabled {
            StepOutcome::Passed
        } else {
            StepOutcome::failed(format!("{label:?} still disabled with both fields filled"))
        };
        report.push(step.finish(outcome, clock));
        report
    }

    /// Biometric sign-in on an emulator with an enrolled fingerprint.
    pub async fn biometric_login(&self) -> FlowReport {
        let mut report = FlowReport::new("biometric_login");
        let clock = self.poller().clock().as_ref();

        let step = Step::begin("tap biometric", clock);
        if !self.click_biometric().await {
            report.push(step.finish(StepOutcome::skipped("no biometric affordance"), clock));
            return report;
        }
        report.push(step.finish(StepOutcome::Passed, clock));

        clock.sleep(SETTLE).await;
        let step = Step::begin("biometrics enabled", clock);
        let notice = &self.selectors.no_biometrics_notice;
        if self.expect_error(Some(notice), NOTICE_TIMEOUT).await {
            report.push(step.finish(StepOutcome::skipped(format!("app shows {notice:?}")), clock));
            return report;
        }
        report.push(step.finish(StepOutcome::Passed, clock));

        let step = Step::begin("simulate fingerprint", clock);
        if !self.simulate_fingerprint().await {
            report.push(step.finish(
                StepOutcome::skipped("fingerprint simulation unavailable"),
                clock,
            ));
            return report;
        }
        report.push(step.finish(StepOutcome::Passed, clock));

        let step = Step::begin("verify signed in", clock);
        let outcome = if self.is_logged_in(self.locate_timeout()).await {
            StepOutcome::Passed
        } else {
            StepOutcome::failed("no signed-in marker after fingerprint")
        };
        report.push(step.finish(outcome, clock));
        report
    }

    /// Tapping the Google button hands off to an OAuth screen.
    ///
    /// The hand-off counts as started once a `WEBVIEW` context appears, an
    /// error message is shown or the sign-in affordance goes away.
    pub async fn google_oauth_starts(&self) -> FlowReport {
        let mut report = FlowReport::new("google_oauth_starts");
        let clock = self.poller().clock().as_ref();

        let step = Step::begin("tap Google", clock);
        if !self.click_google().await {
            report.push(step.finish(StepOutcome::skipped("no Google sign-in button"), clock));
            return report;
        }
        report.push(step.finish(StepOutcome::Passed, clock));

        let step = Step::begin("oauth started", clock);
        let started = self.poll_oauth_handoff().await;
        let outcome = if started {
            StepOutcome::Passed
        } else {
            StepOutcome::failed("no WEBVIEW context, error or screen change")
        };
        report.push(step.finish(outcome, clock));

        if let Err(e) = self.executor.session().back().await {
            debug!(error = %e, "back after oauth failed");
        }
        report
    }

    async fn poll_oauth_handoff(&self) -> bool {
        let session = self.executor.session().as_ref();
        let finder = self.finder();
        let affordance = Locator::text_contains(&self.selectors.signin_affordance);
        let errors: Vec<Locator> = self
            .selectors
            .error_keywords
            .iter()
            .filter(|k| !k.is_empty())
            .map(|k| Locator::text_contains(k))
            .collect();
        let (affordance, errors) = (&affordance, &errors);

        self.poller()
            .with_timeout(OAUTH_TIMEOUT)
            .poll_until(move || async move {
                let contexts = session.contexts().await.unwrap_or_default();
                if let Some(context) = contexts.iter().find(|c| c.contains("WEBVIEW")) {
                    info!(%context, "oauth webview context");
                    return Ok(true);
                }
                for locator in errors {
                    if finder.probe(locator).await.is_some() {
                        info!(%locator, "oauth produced an error message");
                        return Ok(true);
                    }
                }
                session.find_all(affordance).await.map(|found| found.is_empty())
            })
            .await
    }
}
