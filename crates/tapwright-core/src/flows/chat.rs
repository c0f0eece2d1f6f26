//! Chat screen: sending messages, suggestions and message reports.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::report::{FlowReport, Step, StepOutcome};
use crate::element::ElementHandle;
use crate::executor::{ActionExecutor, KEYCODE_ENTER};
use crate::finder::Finder;
use crate::locator::{Locator, EDIT_TEXT_CLASS};
use crate::poller::Poller;

/// How long the chat input may take to appear after opening the screen.
const INPUT_TIMEOUT: Duration = Duration::from_secs(6);
/// How long a sent message may take to show as a bubble.
const MESSAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// Selectors for the chat screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatSelectors {
    /// Chat entry point on the home screen.
    pub home_entry: Locator,
    /// Candidates for the message input, tried in order.
    pub input: Vec<Locator>,
    /// Content-description fragment of the send button.
    pub send_button: String,
    /// Candidates for the suggestions button.
    pub suggestions_button: Vec<Locator>,
    /// Text fragment shown once suggestions are open.
    pub suggestion_marker: String,
    /// Candidates for the report button.
    pub report_button: Vec<Locator>,
    /// Text fragments of the report dialog.
    pub report_markers: Vec<String>,
}

impl Default for ChatSelectors {
    fn default() -> Self {
        Self {
            home_entry: Locator::class_instance("android.widget.Button", 2),
            input: vec![
                Locator::text_contains("Type Something"),
                Locator::ios_value_contains("Type Something"),
                Locator::class_name(EDIT_TEXT_CLASS),
            ],
            send_button: "send".into(),
            suggestions_button: vec![
                Locator::description_contains("+"),
                Locator::accessibility_id("+"),
            ],
            suggestion_marker: "Suggestion".into(),
            report_button: vec![
                Locator::description_contains("report"),
                Locator::description_contains("!"),
            ],
            report_markers: vec!["Report".into(), "Reason".into()],
        }
    }
}

/// Actions and flows for the chat screen.
#[derive(Clone)]
pub struct ChatFlow {
    executor: ActionExecutor,
    selectors: ChatSelectors,
}

impl ChatFlow {
    pub fn new(executor: ActionExecutor, selectors: ChatSelectors) -> Self {
        Self { executor, selectors }
    }

    pub fn selectors(&self) -> &ChatSelectors {
        &self.selectors
    }

    fn finder(&self) -> &Finder {
        self.executor.finder()
    }

    fn poller(&self) -> &Poller {
        self.finder().poller()
    }

    /// Taps the first element matching any of `locators`.
    async fn tap_first(&self, locators: &[Locator]) -> bool {
        for locator in locators {
            let Some(element) = self.finder().probe(locator).await else {
                continue;
            };
            match self.executor.tap(&element).await {
                Ok(()) => return true,
                Err(e) => debug!(%locator, error = %e, "tap failed"),
            }
        }
        false
    }

    async fn any_text_visible<S: AsRef<str>>(&self, fragments: &[S]) -> bool {
        for fragment in fragments {
            let fragment = fragment.as_ref();
            if fragment.is_empty() {
                continue;
            }
            if self.finder().probe(&Locator::text_contains(fragment)).await.is_some() {
                return true;
            }
        }
        false
    }

    // ---------------------------------------------------------------------
    // Actions
    // ---------------------------------------------------------------------

    /// Taps the chat entry point on the home screen.
    ///
    /// Returns the entry element if it was found, even when neither the tap
    /// nor the gesture went through.
    pub async fn open_from_home(&self) -> Option<ElementHandle> {
        let entry = self.finder().probe(&self.selectors.home_entry).await?;
        if let Err(e) = self.executor.tap(&entry).await {
            debug!(error = %e, "chat entry tap refused");
        }
        Some(entry)
    }

    /// The message input, if one is on screen now.
    pub async fn find_input(&self) -> Option<ElementHandle> {
        for locator in &self.selectors.input {
            if let Some(input) = self.finder().probe(locator).await {
                return Some(input);
            }
        }
        None
    }

    /// Polls for the message input.
    pub async fn wait_for_input(&self, timeout: Duration) -> Option<ElementHandle> {
        self.poller()
            .with_timeout(timeout)
            .poll_for(|| async { Ok(self.find_input().await) })
            .await
    }

    /// Types `text` into the input and submits it with ENTER, or with the
    /// send button if key codes are refused. Returns whether a submit was
    /// attempted.
    pub async fn send_message(&self, text: &str) -> bool {
        let Some(input) = self.find_input().await else {
            return false;
        };

        if let Err(e) = self.executor.tap(&input).await {
            debug!(error = %e, "focusing input failed");
        }
        if let Err(e) = self.executor.enter_text(&input, text).await {
            debug!(error = %e, "could not enter message");
            return false;
        }

        match self.executor.press_keycode(KEYCODE_ENTER).await {
            Ok(()) => return true,
            Err(e) => debug!(error = %e, "keyboard submit unavailable"),
        }

        let send = Locator::description_contains(&self.selectors.send_button);
        self.tap_first(std::slice::from_ref(&send)).await
    }

    /// Polls for a bubble containing `fragment`.
    pub async fn is_message_present(&self, fragment: &str, timeout: Duration) -> bool {
        self.poller()
            .with_timeout(timeout)
            .poll_for_text(self.executor.session().as_ref(), &[fragment])
            .await
    }

    pub async fn open_suggestions(&self) -> bool {
        self.tap_first(&self.selectors.suggestions_button).await
    }

    pub async fn is_suggestion_shown(&self) -> bool {
        self.any_text_visible(std::slice::from_ref(&self.selectors.suggestion_marker))
            .await
    }

    pub async fn open_report(&self) -> bool {
        self.tap_first(&self.selectors.report_button).await
    }

    pub async fn is_report_dialog_shown(&self) -> bool {
        self.any_text_visible(&self.selectors.report_markers).await
    }

    // ---------------------------------------------------------------------
    // Flows
    // ---------------------------------------------------------------------

    /// Opens the chat from home, sends `message` and checks that its first
    /// word shows up.
    pub async fn send_flow(&self, message: &str) -> FlowReport {
        let mut report = FlowReport::new("chat_send");
        let clock = self.poller().clock().as_ref();

        let step = Step::begin("open chat", clock);
        if self.open_from_home().await.is_none() {
            report.push(step.finish(StepOutcome::skipped("no chat entry point on home"), clock));
            return report;
        }
        report.push(step.finish(StepOutcome::Passed, clock));

        let step = Step::begin("chat input", clock);
        if self.wait_for_input(INPUT_TIMEOUT).await.is_none() {
            report.push(step.finish(StepOutcome::failed("chat input not found"), clock));
            return report;
        }
        report.push(step.finish(StepOutcome::Passed, clock));

        let step = Step::begin("send message", clock);
        self.finder().clear_inputs(EDIT_TEXT_CLASS).await;
        if !self.send_message(message).await {
            report.push(step.finish(StepOutcome::failed("could not submit the message"), clock));
            return report;
        }
        report.push(step.finish(StepOutcome::Passed, clock));

        let step = Step::begin("message visible", clock);
        let first_word = message.split_whitespace().next().unwrap_or_default();
        let outcome = if self.is_message_present(first_word, MESSAGE_TIMEOUT).await {
            StepOutcome::Passed
        } else {
            StepOutcome::failed(format!("no bubble containing {first_word:?}"))
        };
        report.push(step.finish(outcome, clock));
        report
    }

    /// Opens suggestions, then the report dialog.
    ///
    /// Whether suggestions showed is recorded as a note; only the report
    /// dialog decides the outcome.
    pub async fn report_flow(&self) -> FlowReport {
        let mut report = FlowReport::new("chat_report");
        let clock = self.poller().clock().as_ref();

        let mut step = Step::begin("open suggestions", clock);
        if !self.open_suggestions().await {
            report.push(step.finish(StepOutcome::skipped("no suggestions button"), clock));
            return report;
        }
        let shown = self.is_suggestion_shown().await;
        info!(shown, "suggestions");
        step.note(format!("suggestions visible: {shown}"));
        report.push(step.finish(StepOutcome::Passed, clock));

        let step = Step::begin("open report", clock);
        if !self.open_report().await {
            report.push(step.finish(StepOutcome::skipped("no report button"), clock));
            return report;
        }
        report.push(step.finish(StepOutcome::Passed, clock));

        let step = Step::begin("report dialog", clock);
        let outcome = if self.is_report_dialog_shown().await {
            StepOutcome::Passed
        } else {
            StepOutcome::failed("report dialog did not open")
        };
        report.push(step.finish(outcome, clock));
        report
    }
}
