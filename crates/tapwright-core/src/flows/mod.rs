//! User-journey flows built from the locator engine, executor and poller.
//!
//! Each flow runs its steps in order and stops at the first step that does not
//! pass, returning a [`FlowReport`]. A missing affordance (no chat icon, no
//! biometric button) is a skip rather than a failure. Nothing here retries a
//! whole flow.
//!
//! Selector keywords are held in [`AuthSelectors`](auth::AuthSelectors) and
//! [`ChatSelectors`](chat::ChatSelectors); their defaults match the app the
//! harness was first written against and are expected to be overridden.

pub mod auth;
pub mod chat;
pub mod report;

pub use auth::{AuthFlow, AuthSelectors, Credentials};
pub use chat::{ChatFlow, ChatSelectors};
pub use report::{FlowReport, Step, StepOutcome, StepRecord, Verdict};

use std::time::Duration;

/// Pause after a UI change before reading state that depends on it.
pub(crate) const SETTLE: Duration = Duration::from_millis(500);
