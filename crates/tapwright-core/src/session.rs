//! Session lifetime: open from config, run a body, always tear down.
//!
//! [`with_session`] brackets a test body so that the app under test is
//! terminated and the remote session closed on every exit path, including a
//! panic inside the body. [`Harness`] bundles a session with its
//! configuration and hands out executors and flows wired to it.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::appium::AppiumSession;
use crate::config::HarnessConfig;
use crate::driver::{DeviceSession, DriverError};
use crate::executor::ActionExecutor;
use crate::finder::Finder;
use crate::flows::{AuthFlow, ChatFlow};
use crate::poller::{Clock, Poller, TokioClock};

/// Best-effort teardown: terminate `app_id` (if given), then quit.
///
/// Failures are logged and otherwise ignored.
pub async fn teardown(session: &dyn DeviceSession, app_id: Option<&str>) {
    match app_id {
        Some(app_id) => {
            if let Err(e) = session.terminate_app(app_id).await {
                warn!(app_id, error = %e, "terminate_app failed during teardown");
            }
        }
        None => warn!("no app id in config or caps, leaving the app running"),
    }
    if let Err(e) = session.quit().await {
        warn!(error = %e, "quit failed during teardown");
    }
}

/// Runs `body` with `session`, then tears the session down.
///
/// Teardown runs whether the body returns normally or panics; a panic is
/// resumed once teardown is done.
pub async fn with_session<F, Fut, T>(
    session: Arc<dyn DeviceSession>,
    app_id: Option<&str>,
    body: F,
) -> T
where
    F: FnOnce(Arc<dyn DeviceSession>) -> Fut,
    Fut: Future<Output = T>,
{
    let for_body = session.clone();
    let outcome = AssertUnwindSafe(async move { body(for_body).await })
        .catch_unwind()
        .await;

    teardown(session.as_ref(), app_id).await;

    match outcome {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

/// A session plus the configuration its flows run with.
#[derive(Clone)]
pub struct Harness {
    session: Arc<dyn DeviceSession>,
    config: HarnessConfig,
    clock: Arc<dyn Clock>,
    run_id: Uuid,
}

impl Harness {
    pub fn new(session: Arc<dyn DeviceSession>, config: HarnessConfig) -> Self {
        Self {
            session,
            config,
            clock: Arc::new(TokioClock),
            run_id: Uuid::new_v4(),
        }
    }

    /// Opens an Appium session from `config`.
    pub async fn connect(config: HarnessConfig) -> Result<Self, DriverError> {
        let session_config = config
            .session()
            .map_err(|e| DriverError::SessionCreation(e.to_string()))?;
        let session = AppiumSession::open(&session_config).await?;
        Ok(Self::new(Arc::new(session), config))
    }

    /// Replaces the clock used by every poller this harness builds.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn session(&self) -> &Arc<dyn DeviceSession> {
        &self.session
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn poller(&self) -> Poller {
        self.config.timeouts.poller().with_clock(self.clock.clone())
    }

    pub fn executor(&self) -> ActionExecutor {
        ActionExecutor::new(Finder::new(self.session.clone(), self.poller()))
    }

    pub fn auth(&self) -> AuthFlow {
        AuthFlow::new(self.executor(), self.config.auth.clone())
    }

    pub fn chat(&self) -> ChatFlow {
        ChatFlow::new(self.executor(), self.config.chat.clone())
    }

    /// Runs `body`, then terminates the app under test and quits the session.
    ///
    /// The app is the configured `app_id`, or failing that the package or
    /// bundle named in the capabilities.
    pub async fn run<F, Fut, T>(self, body: F) -> T
    where
        F: FnOnce(Harness) -> Fut,
        Fut: Future<Output = T>,
    {
        let span = info_span!("run", run_id = %self.run_id);
        async move {
            info!("session started");
            let session = self.session.clone();
            let app_id = self.config.teardown_app_id();
            let value = with_session(session, app_id.as_deref(), move |_| body(self)).await;
            info!("session closed");
            value
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flows::Verdict;
    use crate::locator::Locator;
    use crate::mock::{ManualClock, MockSession};

    #[tokio::test]
    async fn teardown_runs_after_error() {
        let mock = Arc::new(MockSession::new());
        let result: Result<(), DriverError> =
            with_session(mock.clone(), Some("com.example.app"), |session| async move {
                session.find_all(&Locator::clickable()).await?;
                Err(DriverError::CommandFailed("boom".into()))
            })
            .await;

        assert!(result.is_err());
        let calls = mock.calls();
        let tail: Vec<&str> = calls.iter().rev().take(2).rev().map(String::as_str).collect();
        assert_eq!(tail, ["terminate_app com.example.app", "quit"]);
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn teardown_runs_after_panic() {
        let mock = Arc::new(MockSession::new());
        let session: Arc<dyn DeviceSession> = mock.clone();

        let joined = tokio::spawn(async move {
            with_session(session, Some("com.example.app"), |_| async {
                panic!("test body panicked");
            })
            .await
        })
        .await;

        assert!(joined.unwrap_err().is_panic());
        assert_eq!(mock.calls(), vec!["terminate_app com.example.app", "quit"]);
    }

    #[tokio::test]
    async fn terminate_failure_still_quits() {
        let mock = Arc::new(MockSession::new());
        mock.set_terminate_fails(true);

        with_session(mock.clone(), Some("com.example.app"), |_| async {}).await;

        assert_eq!(mock.calls(), vec!["terminate_app com.example.app", "quit"]);
    }

    #[tokio::test]
    async fn no_app_id_only_quits() {
        let mock = Arc::new(MockSession::new());
        let value = with_session(mock.clone(), None, |_| async { 7 }).await;

        assert_eq!(value, 7);
        assert_eq!(mock.calls(), vec!["quit"]);
    }

    #[tokio::test]
    async fn harness_terminates_app_named_in_caps() {
        let mock = Arc::new(MockSession::new());
        let config = HarnessConfig::from_json_str(
            r#"{"caps": {"platformName": "Android", "appium:appPackage": "com.castalk.app"}}"#,
        )
        .unwrap();
        assert!(config.app_id.is_none());

        Harness::new(mock.clone(), config)
            .with_clock(Arc::new(ManualClock::new()))
            .run(|_| async {})
            .await;

        assert_eq!(mock.calls(), vec!["terminate_app com.castalk.app", "quit"]);
    }

    #[tokio::test]
    async fn harness_without_any_app_id_only_quits() {
        let mock = Arc::new(MockSession::new());
        let config = HarnessConfig::from_json_str(r#"{"caps": {"platformName": "Android"}}"#).unwrap();

        Harness::new(mock.clone(), config).run(|_| async {}).await;

        assert_eq!(mock.calls(), vec!["quit"]);
    }

    #[tokio::test]
    async fn harness_runs_flow_and_tears_down() {
        let mock = Arc::new(MockSession::new());
        let clock = Arc::new(ManualClock::new());
        let config = HarnessConfig {
            app_id: Some("com.example.app".into()),
            ..HarnessConfig::default()
        };

        let report = Harness::new(mock.clone(), config)
            .with_clock(clock.clone())
            .run(|harness| async move { harness.chat().send_flow("hello").await })
            .await;

        assert_eq!(report.verdict(), Verdict::Skipped);
        assert!(!mock.is_connected());
        assert_eq!(mock.calls().last().map(String::as_str), Some("quit"));
    }

    #[test]
    fn harness_poller_follows_config() {
        let mut config = HarnessConfig::default();
        config.timeouts.locate_ms = 1200;
        config.timeouts.poll_interval_ms = 300;
        let harness = Harness::new(Arc::new(MockSession::new()), config);

        let poller = harness.poller();
        assert_eq!(poller.timeout().as_millis(), 1200);
        assert_eq!(poller.interval().as_millis(), 300);
    }
}
