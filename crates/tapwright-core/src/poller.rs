//! Deadline-bounded polling of live UI state.
//!
//! [`Poller::poll_until`] re-evaluates a predicate at a fixed interval until
//! it returns `true` or the deadline (measured from the start of the call)
//! passes. A predicate that errors counts as "not yet true"; the deadline is
//! the only way a poll ends early or late.
//!
//! Time comes from a [`Clock`], so tests can run on virtual time:
//!
//! ```
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tapwright_core::mock::ManualClock;
//! use tapwright_core::poller::Poller;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let clock = Arc::new(ManualClock::new());
//! let poller = Poller::new(Duration::from_secs(2), Duration::from_millis(500))
//!     .with_clock(clock.clone());
//!
//! let met = poller.poll_until(|| async { Ok(false) }).await;
//! assert!(!met);
//! assert!(clock.elapsed() >= Duration::from_secs(2));
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::driver::{DeviceSession, DriverError};
use crate::locator::Locator;

/// Interval between evaluations when none is configured.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Wait budget when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(8);

/// Source of time for polling loops.
#[async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    async fn sleep(&self, duration: Duration);
}

/// [`Clock`] backed by the tokio timer (honours `tokio::time::pause`).
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Fixed-interval poller with a deadline.
#[derive(Clone)]
pub struct Poller {
    timeout: Duration,
    interval: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("timeout", &self.timeout)
            .field("interval", &self.interval)
            .finish()
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

impl Poller {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            timeout,
            interval,
            clock: Arc::new(TokioClock),
        }
    }

    /// Replaces the clock (e.g. with [`ManualClock`](crate::mock::ManualClock)).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// A copy of this poller with a different deadline, sharing the clock.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            interval: self.interval,
            clock: self.clock.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Evaluates `predicate` until it returns `Ok(true)` or the deadline
    /// passes.
    ///
    /// The first evaluation happens immediately. Returns `false` no earlier
    /// than the timeout; sleeps never carry the loop past it, so a late return
    /// is only ever the cost of the final evaluation.
    pub async fn poll_until<F, Fut>(&self, mut predicate: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, DriverError>>,
    {
        self.poll_for(|| {
            let evaluation = predicate();
            async move { evaluation.await.map(|met| met.then_some(())) }
        })
        .await
        .is_some()
    }

    /// Like [`poll_until`](Self::poll_until), but the probe yields the value
    /// it found. Returns the first `Some`, or `None` at the deadline.
    pub async fn poll_for<T, F, Fut>(&self, mut probe: F) -> Option<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, DriverError>>,
    {
        let start = self.clock.now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            match probe().await {
                Ok(Some(found)) => {
                    debug!(attempts, "condition met");
                    return Some(found);
                }
                Ok(None) => {}
                Err(e) => debug!(error = %e, "predicate failed, treating as not yet true"),
            }

            let elapsed = self.clock.now().saturating_duration_since(start);
            if elapsed >= self.timeout {
                debug!(
                    attempts,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "condition not met before deadline"
                );
                return None;
            }
            // The last sleep is cut short so the final evaluation lands on the deadline.
            self.clock.sleep(self.interval.min(self.timeout - elapsed)).await;
        }
    }

    /// Polls until any of `keywords` is visible as a text substring.
    ///
    /// Every keyword is checked on each tick before sleeping. Empty keywords
    /// are ignored; with none left this returns `false` straight away.
    pub async fn poll_for_text<K>(&self, session: &dyn DeviceSession, keywords: &[K]) -> bool
    where
        K: AsRef<str>,
    {
        let locators: Vec<Locator> = keywords
            .iter()
            .map(AsRef::as_ref)
            .filter(|k| !k.is_empty())
            .map(Locator::text_contains)
            .collect();
        if locators.is_empty() {
            return false;
        }

        let locators = &locators;
        self.poll_until(move || async move {
            for locator in locators {
                match session.find_all(locator).await {
                    Ok(found) if !found.is_empty() => return Ok(true),
                    Ok(_) => {}
                    Err(e) => debug!(%locator, error = %e, "text probe failed"),
                }
            }
            Ok(false)
        })
        .await
    }
}
