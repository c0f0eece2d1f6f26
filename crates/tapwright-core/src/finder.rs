//! Element resolution with bounded waiting and ordered fallback.
//!
//! Two query modes are available for any [`Locator`]:
//!
//! - **probe** ([`Finder::probe`]): one `find_all`, returning immediately.
//!   Errors are swallowed and read as "absent".
//! - **wait** ([`Finder::wait`]): polls until a match appears or the budget
//!   runs out, then fails with [`Error::NotFound`].
//!
//! [`Finder::resolve`] walks a [`LocatorChain`] cheap-first: every locator
//! but the last is probed once, and only the last one is allowed to wait.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument};

use crate::driver::DeviceSession;
use crate::element::ElementHandle;
use crate::error::{Error, Result};
use crate::locator::{Locator, LocatorChain};
use crate::poller::Poller;

/// Resolves locators against a live session.
#[derive(Clone)]
pub struct Finder {
    session: Arc<dyn DeviceSession>,
    poller: Poller,
}

impl Finder {
    pub fn new(session: Arc<dyn DeviceSession>, poller: Poller) -> Self {
        Self { session, poller }
    }

    pub fn session(&self) -> &Arc<dyn DeviceSession> {
        &self.session
    }

    /// The poller whose interval and clock drive wait-mode.
    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Every element currently matching `locator`; empty on any error.
    pub async fn probe_all(&self, locator: &Locator) -> Vec<ElementHandle> {
        match self.session.find_all(locator).await {
            Ok(found) => found,
            Err(e) => {
                debug!(%locator, error = %e, "probe failed, treating as absent");
                Vec::new()
            }
        }
    }

    /// The first element currently matching `locator`, if any.
    pub async fn probe(&self, locator: &Locator) -> Option<ElementHandle> {
        self.probe_all(locator).await.into_iter().next()
    }

    /// Polls for `locator` until it matches or `timeout` elapses.
    #[instrument(skip(self, locator), fields(locator = %locator), level = "debug")]
    pub async fn wait(&self, locator: &Locator, timeout: Duration) -> Result<ElementHandle> {
        let session = self.session.as_ref();
        let found = self
            .poller
            .with_timeout(timeout)
            .poll_for(move || async move {
                session
                    .find_all(locator)
                    .await
                    .map(|found| found.into_iter().next())
            })
            .await;

        found.ok_or_else(|| Error::NotFound {
            locator: locator.to_string(),
            waited_ms: timeout.as_millis() as u64,
        })
    }

    /// Resolves the first match of `chain`.
    ///
    /// Leading locators are probed in order with no delay between them; the
    /// last locator absorbs the whole `timeout` in wait-mode.
    #[instrument(skip(self, chain), fields(chain = %chain), level = "debug")]
    pub async fn resolve(&self, chain: &LocatorChain, timeout: Duration) -> Result<ElementHandle> {
        let Some((last, leading)) = chain.locators().split_last() else {
            return Err(Error::EmptyChain);
        };

        for locator in leading {
            if let Some(element) = self.probe(locator).await {
                debug!(%locator, "resolved by probe");
                return Ok(element);
            }
        }

        self.wait(last, timeout).await
    }

    /// Waits on each locator in turn, returning the first match.
    ///
    /// Every candidate gets the full `timeout`. When all of them fail the
    /// last failure is returned.
    pub async fn resolve_one_of(
        &self,
        locators: &[Locator],
        timeout: Duration,
    ) -> Result<ElementHandle> {
        let mut last_error = Error::EmptyChain;
        for locator in locators {
            match self.wait(locator, timeout).await {
                Ok(element) => return Ok(element),
                Err(e) => last_error = e,
            }
        }
        Err(last_error)
    }

    /// Finds the clickable ancestor of an element showing exactly `text`.
    ///
    /// The text element's center is computed and the first clickable whose
    /// bounds contain it wins. Failing that, the first clickable with an
    /// exact-`text` descendant is returned.
    pub async fn find_clickable_container(&self, text: &str) -> Option<ElementHandle> {
        let label_locator = Locator::text(text);
        let label = self.probe(&label_locator).await?;

        let center = match self.session.bounds(&label).await {
            Ok(frame) => Some(frame.center()),
            Err(e) => {
                debug!(error = %e, "label bounds unavailable");
                None
            }
        };

        let clickables = self.probe_all(&Locator::clickable()).await;

        if let Some((cx, cy)) = center {
            for candidate in &clickables {
                match self.session.bounds(candidate).await {
                    Ok(frame) if frame.contains(cx, cy) => {
                        debug!(%candidate, "container found by geometry");
                        return Some(candidate.clone());
                    }
                    Ok(_) => {}
                    Err(e) => debug!(%candidate, error = %e, "skipping clickable without bounds"),
                }
            }
        }

        for candidate in clickables {
            match self.session.find_all_within(&candidate, &label_locator).await {
                Ok(found) if !found.is_empty() => {
                    debug!(%candidate, "container found by descendant text");
                    return Some(candidate);
                }
                Ok(_) => {}
                Err(e) => debug!(%candidate, error = %e, "descendant query failed"),
            }
        }

        None
    }

    /// Whether the element reports itself enabled.
    ///
    /// Reads the `enabled` attribute first and falls back to the element
    /// state query; any failure reads as disabled.
    pub async fn attr_enabled(&self, element: &ElementHandle) -> bool {
        match self.session.attribute(element, "enabled").await {
            Ok(Some(value)) => return matches!(value.as_str(), "true" | "True" | "1"),
            Ok(None) => {}
            Err(e) => debug!(%element, error = %e, "enabled attribute unavailable"),
        }
        self.session.is_enabled(element).await.unwrap_or(false)
    }

    /// Empties every input of widget class `class`. Failures are ignored.
    pub async fn clear_inputs(&self, class: &str) {
        for input in self.probe_all(&Locator::class_name(class)).await {
            if let Err(e) = self.session.clear(&input).await {
                debug!(%input, error = %e, "clear failed");
                continue;
            }
            if let Err(e) = self.session.set_value(&input, "").await {
                debug!(%input, error = %e, "blank assignment failed");
            }
        }
    }
}
