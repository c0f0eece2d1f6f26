//! In-memory [`DeviceSession`] and virtual [`Clock`] for tests.
//!
//! [`MockSession`] answers queries from a script: each [`Locator`] maps to
//! the element ids it returns, optionally only after it has been queried a
//! number of times (to model asynchronously rendered UI). Element operations
//! act on [`MockElement`] state, and every call is recorded so tests can
//! assert on ordering.
//!
//! ```
//! use tapwright_core::driver::DeviceSession;
//! use tapwright_core::locator::Locator;
//! use tapwright_core::mock::{MockElement, MockSession};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let session = MockSession::new();
//! session.add_element("btn", MockElement::new().text("Sign In"));
//! session.on(Locator::text("Sign In"), ["btn"]);
//!
//! let found = session.find_all(&Locator::text("Sign In")).await.unwrap();
//! assert_eq!(found.len(), 1);
//! assert_eq!(session.calls(), vec![r#"find_all -android uiautomator=new UiSelector().text("Sign In")"#]);
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::driver::{DeviceSession, DriverError};
use crate::element::{ElementFrame, ElementHandle};
use crate::locator::Locator;
use crate::poller::Clock;

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// A [`Clock`] whose time only moves when something sleeps on it.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    state: Mutex<ClockState>,
}

#[derive(Debug, Default)]
struct ClockState {
    offset: Duration,
    sleeps: Vec<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            state: Mutex::new(ClockState::default()),
        }
    }

    /// Moves virtual time forward without recording a sleep.
    pub fn advance(&self, by: Duration) {
        self.lock().offset += by;
    }

    /// Virtual time elapsed since creation.
    pub fn elapsed(&self) -> Duration {
        self.lock().offset
    }

    /// Number of sleeps taken.
    pub fn sleeps(&self) -> usize {
        self.lock().sleeps.len()
    }

    /// Every sleep duration, in order.
    pub fn sleep_log(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.lock().offset
    }

    async fn sleep(&self, duration: Duration) {
        {
            let mut state = self.lock();
            state.offset += duration;
            state.sleeps.push(duration);
        }
        tokio::task::yield_now().await;
    }
}

// ---------------------------------------------------------------------------
// MockElement
// ---------------------------------------------------------------------------

/// State of one element in a [`MockSession`].
#[derive(Debug, Clone)]
pub struct MockElement {
    pub text: String,
    pub value: String,
    pub frame: Option<ElementFrame>,
    pub enabled: bool,
    /// When non-empty, the element reports enabled only while every listed
    /// element has a non-empty value.
    pub enabled_when_filled: Vec<String>,
    pub accepts_click: bool,
    pub accepts_gesture: bool,
    pub accepts_keys: bool,
    pub accepts_set_value: bool,
}

impl Default for MockElement {
    fn default() -> Self {
        Self {
            text: String::new(),
            value: String::new(),
            frame: None,
            enabled: true,
            enabled_when_filled: Vec::new(),
            accepts_click: true,
            accepts_gesture: true,
            accepts_keys: true,
            accepts_set_value: true,
        }
    }
}

impl MockElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn frame(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.frame = Some(ElementFrame::new(x, y, width, height));
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn enabled_when_filled<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enabled_when_filled = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn rejects_click(mut self) -> Self {
        self.accepts_click = false;
        self
    }

    pub fn rejects_gesture(mut self) -> Self {
        self.accepts_gesture = false;
        self
    }

    pub fn rejects_keys(mut self) -> Self {
        self.accepts_keys = false;
        self
    }

    pub fn rejects_set_value(mut self) -> Self {
        self.accepts_set_value = false;
        self
    }
}

// ---------------------------------------------------------------------------
// MockSession
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Scripted {
    /// Ids returned once the locator has been queried `after` times.
    Found { ids: Vec<String>, after: usize },
    /// The first query returns `first`; later ones return `then`.
    Rerendered { first: Vec<String>, then: Vec<String> },
    /// Every query fails with a stale-element error.
    Stale,
}

#[derive(Debug)]
struct MockState {
    elements: HashMap<String, MockElement>,
    scripted: HashMap<Locator, Scripted>,
    within: HashMap<(String, Locator), Vec<String>>,
    queries: HashMap<Locator, usize>,
    calls: Vec<String>,
    contexts: Vec<String>,
    keycodes_supported: bool,
    fingerprint_supported: bool,
    terminate_fails: bool,
    connected: bool,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            elements: HashMap::new(),
            scripted: HashMap::new(),
            within: HashMap::new(),
            queries: HashMap::new(),
            calls: Vec::new(),
            contexts: vec!["NATIVE_APP".to_string()],
            keycodes_supported: true,
            fingerprint_supported: false,
            terminate_fails: false,
            connected: true,
        }
    }
}

/// Scripted in-memory device session.
#[derive(Debug, Default)]
pub struct MockSession {
    state: Mutex<MockState>,
}

fn stale(id: &str) -> DriverError {
    DriverError::StaleElement(id.to_string())
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers (or replaces) an element.
    pub fn add_element(&self, id: &str, element: MockElement) {
        self.lock().elements.insert(id.to_string(), element);
    }

    /// `locator` returns `ids` from the first query on.
    pub fn on<I, S>(&self, locator: Locator, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.on_after(locator, 0, ids);
    }

    /// `locator` returns nothing for its first `after` queries, then `ids`.
    pub fn on_after<I, S>(&self, locator: Locator, after: usize, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = ids.into_iter().map(Into::into).collect();
        self.lock()
            .scripted
            .insert(locator, Scripted::Found { ids, after });
    }

    /// `locator` matches `first` once, then `then` on every later query, as
    /// when the screen re-renders and replaces its widgets.
    pub fn on_rerender<I, J, S, T>(&self, locator: Locator, first: I, then: J)
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        let first = first.into_iter().map(Into::into).collect();
        let then = then.into_iter().map(Into::into).collect();
        self.lock()
            .scripted
            .insert(locator, Scripted::Rerendered { first, then });
    }

    /// Every query for `locator` fails as if the tree re-rendered mid-query.
    pub fn on_stale(&self, locator: Locator) {
        self.lock().scripted.insert(locator, Scripted::Stale);
    }

    /// Descendants of `parent` matching `locator`.
    pub fn on_within<I, S>(&self, parent: &str, locator: Locator, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = ids.into_iter().map(Into::into).collect();
        self.lock()
            .within
            .insert((parent.to_string(), locator), ids);
    }

    pub fn set_contexts<I, S>(&self, contexts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lock().contexts = contexts.into_iter().map(Into::into).collect();
    }

    pub fn set_keycodes_supported(&self, supported: bool) {
        self.lock().keycodes_supported = supported;
    }

    pub fn set_fingerprint_supported(&self, supported: bool) {
        self.lock().fingerprint_supported = supported;
    }

    pub fn set_terminate_fails(&self, fails: bool) {
        self.lock().terminate_fails = fails;
    }

    /// Every session call so far, formatted as `"<op> <args>"`.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// How many times `locator` was passed to [`DeviceSession::find_all`].
    pub fn queried(&self, locator: &Locator) -> usize {
        self.lock().queries.get(locator).copied().unwrap_or(0)
    }

    /// Current value of an element (what was typed or assigned).
    pub fn value_of(&self, id: &str) -> Option<String> {
        self.lock().elements.get(id).map(|e| e.value.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    /// Records the call and fails when the session has been quit.
    fn begin(&self, call: String) -> Result<std::sync::MutexGuard<'_, MockState>, DriverError> {
        let mut state = self.lock();
        state.calls.push(call);
        if state.connected {
            Ok(state)
        } else {
            Err(DriverError::NotConnected)
        }
    }
}

fn element_mut<'a>(
    state: &'a mut MockState,
    element: &ElementHandle,
) -> Result<&'a mut MockElement, DriverError> {
    state
        .elements
        .get_mut(element.id())
        .ok_or_else(|| stale(element.id()))
}

fn handles(ids: &[String]) -> Vec<ElementHandle> {
    ids.iter().map(ElementHandle::new).collect()
}

#[async_trait]
impl DeviceSession for MockSession {
    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError> {
        let mut state = self.begin(format!("find_all {locator}"))?;
        let seen = {
            let count = state.queries.entry(locator.clone()).or_insert(0);
            *count += 1;
            *count - 1
        };
        match state.scripted.get(locator) {
            Some(Scripted::Found { ids, after }) if seen >= *after => Ok(handles(ids)),
            Some(Scripted::Rerendered { first, .. }) if seen == 0 => Ok(handles(first)),
            Some(Scripted::Rerendered { then, .. }) => Ok(handles(then)),
            Some(Scripted::Stale) => Err(stale(locator.selector())),
            _ => Ok(Vec::new()),
        }
    }

    async fn find_all_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let state = self.begin(format!("find_all_within {parent} {locator}"))?;
        if !state.elements.contains_key(parent.id()) {
            return Err(stale(parent.id()));
        }
        Ok(state
            .within
            .get(&(parent.id().to_string(), locator.clone()))
            .map(|ids| handles(ids))
            .unwrap_or_default())
    }

    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.begin(format!("click {element}"))?;
        if element_mut(&mut state, element)?.accepts_click {
            Ok(())
        } else {
            Err(DriverError::NotInteractable(element.to_string()))
        }
    }

    async fn click_gesture(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.begin(format!("click_gesture {element}"))?;
        if element_mut(&mut state, element)?.accepts_gesture {
            Ok(())
        } else {
            Err(DriverError::CommandFailed("clickGesture refused".to_string()))
        }
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), DriverError> {
        let mut state = self.begin(format!("clear {element}"))?;
        element_mut(&mut state, element)?.value.clear();
        Ok(())
    }

    async fn send_text(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        let mut state = self.begin(format!("send_text {element} {text}"))?;
        let el = element_mut(&mut state, element)?;
        if !el.accepts_keys {
            return Err(DriverError::NotInteractable(element.to_string()));
        }
        el.value.push_str(text);
        Ok(())
    }

    async fn set_value(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        let mut state = self.begin(format!("set_value {element} {text}"))?;
        let el = element_mut(&mut state, element)?;
        if !el.accepts_set_value {
            return Err(DriverError::CommandFailed("setValue refused".to_string()));
        }
        el.value = text.to_string();
        Ok(())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let mut state = self.begin(format!("text {element}"))?;
        let el = element_mut(&mut state, element)?;
        if el.value.is_empty() {
            Ok(el.text.clone())
        } else {
            Ok(el.value.clone())
        }
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let enabled = self.is_enabled(element).await;
        let mut state = self.begin(format!("attribute {element} {name}"))?;
        let el = element_mut(&mut state, element)?;
        Ok(match name {
            "enabled" => Some(enabled?.to_string()),
            "text" => Some(el.text.clone()),
            _ => None,
        })
    }

    async fn bounds(&self, element: &ElementHandle) -> Result<ElementFrame, DriverError> {
        let mut state = self.begin(format!("bounds {element}"))?;
        element_mut(&mut state, element)?
            .frame
            .ok_or_else(|| DriverError::CommandFailed(format!("{element} has no frame")))
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let mut state = self.begin(format!("is_enabled {element}"))?;
        let el = element_mut(&mut state, element)?.clone();
        if el.enabled_when_filled.is_empty() {
            return Ok(el.enabled);
        }
        Ok(el.enabled_when_filled.iter().all(|id| {
            state
                .elements
                .get(id)
                .map_or(false, |input| !input.value.is_empty())
        }))
    }

    async fn press_keycode(&self, keycode: u32) -> Result<(), DriverError> {
        let state = self.begin(format!("press_keycode {keycode}"))?;
        if state.keycodes_supported {
            Ok(())
        } else {
            Err(DriverError::Unsupported("press_keycode".to_string()))
        }
    }

    async fn contexts(&self) -> Result<Vec<String>, DriverError> {
        let state = self.begin("contexts".to_string())?;
        Ok(state.contexts.clone())
    }

    async fn back(&self) -> Result<(), DriverError> {
        let _state = self.begin("back".to_string())?;
        Ok(())
    }

    async fn fingerprint(&self, finger_id: u32) -> Result<(), DriverError> {
        let state = self.begin(format!("fingerprint {finger_id}"))?;
        if state.fingerprint_supported {
            Ok(())
        } else {
            Err(DriverError::Unsupported("fingerprint".to_string()))
        }
    }

    async fn terminate_app(&self, app_id: &str) -> Result<(), DriverError> {
        let state = self.begin(format!("terminate_app {app_id}"))?;
        if state.terminate_fails {
            Err(DriverError::CommandFailed(format!("{app_id} is not running")))
        } else {
            Ok(())
        }
    }

    async fn quit(&self) -> Result<(), DriverError> {
        let mut state = self.begin("quit".to_string())?;
        state.connected = false;
        Ok(())
    }
}
