//! Device session trait for backend-agnostic UI automation.
//!
//! This module defines the [`DeviceSession`] trait, the only view the
//! locator engine, action executor, poller and flows have of the device. The
//! production implementation is [`AppiumSession`](crate::appium::AppiumSession);
//! tests use [`MockSession`](crate::mock::MockSession).
//!
//! # Error model
//!
//! Every backend maps its failures onto [`DriverError`]. Two groups matter to
//! the callers:
//!
//! - *misses* ([`DriverError::StaleElement`], [`DriverError::NoSuchElement`])
//!   are treated as "not present" by probes and re-resolved by waits;
//! - *rejections* ([`DriverError::is_rejection`]) make the action executor try
//!   the fallback technique for the same action.

use async_trait::async_trait;
use thiserror::Error;

use crate::element::{ElementFrame, ElementHandle};
use crate::locator::Locator;

/// Errors that can occur during device session operations.
///
/// This enum unifies errors from all backends behind a single type,
/// allowing consumers to handle errors uniformly regardless of the
/// underlying automation backend.
#[derive(Error, Debug)]
pub enum DriverError {
    /// A command or operation failed with the given message.
    #[error("Command failed: {0}")]
    CommandFailed(String),

    /// The session was closed or never opened.
    #[error("Not connected to automation backend")]
    NotConnected,

    /// The automation server refused to create a session.
    #[error("Session creation failed: {0}")]
    SessionCreation(String),

    /// The element reference no longer points at a live element.
    #[error("Stale element reference: {0}")]
    StaleElement(String),

    /// The automation layer refused to interact with the element.
    #[error("Element not interactable: {0}")]
    NotInteractable(String),

    /// No element matched a single-element lookup.
    #[error("No such element: {0}")]
    NoSuchElement(String),

    /// The backend does not implement the operation.
    #[error("Unsupported by this backend: {0}")]
    Unsupported(String),

    /// An operation timed out.
    #[error("Operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse JSON data.
    #[error("JSON parse error: {0}")]
    JsonParse(String),
}

impl DriverError {
    /// Whether the error means the primary technique was refused, so the
    /// executor should try its fallback for the same action.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            DriverError::NotInteractable(_)
                | DriverError::CommandFailed(_)
                | DriverError::Unsupported(_)
        )
    }

    /// Whether the error only means the element is gone or was never there.
    pub fn is_miss(&self) -> bool {
        matches!(
            self,
            DriverError::StaleElement(_) | DriverError::NoSuchElement(_)
        )
    }
}

/// Trait for a live device-automation session.
///
/// Implementors expose the raw queries and element operations of one remote
/// session. None of these methods wait or retry; bounded waiting and fallback
/// live in [`Finder`](crate::finder::Finder) and
/// [`ActionExecutor`](crate::executor::ActionExecutor).
///
/// All methods are async so that HTTP-backed sessions and in-memory test
/// sessions share one interface.
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Query every element matching `locator`.
    ///
    /// Returns an empty list when nothing matches; never blocks for the
    /// element to appear.
    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError>;

    /// Query descendants of `parent` matching `locator`.
    async fn find_all_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, DriverError>;

    /// Tap the element directly.
    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Dispatch a synthetic click gesture addressed to the element id.
    async fn click_gesture(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Clear the element's editable content.
    async fn clear(&self, element: &ElementHandle) -> Result<(), DriverError>;

    /// Type `text` into the element via key events.
    async fn send_text(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError>;

    /// Assign the element's value directly, bypassing key events.
    async fn set_value(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError>;

    /// The element's visible text.
    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError>;

    /// A named attribute, `None` if the element does not report it.
    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError>;

    /// The element's bounding box.
    async fn bounds(&self, element: &ElementHandle) -> Result<ElementFrame, DriverError>;

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DriverError>;

    /// Press an Android key code (66 is ENTER).
    async fn press_keycode(&self, keycode: u32) -> Result<(), DriverError>;

    /// Available automation contexts (`NATIVE_APP`, `WEBVIEW_…`).
    ///
    /// The default reports only the native context.
    async fn contexts(&self) -> Result<Vec<String>, DriverError> {
        Ok(vec!["NATIVE_APP".to_string()])
    }

    /// Navigate back.
    async fn back(&self) -> Result<(), DriverError>;

    /// Simulate a fingerprint touch on an emulator.
    ///
    /// Not all backends support this. The default implementation returns
    /// an error.
    async fn fingerprint(&self, _finger_id: u32) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("fingerprint".to_string()))
    }

    /// Terminate the application under test.
    async fn terminate_app(&self, app_id: &str) -> Result<(), DriverError>;

    /// End the remote session. Further calls fail with
    /// [`DriverError::NotConnected`].
    async fn quit(&self) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::CommandFailed("tap failed".to_string());
        assert!(err.to_string().contains("tap failed"));

        let err = DriverError::NotConnected;
        assert!(err.to_string().contains("Not connected"));

        let err = DriverError::StaleElement("42".to_string());
        assert!(err.to_string().contains("Stale element"));

        let err = DriverError::Timeout;
        assert!(err.to_string().contains("timed out"));

        let err = DriverError::JsonParse("unexpected token".to_string());
        assert!(err.to_string().contains("unexpected token"));
    }

    #[test]
    fn test_rejection_classification() {
        assert!(DriverError::NotInteractable("covered".into()).is_rejection());
        assert!(DriverError::CommandFailed("refused".into()).is_rejection());
        assert!(!DriverError::NotConnected.is_rejection());
        assert!(!DriverError::StaleElement("1".into()).is_rejection());
    }

    #[test]
    fn test_miss_classification() {
        assert!(DriverError::StaleElement("1".into()).is_miss());
        assert!(DriverError::NoSuchElement("x".into()).is_miss());
        assert!(!DriverError::Timeout.is_miss());
    }
}
