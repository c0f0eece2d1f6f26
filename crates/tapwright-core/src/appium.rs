//! [`DeviceSession`] implementation backed by an Appium server.
//!
//! This module provides [`AppiumSession`], which speaks W3C WebDriver plus the
//! Appium extension endpoints through a [`fantoccini::Client`]. Standard
//! navigation goes through the client's own API; element queries and the
//! `/appium/...` routes are issued as [`AppiumCommand`]s.
//!
//! # Example
//!
//! ```no_run
//! use tapwright_core::appium::AppiumSession;
//! use tapwright_core::config::HarnessConfig;
//! use tapwright_core::driver::DeviceSession;
//! use tapwright_core::locator::Locator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::from_file("config/dev_caps.json")?;
//! let session = AppiumSession::open(&config.session()?).await?;
//! let buttons = session.find_all(&Locator::clickable()).await?;
//! println!("{} clickable elements", buttons.len());
//! session.quit().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::wd::WebDriverCompatibleCommand;
use fantoccini::{Client, ClientBuilder};
use http::Method;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use url::Url;

use crate::config::SessionConfig;
use crate::driver::{DeviceSession, DriverError};
use crate::element::{ElementFrame, ElementHandle};
use crate::locator::Locator;

/// W3C web element identifier key.
const W3C_ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";
/// Pre-W3C (JSONWP) element identifier key, still sent by older servers.
const LEGACY_ELEMENT_KEY: &str = "ELEMENT";

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

/// Maps a fantoccini [`CmdError`] to a [`DriverError`].
fn map_cmd_error(err: CmdError) -> DriverError {
    match err {
        CmdError::Standard(wd) => {
            let message = wd.message.to_string();
            match wd.error {
                ErrorStatus::StaleElementReference => DriverError::StaleElement(message),
                ErrorStatus::NoSuchElement => DriverError::NoSuchElement(message),
                ErrorStatus::ElementNotInteractable
                | ErrorStatus::ElementClickIntercepted
                | ErrorStatus::InvalidElementState => DriverError::NotInteractable(message),
                ErrorStatus::InvalidSessionId => DriverError::NotConnected,
                ErrorStatus::UnknownCommand
                | ErrorStatus::UnknownMethod
                | ErrorStatus::UnsupportedOperation => DriverError::Unsupported(message),
                ErrorStatus::Timeout | ErrorStatus::ScriptTimeout => DriverError::Timeout,
                _ => DriverError::CommandFailed(format!("{:?}: {message}", wd.error)),
            }
        }
        other => DriverError::CommandFailed(other.to_string()),
    }
}

/// Extracts the element id from a W3C (or legacy) element reference.
pub fn element_id(value: &Value) -> Option<String> {
    value
        .get(W3C_ELEMENT_KEY)
        .or_else(|| value.get(LEGACY_ELEMENT_KEY))
        .and_then(Value::as_str)
        .map(str::to_string)
}

fn element_list(value: Value) -> Result<Vec<ElementHandle>, DriverError> {
    let Value::Array(items) = value else {
        return Err(DriverError::JsonParse(format!(
            "expected element array, got {value}"
        )));
    };
    items
        .iter()
        .map(|item| {
            element_id(item)
                .map(ElementHandle::new)
                .ok_or_else(|| DriverError::JsonParse(format!("not an element reference: {item}")))
        })
        .collect()
}

fn attribute_value(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// AppiumCommand
// ---------------------------------------------------------------------------

/// A session-scoped WebDriver or Appium endpoint call.
///
/// `path` is relative to `/session/{id}/`; POST bodies default to `{}`.
#[derive(Debug, Clone, PartialEq)]
pub struct AppiumCommand {
    method: Method,
    path: String,
    body: Option<Value>,
}

impl AppiumCommand {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            path: path.into(),
            body: None,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::POST,
            path: path.into(),
            body: Some(body),
        }
    }

    /// `POST elements` (or `element/{id}/elements` under a parent).
    pub fn find_elements(parent: Option<&ElementHandle>, locator: &Locator) -> Self {
        let path = match parent {
            Some(parent) => format!("element/{}/elements", parent.id()),
            None => "elements".to_string(),
        };
        Self::post(
            path,
            json!({ "using": locator.strategy().as_str(), "value": locator.selector() }),
        )
    }

    pub fn element(element: &ElementHandle, method: Method, action: &str) -> Self {
        Self {
            method,
            path: format!("element/{}/{action}", element.id()),
            body: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl WebDriverCompatibleCommand for AppiumCommand {
    fn endpoint(
        &self,
        base_url: &Url,
        session_id: Option<&str>,
    ) -> Result<Url, url::ParseError> {
        // Every command here needs a live session.
        let session_id = session_id.ok_or(url::ParseError::RelativeUrlWithoutBase)?;
        base_url
            .join("session/")?
            .join(&format!("{session_id}/"))?
            .join(&self.path)
    }

    fn method_and_body(&self, _request_url: &Url) -> (Method, Option<String>) {
        let body = match self.method {
            Method::POST => Some(
                self.body
                    .as_ref()
                    .map_or_else(|| "{}".to_string(), Value::to_string),
            ),
            _ => None,
        };
        (self.method.clone(), body)
    }
}

// ---------------------------------------------------------------------------
// AppiumSession
// ---------------------------------------------------------------------------

/// A [`DeviceSession`] on a remote Appium server.
///
/// The client is held in a [`tokio::sync::Mutex`] so that
/// [`quit`](DeviceSession::quit) can take it; every later call fails with
/// [`DriverError::NotConnected`].
pub struct AppiumSession {
    client: Mutex<Option<Client>>,
}

impl AppiumSession {
    /// Creates a session with the configured capabilities.
    #[instrument(skip(config), fields(server = %config.server_url), level = "debug")]
    pub async fn open(config: &SessionConfig) -> Result<Self, DriverError> {
        let client = ClientBuilder::native()
            .capabilities(config.caps.clone())
            .connect(config.server_url.as_str())
            .await
            .map_err(|e| DriverError::SessionCreation(e.to_string()))?;

        match client.session_id().await {
            Ok(Some(id)) => info!(session_id = %id, "appium session created"),
            _ => info!("appium session created"),
        }
        Ok(Self::from_client(client))
    }

    /// Wraps an already connected client.
    pub fn from_client(client: Client) -> Self {
        Self {
            client: Mutex::new(Some(client)),
        }
    }

    async fn client(&self) -> Result<Client, DriverError> {
        self.client.lock().await.clone().ok_or(DriverError::NotConnected)
    }

    async fn issue(&self, command: AppiumCommand) -> Result<Value, DriverError> {
        let client = self.client().await?;
        debug!(method = %command.method, path = %command.path, "issuing command");
        client.issue_cmd(command).await.map_err(map_cmd_error)
    }

    async fn execute(&self, script: &str, args: Value) -> Result<Value, DriverError> {
        let client = self.client().await?;
        client
            .execute(script, vec![args])
            .await
            .map_err(map_cmd_error)
    }
}

#[async_trait]
impl DeviceSession for AppiumSession {
    #[instrument(skip(self), level = "debug")]
    async fn find_all(&self, locator: &Locator) -> Result<Vec<ElementHandle>, DriverError> {
        let value = self.issue(AppiumCommand::find_elements(None, locator)).await?;
        element_list(value)
    }

    #[instrument(skip(self), level = "debug")]
    async fn find_all_within(
        &self,
        parent: &ElementHandle,
        locator: &Locator,
    ) -> Result<Vec<ElementHandle>, DriverError> {
        let value = self
            .issue(AppiumCommand::find_elements(Some(parent), locator))
            .await?;
        element_list(value)
    }

    #[instrument(skip(self), level = "debug")]
    async fn click(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.issue(AppiumCommand::element(element, Method::POST, "click"))
            .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn click_gesture(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.execute("mobile: clickGesture", json!({ "elementId": element.id() }))
            .await?;
        Ok(())
    }

    async fn clear(&self, element: &ElementHandle) -> Result<(), DriverError> {
        self.issue(AppiumCommand::element(element, Method::POST, "clear"))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, text), level = "debug")]
    async fn send_text(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        self.issue(AppiumCommand::post(
            format!("element/{}/value", element.id()),
            json!({ "text": text }),
        ))
        .await?;
        Ok(())
    }

    #[instrument(skip(self, text), level = "debug")]
    async fn set_value(&self, element: &ElementHandle, text: &str) -> Result<(), DriverError> {
        let legacy = AppiumCommand::post(
            format!("appium/element/{}/value", element.id()),
            json!({ "text": text, "value": [text] }),
        );
        match self.issue(legacy).await {
            Ok(_) => Ok(()),
            // Appium 2 drivers dropped the route; UiAutomator2 exposes it as a script.
            Err(DriverError::Unsupported(_)) => {
                self.execute(
                    "mobile: replaceElementValue",
                    json!({ "elementId": element.id(), "text": text }),
                )
                .await?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, DriverError> {
        let value = self
            .issue(AppiumCommand::element(element, Method::GET, "text"))
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, DriverError> {
        let value = self
            .issue(AppiumCommand::element(
                element,
                Method::GET,
                &format!("attribute/{name}"),
            ))
            .await?;
        Ok(attribute_value(value))
    }

    async fn bounds(&self, element: &ElementHandle) -> Result<ElementFrame, DriverError> {
        let value = self
            .issue(AppiumCommand::element(element, Method::GET, "rect"))
            .await?;
        serde_json::from_value(value).map_err(|e| DriverError::JsonParse(e.to_string()))
    }

    async fn is_enabled(&self, element: &ElementHandle) -> Result<bool, DriverError> {
        let value = self
            .issue(AppiumCommand::element(element, Method::GET, "enabled"))
            .await?;
        value
            .as_bool()
            .ok_or_else(|| DriverError::JsonParse(format!("expected boolean, got {value}")))
    }

    #[instrument(skip(self), level = "debug")]
    async fn press_keycode(&self, keycode: u32) -> Result<(), DriverError> {
        self.issue(AppiumCommand::post(
            "appium/device/press_keycode",
            json!({ "keycode": keycode }),
        ))
        .await?;
        Ok(())
    }

    async fn contexts(&self) -> Result<Vec<String>, DriverError> {
        let value = self.issue(AppiumCommand::get("contexts")).await?;
        serde_json::from_value(value).map_err(|e| DriverError::JsonParse(e.to_string()))
    }

    #[instrument(skip(self), level = "debug")]
    async fn back(&self) -> Result<(), DriverError> {
        let client = self.client().await?;
        client.back().await.map_err(map_cmd_error)
    }

    #[instrument(skip(self), level = "debug")]
    async fn fingerprint(&self, finger_id: u32) -> Result<(), DriverError> {
        self.issue(AppiumCommand::post(
            "appium/device/finger_print",
            json!({ "fingerprintId": finger_id }),
        ))
        .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn terminate_app(&self, app_id: &str) -> Result<(), DriverError> {
        self.issue(AppiumCommand::post(
            "appium/device/terminate_app",
            json!({ "appId": app_id }),
        ))
        .await?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn quit(&self) -> Result<(), DriverError> {
        let client = self.client.lock().await.take().ok_or(DriverError::NotConnected)?;
        client.close().await.map_err(map_cmd_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("http://localhost:4723/wd/hub/").unwrap()
    }

    #[test]
    fn endpoints_are_session_scoped() {
        let cmd = AppiumCommand::find_elements(None, &Locator::clickable());
        let url = cmd.endpoint(&base(), Some("abc123")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4723/wd/hub/session/abc123/elements");

        let parent = ElementHandle::new("42");
        let cmd = AppiumCommand::find_elements(Some(&parent), &Locator::text("Sign In"));
        let url = cmd.endpoint(&base(), Some("abc123")).unwrap();
        assert_eq!(url.path(), "/wd/hub/session/abc123/element/42/elements");

        let cmd = AppiumCommand::element(&parent, Method::GET, "attribute/enabled");
        let url = cmd.endpoint(&base(), Some("abc123")).unwrap();
        assert_eq!(url.path(), "/wd/hub/session/abc123/element/42/attribute/enabled");
    }

    #[test]
    fn endpoint_requires_session() {
        let cmd = AppiumCommand::get("contexts");
        assert!(cmd.endpoint(&base(), None).is_err());
    }

    #[test]
    fn find_body_carries_strategy_and_selector() {
        let cmd = AppiumCommand::find_elements(None, &Locator::text_contains("Sign In"));
        let (method, body) = cmd.method_and_body(&base());
        assert_eq!(method, Method::POST);

        let body: Value = serde_json::from_str(&body.unwrap()).unwrap();
        assert_eq!(body["using"], "-android uiautomator");
        assert_eq!(body["value"], r#"new UiSelector().textContains("Sign In")"#);
    }

    #[test]
    fn empty_post_sends_object_and_get_sends_nothing() {
        let el = ElementHandle::new("7");
        let (_, body) = AppiumCommand::element(&el, Method::POST, "click").method_and_body(&base());
        assert_eq!(body.as_deref(), Some("{}"));

        let (method, body) = AppiumCommand::get("contexts").method_and_body(&base());
        assert_eq!(method, Method::GET);
        assert!(body.is_none());
    }

    #[test]
    fn element_ids_from_both_key_styles() {
        let w3c = json!({ W3C_ELEMENT_KEY: "00000000-0000-0001" });
        let legacy = json!({ "ELEMENT": "17" });
        assert_eq!(element_id(&w3c).as_deref(), Some("00000000-0000-0001"));
        assert_eq!(element_id(&legacy).as_deref(), Some("17"));
        assert!(element_id(&json!({ "id": 1 })).is_none());
    }

    #[test]
    fn element_list_rejects_malformed_payloads() {
        let ok = element_list(json!([{ W3C_ELEMENT_KEY: "a" }, { "ELEMENT": "b" }])).unwrap();
        assert_eq!(ok, vec![ElementHandle::new("a"), ElementHandle::new("b")]);

        assert!(matches!(
            element_list(json!({ "value": [] })),
            Err(DriverError::JsonParse(_))
        ));
        assert!(element_list(json!([{ "nope": 1 }])).is_err());
    }

    #[test]
    fn attribute_values_normalize() {
        assert_eq!(attribute_value(Value::Null), None);
        assert_eq!(attribute_value(json!("true")).as_deref(), Some("true"));
        assert_eq!(attribute_value(json!(false)).as_deref(), Some("false"));
    }

    #[test]
    fn rect_payload_deserializes_to_frame() {
        let frame: ElementFrame =
            serde_json::from_value(json!({ "x": 0, "y": 480, "width": 360, "height": 60 }))
                .unwrap();
        assert!(frame.contains(60.0, 510.0));
    }
}
