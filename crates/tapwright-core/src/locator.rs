//! Typed locators and ordered locator chains.
//!
//! A [`Locator`] is a `(strategy, selector)` pair as sent to the Appium
//! `find elements` endpoint. Most constructors build `UiSelector` expressions
//! for the `-android uiautomator` strategy:
//!
//! ```
//! use tapwright_core::locator::{Locator, LocatorChain};
//!
//! let chain = LocatorChain::new(Locator::text_contains("Sign in with email"))
//!     .or(Locator::text_contains("Sign In"));
//!
//! assert_eq!(chain.len(), 2);
//! assert_eq!(
//!     chain.locators()[0].selector(),
//!     r#"new UiSelector().textContains("Sign in with email")"#,
//! );
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Query strategy understood by the device-automation server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// `-android uiautomator` (UiSelector / UiScrollable expressions).
    UiAutomator,
    /// `accessibility id` (content-desc on Android, accessibilityIdentifier on iOS).
    AccessibilityId,
    /// `class name`.
    ClassName,
    /// `id` (resource-id).
    Id,
    /// `xpath`.
    XPath,
    /// `-ios predicate string`.
    IosPredicate,
    /// `-ios class chain`.
    IosClassChain,
}

impl Strategy {
    /// The `using` value for the W3C find-elements request.
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::UiAutomator => "-android uiautomator",
            Strategy::AccessibilityId => "accessibility id",
            Strategy::ClassName => "class name",
            Strategy::Id => "id",
            Strategy::XPath => "xpath",
            Strategy::IosPredicate => "-ios predicate string",
            Strategy::IosClassChain => "-ios class chain",
        }
    }
}

/// Class name of generic Android text inputs.
pub const EDIT_TEXT_CLASS: &str = "android.widget.EditText";

/// Escapes a string for use inside a double-quoted UiSelector argument.
fn quote(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// A strategy plus selector identifying zero or more UI elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    strategy: Strategy,
    selector: String,
}

impl Locator {
    pub fn new(strategy: Strategy, selector: impl Into<String>) -> Self {
        Self {
            strategy,
            selector: selector.into(),
        }
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn selector(&self) -> &str {
        &self.selector
    }

    /// Exact visible text.
    pub fn text(text: &str) -> Self {
        Self::ui_selector(format!(r#"new UiSelector().text("{}")"#, quote(text)))
    }

    /// Visible text containing `text`.
    pub fn text_contains(text: &str) -> Self {
        Self::ui_selector(format!(r#"new UiSelector().textContains("{}")"#, quote(text)))
    }

    /// Content description containing `desc`.
    pub fn description_contains(desc: &str) -> Self {
        Self::ui_selector(format!(
            r#"new UiSelector().descriptionContains("{}")"#,
            quote(desc)
        ))
    }

    /// The `instance`-th element (0-based) of a widget class.
    pub fn class_instance(class: &str, instance: u32) -> Self {
        Self::ui_selector(format!(
            r#"new UiSelector().className("{}").instance({})"#,
            quote(class),
            instance
        ))
    }

    /// Every element flagged clickable.
    pub fn clickable() -> Self {
        Self::ui_selector("new UiSelector().clickable(true)")
    }

    /// Scrolls the first scrollable container until an element whose text
    /// contains `text` is visible.
    pub fn scroll_into_view(text: &str) -> Self {
        Self::ui_selector(format!(
            r#"new UiScrollable(new UiSelector().scrollable(true)).scrollIntoView(new UiSelector().textContains("{}"));"#,
            quote(text)
        ))
    }

    /// Widget class name via the `class name` strategy.
    pub fn class_name(class: &str) -> Self {
        Self::new(Strategy::ClassName, class)
    }

    pub fn accessibility_id(id: &str) -> Self {
        Self::new(Strategy::AccessibilityId, id)
    }

    /// iOS predicate matching elements whose value contains `text`.
    pub fn ios_value_contains(text: &str) -> Self {
        Self::new(
            Strategy::IosPredicate,
            format!(r#"value CONTAINS "{}""#, quote(text)),
        )
    }

    fn ui_selector(selector: impl Into<String>) -> Self {
        Self::new(Strategy::UiAutomator, selector)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.strategy.as_str(), self.selector)
    }
}

/// Ordered fallback list of locators. The first match wins; earlier entries
/// are the fast, specific paths and the last entry is the authoritative one.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocatorChain(Vec<Locator>);

impl LocatorChain {
    pub fn new(first: Locator) -> Self {
        Self(vec![first])
    }

    /// Appends a lower-priority fallback.
    pub fn or(mut self, next: Locator) -> Self {
        self.0.push(next);
        self
    }

    pub fn locators(&self) -> &[Locator] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Locator> for LocatorChain {
    fn from(locator: Locator) -> Self {
        Self::new(locator)
    }
}

impl From<Vec<Locator>> for LocatorChain {
    fn from(locators: Vec<Locator>) -> Self {
        Self(locators)
    }
}

impl FromIterator<Locator> for LocatorChain {
    fn from_iter<I: IntoIterator<Item = Locator>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for LocatorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(" | "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_selector_constructors() {
        assert_eq!(
            Locator::text("Sign In").selector(),
            r#"new UiSelector().text("Sign In")"#
        );
        assert_eq!(
            Locator::description_contains("send").selector(),
            r#"new UiSelector().descriptionContains("send")"#
        );
        assert_eq!(
            Locator::class_instance("android.widget.Button", 2).selector(),
            r#"new UiSelector().className("android.widget.Button").instance(2)"#
        );
        assert_eq!(Locator::clickable().strategy(), Strategy::UiAutomator);
    }

    #[test]
    fn quotes_are_escaped() {
        let locator = Locator::text_contains(r#"say "hi""#);
        assert_eq!(
            locator.selector(),
            r#"new UiSelector().textContains("say \"hi\"")"#
        );
    }

    #[test]
    fn scroll_into_view_wraps_text_query() {
        let locator = Locator::scroll_into_view("Terms");
        assert!(locator.selector().starts_with("new UiScrollable("));
        assert!(locator.selector().contains(r#"textContains("Terms")"#));
    }

    #[test]
    fn strategy_wire_names() {
        assert_eq!(Strategy::UiAutomator.as_str(), "-android uiautomator");
        assert_eq!(Strategy::ClassName.as_str(), "class name");
        assert_eq!(Strategy::IosPredicate.as_str(), "-ios predicate string");
        assert_eq!(
            Locator::class_name(EDIT_TEXT_CLASS).to_string(),
            "class name=android.widget.EditText"
        );
    }

    #[test]
    fn chain_keeps_priority_order() {
        let chain = LocatorChain::new(Locator::text("a"))
            .or(Locator::text("b"))
            .or(Locator::text("c"));
        let selectors: Vec<&str> = chain.locators().iter().map(|l| l.selector()).collect();
        assert_eq!(
            selectors,
            vec![
                r#"new UiSelector().text("a")"#,
                r#"new UiSelector().text("b")"#,
                r#"new UiSelector().text("c")"#,
            ]
        );
    }

    #[test]
    fn locator_deserializes_from_config() {
        let json = r#"{"strategy": "accessibility_id", "selector": "+"}"#;
        let locator: Locator = serde_json::from_str(json).unwrap();
        assert_eq!(locator, Locator::accessibility_id("+"));
    }
}
