//! # tapwright-core
//!
//! Core library for resilient mobile UI test automation over Appium.
//!
//! This crate resolves on-screen elements through ordered locator fallbacks,
//! performs actions with fallback techniques when the primary one is refused,
//! polls live UI state against deadlines and composes all of it into sign-in
//! and chat flows.
//!
//! ## Modules
//!
//! - [`driver`] - The [`DeviceSession`](driver::DeviceSession) trait every backend implements
//! - [`appium`] - Appium/W3C WebDriver backend built on `fantoccini`
//! - [`locator`] - Locator strategies, selectors and fallback chains
//! - [`finder`] - Probe and wait-mode element resolution
//! - [`executor`] - Click, type, credential entry and submit with fallbacks
//! - [`poller`] - Deadline-bounded polling on an injectable clock
//! - [`flows`] - Authentication and chat user journeys with per-step reports
//! - [`session`] - Session bracketing with guaranteed teardown
//! - [`config`] - JSON harness configuration
//! - [`adb`] - Wrapper around the Android `adb` tool
//! - [`mock`] - Scripted in-memory session and manual clock for tests
//!
//! ## External Dependencies
//!
//! - **Appium server** with a UiAutomator2 (or XCUITest) driver, reachable at
//!   the configured `server_url`
//! - **Android platform tools** (`adb`) for the device-level helpers
//!
//! ## Example
//!
//! ```no_run
//! use tapwright_core::config::HarnessConfig;
//! use tapwright_core::flows::Credentials;
//! use tapwright_core::session::Harness;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::from_file("config/dev_caps.json")?;
//! let report = Harness::connect(config)
//!     .await?
//!     .run(|harness| async move {
//!         harness
//!             .auth()
//!             .login(&Credentials::new("user@example.com", "Password123"))
//!             .await
//!     })
//!     .await;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

pub mod adb;
pub mod appium;
pub mod config;
pub mod driver;
pub mod element;
pub mod error;
pub mod executor;
pub mod finder;
pub mod flows;
pub mod locator;
pub mod mock;
pub mod poller;
pub mod session;
