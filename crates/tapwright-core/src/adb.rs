//! Interface to the Android `adb` command-line tool.
//!
//! This module wraps the few device-level controls the flows need outside the
//! automation session: listing devices, reading and toggling wifi, opening the
//! wifi settings screen and the emulator fingerprint touch.
//!
//! # Requirements
//!
//! The Android platform tools must be installed and `adb` must be on `PATH`.
//!
//! # Example
//!
//! ```no_run
//! use tapwright_core::adb::Adb;
//!
//! for device in Adb::list_devices().unwrap() {
//!     println!("{} ({})", device.serial, device.state);
//! }
//!
//! let serial = Adb::first_device().unwrap();
//! Adb::set_wifi(Some(&serial), false).unwrap();
//! ```

use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur when running `adb`.
#[derive(Error, Debug)]
pub enum AdbError {
    /// adb exited with a non-zero status.
    #[error("adb failed: {0}")]
    CommandFailed(String),

    /// `adb devices` listed nothing.
    #[error("No Android device connected")]
    NoDevice,

    /// adb could not be started.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A device as reported by `adb devices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AndroidDevice {
    /// Device serial (e.g. `emulator-5554`).
    pub serial: String,
    /// Connection state (`device`, `offline`, `unauthorized`, ...).
    pub state: String,
}

/// Wrapper for `adb` commands.
///
/// All methods are synchronous and execute shell commands. Call them through
/// `tokio::task::spawn_blocking` from async code.
pub struct Adb;

impl Adb {
    fn run(device: Option<&str>, args: &[&str]) -> Result<String, AdbError> {
        let mut command = Command::new("adb");
        if let Some(serial) = device {
            command.args(["-s", serial]);
        }
        debug!(?device, ?args, "running adb");
        let output = command.args(args).output()?;

        if !output.status.success() {
            return Err(AdbError::CommandFailed(format!(
                "{}{}",
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Lists attached devices and emulators.
    ///
    /// # Errors
    ///
    /// - [`AdbError::Io`] if adb cannot be executed
    /// - [`AdbError::CommandFailed`] if adb returns a non-zero exit code
    pub fn list_devices() -> Result<Vec<AndroidDevice>, AdbError> {
        let output = Self::run(None, &["devices"])?;
        Ok(Self::parse_device_list(&output))
    }

    /// Serial of the first listed device.
    pub fn first_device() -> Result<String, AdbError> {
        Self::list_devices()?
            .into_iter()
            .next()
            .map(|d| d.serial)
            .ok_or(AdbError::NoDevice)
    }

    /// Reads `settings get global wifi_on`.
    ///
    /// Returns `Some(true)` for `1`, `Some(false)` for `0` and `None` for
    /// anything else.
    pub fn wifi_state(device: Option<&str>) -> Result<Option<bool>, AdbError> {
        let output = Self::run(device, &["shell", "settings", "get", "global", "wifi_on"])?;
        Ok(Self::parse_wifi_state(&output))
    }

    /// Enables or disables wifi with `svc wifi`.
    pub fn set_wifi(device: Option<&str>, enable: bool) -> Result<(), AdbError> {
        let verb = if enable { "enable" } else { "disable" };
        Self::run(device, &["shell", "svc", "wifi", verb])?;
        Ok(())
    }

    pub fn open_wifi_settings(device: Option<&str>) -> Result<(), AdbError> {
        Self::run(
            device,
            &["shell", "am", "start", "-a", "android.settings.WIFI_SETTINGS"],
        )?;
        Ok(())
    }

    /// Sends an emulator console fingerprint touch.
    ///
    /// Only emulators accept `emu` commands; physical devices fail with
    /// [`AdbError::CommandFailed`].
    pub fn finger_touch(device: &str, finger_id: u32) -> Result<(), AdbError> {
        let finger = finger_id.to_string();
        Self::run(Some(device), &["emu", "finger", "touch", &finger])?;
        Ok(())
    }

    /// Parses `adb devices` output.
    ///
    /// This method is exposed primarily for testing purposes. The header line
    /// and daemon notices are skipped; a line without a state is kept with an
    /// empty state.
    pub fn parse_device_list(output: &str) -> Vec<AndroidDevice> {
        output
            .lines()
            .map(str::trim)
            .filter(|line| {
                !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*')
            })
            .filter_map(|line| {
                let mut fields = line.split_whitespace();
                let serial = fields.next()?.to_string();
                let state = fields.next().unwrap_or_default().to_string();
                Some(AndroidDevice { serial, state })
            })
            .collect()
    }

    /// Interprets the `wifi_on` global setting.
    pub fn parse_wifi_state(output: &str) -> Option<bool> {
        match output.trim() {
            "1" => Some(true),
            "0" => Some(false),
            _ => None,
        }
    }
}
