use thiserror::Error;

use crate::driver::DriverError;

/// Errors raised by the locator engine and action executor.
#[derive(Error, Debug)]
pub enum Error {
    /// No locator in a chain matched within the time budget.
    #[error("No element matched {locator} within {waited_ms}ms")]
    NotFound { locator: String, waited_ms: u64 },

    /// A chain or selector list with nothing in it.
    #[error("No locators provided")]
    EmptyChain,

    /// Both the primary technique and its fallback were refused.
    #[error("{action} rejected: {reason}")]
    ActionRejected { action: &'static str, reason: String },

    /// A transport failure that is not a miss or a rejection.
    #[error(transparent)]
    Driver(#[from] DriverError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
