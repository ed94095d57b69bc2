#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Error kinds surfaced by form grading and the action pipeline.

use thiserror::Error;

/// Errors raised while building, grading, or running grading actions.
///
/// Every variant except [`GraderError::Action`] is fatal to the request. An
/// `Action` error is a failure local to one grading action and is contained
/// by the pipeline.
#[derive(Debug, Error)]
pub enum GraderError {
    /// Malformed schema or action configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The submitted sample manifest failed verification.
    #[error("Permission denied: {0}")]
    Permission(String),
    /// A verified sample could not be applied to the schema.
    #[error("Invalid sample: {0}")]
    Validation(String),
    /// An external checker that must always exit cleanly did not.
    #[error("External checker failure: {0}")]
    HardExternal(String),
    /// Any other failure while running a single action.
    #[error(transparent)]
    Action(#[from] anyhow::Error),
}

impl GraderError {
    /// Shorthand for a [`GraderError::Configuration`].
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Returns true when the error must abort the whole request instead of
    /// being contained to a single action.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Action(_))
    }
}

impl From<serde_json::Error> for GraderError {
    fn from(err: serde_json::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = GraderError> = std::result::Result<T, E>;
