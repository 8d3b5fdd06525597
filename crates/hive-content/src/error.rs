//! Content-store errors

use std::time::Duration;

use hive_core::HiveError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    /// The string cannot name any object
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    /// The object exists but is not a file or directory
    #[error("Unexpected format for {0}")]
    UnexpectedFormat(String),

    /// The object is not available without a network lookup
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Could not pin {0}")]
    CouldNotPin(String),

    #[error("Could not connect to {0}")]
    Unreachable(String),

    #[error("Content store timed out after {0:?}")]
    Timeout(Duration),

    #[error("Content store unavailable: {0}")]
    Unavailable(String),
}

impl ContentError {
    /// The hash itself is bad and retrying it will never help
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ContentError::InvalidHash(_) | ContentError::UnexpectedFormat(_) | ContentError::NotFound(_)
        )
    }

    /// The store itself did not answer; the same call may succeed later
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ContentError::Timeout(_) | ContentError::Unavailable(_) | ContentError::Unreachable(_)
        )
    }
}

impl From<ContentError> for HiveError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::InvalidHash(h) | ContentError::NotFound(h) => HiveError::InvalidHash(h),
            ContentError::UnexpectedFormat(h) => HiveError::UnexpectedFormat(h),
            ContentError::CouldNotPin(h) => HiveError::CouldNotPin(h),
            ContentError::Timeout(d) => HiveError::Timeout(d),
            ContentError::Unreachable(a) => HiveError::TransportError(format!("unreachable: {a}")),
            ContentError::Unavailable(m) => HiveError::TransportError(m),
        }
    }
}
