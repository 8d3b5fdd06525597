//! Error types for the swarm node

use std::time::Duration;

use thiserror::Error;

/// Error classes, each with its own handling policy
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    /// Local misconfiguration. Propagated, never retried.
    Routing,
    /// Malformed input. Logged and dropped.
    Protocol,
    /// Well-formed but rejected message. Logged and dropped.
    Store,
    /// Timeouts and socket trouble. Retried with a bound.
    Transport,
    /// Content-store classification of a hash.
    Content,
    /// Anything else. Crashes the worker, which is then restarted.
    Fatal,
}

/// Core swarm errors
#[derive(Error, Debug)]
pub enum HiveError {
    // Routing errors
    #[error("No route to {0}")]
    NoRoute(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    // Protocol errors
    #[error("Could not interpret message: {0}")]
    CouldNotInterpret(String),

    #[error("Could not read envelope: {0}")]
    CouldNotReadEnvelope(String),

    #[error("Invalid peer id: {0}")]
    InvalidPeerId(String),

    // Store errors
    #[error("Process failure: {0}")]
    ProcessFailure(String),

    #[error("Invalid signature")]
    InvalidSignature,

    // Transport errors
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Address in use: {0}")]
    AddressInUse(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Mailbox closed: {0}")]
    MailboxClosed(String),

    // Content errors
    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("Unexpected format: {0}")]
    UnexpectedFormat(String),

    #[error("Could not pin {0}")]
    CouldNotPin(String),

    // Environment errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl HiveError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HiveError::NoRoute(_) | HiveError::InvalidAddress(_) => ErrorClass::Routing,
            HiveError::CouldNotInterpret(_)
            | HiveError::CouldNotReadEnvelope(_)
            | HiveError::InvalidPeerId(_) => ErrorClass::Protocol,
            HiveError::ProcessFailure(_) | HiveError::InvalidSignature => ErrorClass::Store,
            HiveError::Timeout(_)
            | HiveError::AddressInUse(_)
            | HiveError::TransportError(_) => ErrorClass::Transport,
            HiveError::InvalidHash(_)
            | HiveError::UnexpectedFormat(_)
            | HiveError::CouldNotPin(_) => ErrorClass::Content,
            HiveError::MailboxClosed(_) | HiveError::Io(_) | HiveError::Config(_) => {
                ErrorClass::Fatal
            }
        }
    }
}

/// Result type for swarm operations
pub type HiveResult<T> = Result<T, HiveError>;
