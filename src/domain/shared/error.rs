//! Domain errors

use thiserror::Error;

/// Domain result type
pub type Result<T> = std::result::Result<T, DomainError>;

#[derive(Error, Debug, Clone)]
pub enum DomainError {
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// A received message failed to parse or was missing a mandatory header.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Transport-level failure (socket error, send failure).
    #[error("Transport error: {0}")]
    Transport(String),

    /// A transaction's retransmission schedule was exhausted with no response.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A request requires a digest challenge (401/407) before it can proceed.
    #[error("Authentication challenge required: {0}")]
    AuthChallenge(String),
}

impl From<crate::infrastructure::protocols::sip::message::SipError> for DomainError {
    fn from(err: crate::infrastructure::protocols::sip::message::SipError) -> Self {
        use crate::infrastructure::protocols::sip::message::SipError;
        match err {
            SipError::ParseError(msg) | SipError::InvalidMessage(msg) => {
                DomainError::MalformedMessage(msg)
            }
            SipError::TransportError(msg) => DomainError::Transport(msg),
            SipError::TransactionError(msg) => DomainError::Timeout(msg),
            SipError::Authentication(msg) => DomainError::AuthChallenge(msg),
            SipError::Internal(msg) => DomainError::Internal(msg),
        }
    }
}
