//! # Payment Error Types
//!
//! Typed error handling for the checkout orchestration layer.
//! All fallible operations return `Result<T, PaymentError>`; every error
//! collapses onto one of the caller-visible [`ErrorKind`]s.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Caller-visible failure taxonomy carried by a failed `PaymentOutcome`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input, caught before any network call
    ValidationError,
    /// Network/connectivity failure on a single call
    TransportError,
    /// Provider explicitly rejected the payment
    Declined,
    /// The first backend call of a flow failed
    InitiationFailed,
    /// Authorization succeeded but capture did not
    CaptureFailed,
    /// Bounded polling exhausted without a terminal provider response
    Timeout,
    /// User abandoned the flow
    UserCancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "validation_error",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::Declined => "declined",
            ErrorKind::InitiationFailed => "initiation_failed",
            ErrorKind::CaptureFailed => "capture_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UserCancelled => "user_cancelled",
        }
    }

    /// `UserCancelled` is a normal termination, not an alarm.
    pub fn is_user_initiated(&self) -> bool {
        matches!(self, ErrorKind::UserCancelled)
    }

    /// Capture failures leave money possibly authorized; the user must be told.
    pub fn needs_user_resolution(&self) -> bool {
        matches!(self, ErrorKind::CaptureFailed)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error type for all checkout operations
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Phone number failed normalization
    #[error("Invalid phone number: {input}")]
    InvalidPhoneNumber { input: String },

    /// No conversion rate between the request currency and the settlement currency
    #[error("Unsupported currency conversion: {from} -> {to}")]
    UnsupportedCurrency { from: String, to: String },

    /// Card details incomplete or rejected by the card widget / provider validation
    #[error("Card validation failed: {0}")]
    CardValidation(String),

    /// Payment provider API error
    #[error("Provider error [{provider}]: {message}")]
    ProviderError { provider: String, message: String },

    /// Network/HTTP error communicating with backend or provider
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Payment was declined
    #[error("Payment declined: {reason}")]
    PaymentDeclined { reason: String },

    /// First backend call of a flow failed
    #[error("Payment initiation failed: {0}")]
    InitiationFailed(String),

    /// Capture of an approved order failed
    #[error("Capture failed for order {order_id}: {message}")]
    CaptureFailed { order_id: String, message: String },

    /// Polling window exhausted
    #[error("No terminal status after {attempts} attempts")]
    PollTimeout { attempts: u32 },

    /// User abandoned the flow
    #[error("Checkout cancelled by user")]
    Cancelled,

    /// A checkout is already running on this coordinator
    #[error("Checkout already in progress: {session_id}")]
    SessionInProgress { session_id: String },

    /// Session expired or not found
    #[error("Session not found or expired: {session_id}")]
    SessionNotFound { session_id: String },

    /// Session status transition would regress
    #[error("Invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl PaymentError {
    /// Map onto the caller-visible taxonomy.
    ///
    /// The taxonomy has no internal-fault kind. Malformed responses and
    /// faults inside this crate surface as `TransportError` (the payment
    /// did not go through for reasons the payer cannot fix); use
    /// [`PaymentError::is_internal`] to tell a bug from a network failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            PaymentError::Configuration(_)
            | PaymentError::InvalidRequest(_)
            | PaymentError::InvalidPhoneNumber { .. }
            | PaymentError::UnsupportedCurrency { .. }
            | PaymentError::CardValidation(_)
            | PaymentError::SessionInProgress { .. }
            | PaymentError::SessionNotFound { .. } => ErrorKind::ValidationError,
            PaymentError::NetworkError(_)
            | PaymentError::ProviderError { .. }
            | PaymentError::InvalidTransition { .. }
            | PaymentError::Internal(_)
            | PaymentError::Serialization(_) => ErrorKind::TransportError,
            PaymentError::PaymentDeclined { .. } => ErrorKind::Declined,
            PaymentError::InitiationFailed(_) => ErrorKind::InitiationFailed,
            PaymentError::CaptureFailed { .. } => ErrorKind::CaptureFailed,
            PaymentError::PollTimeout { .. } => ErrorKind::Timeout,
            PaymentError::Cancelled => ErrorKind::UserCancelled,
        }
    }

    /// A fault in this crate rather than in the payer's input or the network
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            PaymentError::InvalidTransition { .. } | PaymentError::Internal(_)
        )
    }

    /// Returns true if the failure is transient. Only the status poller acts
    /// on this; card and redirect flows never retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PaymentError::NetworkError(_) | PaymentError::ProviderError { .. }
        )
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::Configuration(_) => 500,
            PaymentError::InvalidRequest(_) => 400,
            PaymentError::InvalidPhoneNumber { .. } => 400,
            PaymentError::UnsupportedCurrency { .. } => 400,
            PaymentError::CardValidation(_) => 400,
            PaymentError::ProviderError { .. } => 502,
            PaymentError::NetworkError(_) => 503,
            PaymentError::PaymentDeclined { .. } => 402,
            PaymentError::InitiationFailed(_) => 502,
            PaymentError::CaptureFailed { .. } => 502,
            PaymentError::PollTimeout { .. } => 504,
            PaymentError::Cancelled => 409,
            PaymentError::SessionInProgress { .. } => 409,
            PaymentError::SessionNotFound { .. } => 404,
            PaymentError::InvalidTransition { .. } => 500,
            PaymentError::Internal(_) => 500,
            PaymentError::Serialization(_) => 500,
        }
    }
}

/// Result type alias for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;
