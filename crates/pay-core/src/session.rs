//! # Payment Sessions
//!
//! One session per in-flight checkout attempt. Status only moves forward;
//! `attempts` only moves for the push method and is capped.

use crate::error::{PaymentError, PaymentResult};
use crate::money::Price;
use crate::request::PaymentMethod;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::error;
use uuid::Uuid;

/// Status of a payment session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created, adapter not started
    Idle,
    /// Checking input locally
    Validating,
    /// First backend call in flight
    Initiating,
    /// Waiting on the user outside this process (hosted approval, phone prompt)
    AwaitingUserAction,
    /// Card confirm in flight
    Confirming,
    /// Redirect capture in flight
    Capturing,
    /// Push status polling running
    Polling,
    Completed,
    Failed,
    TimedOut,
    Cancelled,
}

impl SessionStatus {
    fn rank(&self) -> u8 {
        match self {
            SessionStatus::Idle => 0,
            SessionStatus::Validating => 1,
            SessionStatus::Initiating => 2,
            SessionStatus::AwaitingUserAction => 3,
            SessionStatus::Confirming | SessionStatus::Capturing | SessionStatus::Polling => 4,
            SessionStatus::Completed
            | SessionStatus::Failed
            | SessionStatus::TimedOut
            | SessionStatus::Cancelled => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() == 5
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Validating => "validating",
            SessionStatus::Initiating => "initiating",
            SessionStatus::AwaitingUserAction => "awaiting_user_action",
            SessionStatus::Confirming => "confirming",
            SessionStatus::Capturing => "capturing",
            SessionStatus::Polling => "polling",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::TimedOut => "timed_out",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Whether `next` is a forward move from `self`
    pub fn can_advance_to(&self, next: SessionStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Idle
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single checkout attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub session_id: String,

    pub method: PaymentMethod,

    #[serde(default)]
    pub status: SessionStatus,

    /// Provider order id / checkout request id / payment intent id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,

    /// Status probes issued (push only)
    pub attempts: u32,

    /// Upper bound for `attempts`; zero for methods that never poll
    pub max_attempts: u32,

    /// Amount actually submitted to the provider, after settlement conversion
    pub settled_amount: Price,

    pub created_at: DateTime<Utc>,

    pub expires_at: DateTime<Utc>,
}

impl PaymentSession {
    /// Create a new session in `Idle`
    pub fn new(
        method: PaymentMethod,
        settled_amount: Price,
        max_attempts: u32,
        ttl: Duration,
    ) -> Self {
        let created_at = Utc::now();
        Self {
            session_id: format!("cs_{}", Uuid::new_v4().simple()),
            method,
            status: SessionStatus::Idle,
            external_ref: None,
            attempts: 0,
            max_attempts: if method == PaymentMethod::Push {
                max_attempts
            } else {
                0
            },
            settled_amount,
            created_at,
            expires_at: created_at + ttl,
        }
    }

    /// Move to `next`; regressions are rejected and leave the session unchanged
    pub fn advance(&mut self, next: SessionStatus) -> PaymentResult<()> {
        if !self.status.can_advance_to(next) {
            return Err(PaymentError::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Count one status probe. Returns the new attempt number.
    pub fn record_attempt(&mut self) -> PaymentResult<u32> {
        if self.method != PaymentMethod::Push {
            return Err(PaymentError::Internal(format!(
                "attempts are only tracked for push sessions, not {}",
                self.method
            )));
        }
        if self.attempts >= self.max_attempts {
            return Err(PaymentError::PollTimeout {
                attempts: self.attempts,
            });
        }
        self.attempts += 1;
        Ok(self.attempts)
    }

    /// Check if session is still unresolved
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

/// Shared view of a session. Its owning adapter writes, everyone else reads snapshots.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<PaymentSession>>,
}

impl SessionHandle {
    pub fn new(session: PaymentSession) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PaymentSession> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> PaymentSession {
        self.lock().clone()
    }

    pub fn session_id(&self) -> String {
        self.lock().session_id.clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.lock().status
    }

    pub fn external_ref(&self) -> Option<String> {
        self.lock().external_ref.clone()
    }

    pub fn set_external_ref(&self, external_ref: impl Into<String>) {
        self.lock().external_ref = Some(external_ref.into());
    }

    /// Advance the status; a rejected regression is logged and ignored
    pub fn advance(&self, next: SessionStatus) -> bool {
        let mut session = self.lock();
        match session.advance(next) {
            Ok(()) => true,
            Err(e) => {
                error!(session_id = %session.session_id, "{}", e);
                false
            }
        }
    }

    pub fn record_attempt(&self) -> PaymentResult<u32> {
        self.lock().record_attempt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Currency;

    fn push_session() -> PaymentSession {
        PaymentSession::new(
            PaymentMethod::Push,
            Price::new(2470.0, Currency::KES),
            3,
            Duration::seconds(15),
        )
    }

    #[test]
    fn test_new_session_defaults() {
        let session = push_session();

        assert!(session.session_id.starts_with("cs_"));
        assert_eq!(session.status, SessionStatus::Idle);
        assert!(session.is_active());
        assert_eq!(session.expires_at - session.created_at, Duration::seconds(15));
    }

    #[test]
    fn test_status_is_monotonic() {
        let mut session = push_session();
        session.advance(SessionStatus::Validating).unwrap();
        session.advance(SessionStatus::Initiating).unwrap();
        session.advance(SessionStatus::Polling).unwrap();

        assert!(session.advance(SessionStatus::Initiating).is_err());
        assert!(session.advance(SessionStatus::Polling).is_err());
        assert_eq!(session.status, SessionStatus::Polling);

        session.advance(SessionStatus::Completed).unwrap();
        assert!(session.advance(SessionStatus::Failed).is_err());
        assert!(!session.is_active());
    }

    #[test]
    fn test_attempts_are_capped() {
        let mut session = push_session();
        assert_eq!(session.record_attempt().unwrap(), 1);
        assert_eq!(session.record_attempt().unwrap(), 2);
        assert_eq!(session.record_attempt().unwrap(), 3);
        assert!(session.record_attempt().is_err());
        assert_eq!(session.attempts, 3);
    }

    #[test]
    fn test_attempts_only_for_push() {
        let mut session = PaymentSession::new(
            PaymentMethod::Card,
            Price::new(19.0, Currency::USD),
            30,
            Duration::minutes(30),
        );
        assert_eq!(session.max_attempts, 0);
        assert!(session.record_attempt().is_err());
        assert_eq!(session.attempts, 0);
    }

    #[test]
    fn test_handle_ignores_regression() {
        let handle = SessionHandle::new(push_session());
        assert!(handle.advance(SessionStatus::Initiating));
        assert!(!handle.advance(SessionStatus::Validating));
        assert_eq!(handle.status(), SessionStatus::Initiating);

        handle.set_external_ref("ws_CO_123");
        assert_eq!(handle.snapshot().external_ref.as_deref(), Some("ws_CO_123"));
    }
}
