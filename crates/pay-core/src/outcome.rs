//! # Payment Outcomes
//!
//! The single terminal result of a checkout session, and the one-shot
//! channel that carries it to the caller.

use crate::error::{ErrorKind, PaymentError};
use crate::request::PaymentMethod;
use serde::{Serialize, Serializer};
use tokio::sync::oneshot;
use tracing::error;

/// Successful payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    pub payment_id: String,
    pub method: PaymentMethod,
    pub external_ref: Option<String>,
}

/// Failed, declined, timed out or abandoned payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutFailure {
    pub reason: ErrorKind,
    pub message: String,
}

impl std::fmt::Display for CheckoutFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.reason, self.message)
    }
}

impl std::error::Error for CheckoutFailure {}

/// Terminal result delivered exactly once per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded(PaymentReceipt),
    Failed(CheckoutFailure),
}

impl PaymentOutcome {
    pub fn success(
        payment_id: impl Into<String>,
        method: PaymentMethod,
        external_ref: Option<String>,
    ) -> Self {
        PaymentOutcome::Succeeded(PaymentReceipt {
            payment_id: payment_id.into(),
            method,
            external_ref,
        })
    }

    pub fn failure(reason: ErrorKind, message: impl Into<String>) -> Self {
        PaymentOutcome::Failed(CheckoutFailure {
            reason,
            message: message.into(),
        })
    }

    pub fn cancelled() -> Self {
        Self::failure(ErrorKind::UserCancelled, "checkout cancelled by user")
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, PaymentOutcome::Succeeded(_))
    }

    /// Failure reason, `None` on success
    pub fn reason(&self) -> Option<ErrorKind> {
        match self {
            PaymentOutcome::Succeeded(_) => None,
            PaymentOutcome::Failed(failure) => Some(failure.reason),
        }
    }

    pub fn into_result(self) -> Result<PaymentReceipt, CheckoutFailure> {
        match self {
            PaymentOutcome::Succeeded(receipt) => Ok(receipt),
            PaymentOutcome::Failed(failure) => Err(failure),
        }
    }
}

impl From<PaymentError> for PaymentOutcome {
    fn from(err: PaymentError) -> Self {
        if err.is_internal() {
            error!(kind = %err.kind(), "internal fault ended checkout: {}", err);
        }
        PaymentOutcome::failure(err.kind(), err.to_string())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OutcomeWire<'a> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    payment_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external_ref: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl Serialize for PaymentOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            PaymentOutcome::Succeeded(receipt) => OutcomeWire {
                ok: true,
                payment_id: Some(&receipt.payment_id),
                method: Some(receipt.method),
                external_ref: receipt.external_ref.as_deref(),
                reason: None,
                message: None,
            },
            PaymentOutcome::Failed(failure) => OutcomeWire {
                ok: false,
                payment_id: None,
                method: None,
                external_ref: None,
                reason: Some(failure.reason),
                message: Some(&failure.message),
            },
        };
        wire.serialize(serializer)
    }
}

/// Callback-style consumer of an outcome. Exactly one method is called.
pub trait CheckoutObserver: Send + Sync {
    fn on_success(&self, receipt: &PaymentReceipt);

    fn on_error(&self, failure: &CheckoutFailure);
}

/// Sending half of the outcome channel. Consumed on delivery.
#[derive(Debug)]
pub struct OutcomeSender {
    tx: oneshot::Sender<PaymentOutcome>,
}

/// Receiving half of the outcome channel
#[derive(Debug)]
pub struct OutcomeReceiver {
    rx: oneshot::Receiver<PaymentOutcome>,
}

pub fn outcome_channel() -> (OutcomeSender, OutcomeReceiver) {
    let (tx, rx) = oneshot::channel();
    (OutcomeSender { tx }, OutcomeReceiver { rx })
}

impl OutcomeSender {
    /// Deliver the outcome. Returns false if the caller already went away.
    pub fn deliver(self, outcome: PaymentOutcome) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

impl OutcomeReceiver {
    /// Wait for the outcome. A sender dropped without delivering still
    /// yields a failure so the caller never sees zero outcomes.
    pub async fn recv(self) -> PaymentOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => PaymentOutcome::failure(
                ErrorKind::TransportError,
                "checkout ended without producing an outcome",
            ),
        }
    }
}
