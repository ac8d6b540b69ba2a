//! Shared adapter plumbing: terminal bookkeeping and outcome logging.

use pay_core::{ErrorKind, PaymentOutcome, SessionHandle, SessionStatus};
use tracing::{error, info, warn};

/// Terminal status recorded for an outcome
pub(crate) fn terminal_status(outcome: &PaymentOutcome) -> SessionStatus {
    match outcome.reason() {
        None => SessionStatus::Completed,
        Some(ErrorKind::Timeout) => SessionStatus::TimedOut,
        Some(ErrorKind::UserCancelled) => SessionStatus::Cancelled,
        Some(_) => SessionStatus::Failed,
    }
}

/// Record the terminal status on the session and log the outcome at the
/// severity its reason carries. Returns the outcome unchanged.
pub(crate) fn finish(session: &SessionHandle, outcome: PaymentOutcome) -> PaymentOutcome {
    session.advance(terminal_status(&outcome));

    let snapshot = session.snapshot();
    let session_id = snapshot.session_id.as_str();
    let method = snapshot.method.as_str();

    match &outcome {
        PaymentOutcome::Succeeded(receipt) => {
            info!(session_id, method, payment_id = %receipt.payment_id, "checkout completed");
        }
        PaymentOutcome::Failed(failure) if failure.reason.is_user_initiated() => {
            info!(session_id, method, "checkout cancelled by user");
        }
        PaymentOutcome::Failed(failure) if failure.reason.needs_user_resolution() => {
            error!(
                session_id,
                method,
                external_ref = snapshot.external_ref.as_deref().unwrap_or_default(),
                "capture failed after approval, payer must be told: {}",
                failure.message
            );
        }
        PaymentOutcome::Failed(failure) => match failure.reason {
            ErrorKind::TransportError | ErrorKind::InitiationFailed => {
                error!(session_id, method, reason = %failure.reason, "{}", failure.message);
            }
            _ => {
                warn!(session_id, method, reason = %failure.reason, "{}", failure.message);
            }
        },
    }

    outcome
}

/// Outcome for a run that observed cancellation before its next outbound call
pub(crate) fn cancelled(session: &SessionHandle) -> PaymentOutcome {
    info!(session_id = %session.session_id(), "cancellation observed, skipping remaining calls");
    PaymentOutcome::cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pay_core::{Currency, PaymentMethod, PaymentSession, Price};

    fn handle() -> SessionHandle {
        SessionHandle::new(PaymentSession::new(
            PaymentMethod::Card,
            Price::new(19.0, Currency::USD),
            0,
            Duration::minutes(30),
        ))
    }

    #[test]
    fn test_finish_records_terminal_status() {
        let session = handle();
        let outcome = finish(&session, PaymentOutcome::failure(ErrorKind::Timeout, "window elapsed"));
        assert_eq!(outcome.reason(), Some(ErrorKind::Timeout));
        assert_eq!(session.status(), SessionStatus::TimedOut);

        // A second terminal write is rejected.
        finish(&session, PaymentOutcome::cancelled());
        assert_eq!(session.status(), SessionStatus::TimedOut);
    }

    #[test]
    fn test_terminal_status_mapping() {
        let ok = PaymentOutcome::success("pay_1", PaymentMethod::Card, None);
        assert_eq!(terminal_status(&ok), SessionStatus::Completed);
        assert_eq!(terminal_status(&PaymentOutcome::cancelled()), SessionStatus::Cancelled);
        assert_eq!(
            terminal_status(&PaymentOutcome::failure(ErrorKind::Declined, "no")),
            SessionStatus::Failed
        );
    }
}
