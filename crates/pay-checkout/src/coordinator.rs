//! # Checkout Coordinator
//!
//! Single entry point for a checkout instance. Picks the adapter for the
//! requested method, settles the amount into the provider's currency once,
//! owns the one active session, and relays exactly one outcome.

use crate::card::{CardAdapter, ForwardedCardToken};
use crate::config::CheckoutSettings;
use crate::push::PushAdapter;
use crate::redirect::RedirectAdapter;
use pay_core::{
    outcome_channel, AdapterContext, AdapterRegistry, ApprovalDelegate, ApprovalInbox,
    CancelToken, CardConfirmer, CheckoutFailure, CheckoutObserver, ConversionTable,
    OutcomeReceiver, PaymentBackend, PaymentError, PaymentMethod, PaymentOutcome,
    PaymentReceipt, PaymentRequest, PaymentResult, PaymentSession, SessionHandle,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

struct ActiveCheckout {
    session: SessionHandle,
    cancel: CancelToken,
    task: JoinHandle<()>,
}

impl ActiveCheckout {
    fn is_live(&self) -> bool {
        !self.task.is_finished() && !self.session.status().is_terminal()
    }
}

type ActiveSlot = Arc<Mutex<Option<ActiveCheckout>>>;

fn lock_slot(slot: &ActiveSlot) -> MutexGuard<'_, Option<ActiveCheckout>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Registry with all three adapters wired to the given clients
pub fn standard_registry(
    backend: Arc<dyn PaymentBackend>,
    confirmer: Arc<dyn CardConfirmer>,
    settings: &CheckoutSettings,
) -> AdapterRegistry {
    AdapterRegistry::new()
        .with_adapter(Arc::new(CardAdapter::new(
            backend.clone(),
            Arc::new(ForwardedCardToken),
            confirmer,
        )))
        .with_adapter(Arc::new(RedirectAdapter::new(backend.clone())))
        .with_adapter(Arc::new(
            PushAdapter::new(backend)
                .with_poll_config(settings.poll.clone())
                .with_phone_rules(settings.phone.clone())
                .with_settlement_currency(settings.push.settlement_currency),
        ))
}

/// Orchestrates one checkout at a time over the registered adapters
pub struct CheckoutCoordinator {
    registry: AdapterRegistry,
    rates: ConversionTable,
    session_ttl: chrono::Duration,
    active: ActiveSlot,
}

impl CheckoutCoordinator {
    pub fn new(registry: AdapterRegistry, rates: ConversionTable) -> Self {
        Self {
            registry,
            rates,
            session_ttl: chrono::Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Builder: lifetime recorded on sessions whose adapter does not bound it
    pub fn with_session_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn from_settings(registry: AdapterRegistry, settings: &CheckoutSettings) -> Self {
        Self::new(registry, settings.conversion_table()).with_session_ttl(settings.session.ttl())
    }

    pub fn registry(&self) -> &AdapterRegistry {
        &self.registry
    }

    /// Start a checkout.
    ///
    /// Fails before any session exists when the request is invalid, no
    /// adapter serves the method, the amount cannot be converted, or another
    /// session is still unresolved. Everything after that is reported through
    /// the handle's single outcome.
    pub fn checkout(&self, request: PaymentRequest) -> PaymentResult<CheckoutHandle> {
        let runtime = Handle::try_current().map_err(|_| {
            PaymentError::Configuration("checkout requires a tokio runtime".to_string())
        })?;

        request.validate()?;

        let adapter = self.registry.get(request.method).cloned().ok_or_else(|| {
            PaymentError::InvalidRequest(format!(
                "no adapter registered for method {}",
                request.method
            ))
        })?;

        let settled = match adapter.settlement_currency() {
            Some(currency) => self.rates.convert(&request.amount, currency)?,
            None => request.amount,
        };

        let mut slot = lock_slot(&self.active);
        if let Some(active) = slot.as_ref().filter(|active| active.is_live()) {
            let session_id = active.session.session_id();
            warn!(session_id = %session_id, "rejecting checkout while a session is unresolved");
            return Err(PaymentError::SessionInProgress { session_id });
        }

        let ttl = adapter.session_ttl().unwrap_or(self.session_ttl);
        let session = SessionHandle::new(PaymentSession::new(
            request.method,
            settled,
            adapter.max_attempts(),
            ttl,
        ));
        let session_id = session.session_id();
        let cancel = CancelToken::new();

        let (approval, approvals) = if request.method == PaymentMethod::Redirect {
            let (delegate, inbox) = ApprovalDelegate::channel();
            (Some(delegate), inbox)
        } else {
            (None, ApprovalInbox::empty())
        };

        info!(
            session_id = %session_id,
            method = %request.method,
            subject_id = %request.subject_id,
            amount = %request.amount.display(),
            settled = %settled.display(),
            "starting checkout"
        );

        let (tx, rx) = outcome_channel();
        let ctx = AdapterContext {
            request,
            session: session.clone(),
            cancel: cancel.clone(),
            approvals,
        };

        let active_slot = self.active.clone();
        let task_session_id = session_id.clone();
        let task = runtime.spawn(async move {
            let outcome = adapter.submit(ctx).await;

            {
                let mut slot = lock_slot(&active_slot);
                let owns_slot = slot
                    .as_ref()
                    .is_some_and(|active| active.session.session_id() == task_session_id);
                if owns_slot {
                    *slot = None;
                }
            }

            if !tx.deliver(outcome) {
                debug!(session_id = %task_session_id, "caller dropped the checkout handle before the outcome");
            }
        });

        *slot = Some(ActiveCheckout {
            session: session.clone(),
            cancel: cancel.clone(),
            task,
        });

        Ok(CheckoutHandle {
            session,
            guard: CancelOnDrop::new(cancel),
            approval,
            outcome: rx,
        })
    }

    /// Cancel the active session, if any. Safe to call at any time.
    pub fn cancel(&self) -> bool {
        match lock_slot(&self.active).as_ref() {
            Some(active) if active.is_live() => {
                active.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// Snapshot of the unresolved session, if any
    pub fn active_session(&self) -> Option<PaymentSession> {
        lock_slot(&self.active)
            .as_ref()
            .filter(|active| active.is_live())
            .map(|active| active.session.snapshot())
    }
}

/// Cancels the session when the caller disposes of it before the outcome
#[derive(Debug)]
struct CancelOnDrop {
    token: CancelToken,
    armed: bool,
}

impl CancelOnDrop {
    fn new(token: CancelToken) -> Self {
        Self { token, armed: true }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.armed {
            self.token.cancel();
        }
    }
}

/// Caller's side of one checkout.
///
/// Dropping the handle, or the future returned by [`CheckoutHandle::outcome`],
/// before the outcome arrives cancels the session.
#[derive(Debug)]
pub struct CheckoutHandle {
    session: SessionHandle,
    guard: CancelOnDrop,
    approval: Option<ApprovalDelegate>,
    outcome: OutcomeReceiver,
}

impl CheckoutHandle {
    pub fn session_id(&self) -> String {
        self.session.session_id()
    }

    pub fn method(&self) -> PaymentMethod {
        self.session.snapshot().method
    }

    pub fn snapshot(&self) -> PaymentSession {
        self.session.snapshot()
    }

    /// Read-only view of the session that outlives the handle
    pub fn session(&self) -> SessionHandle {
        self.session.clone()
    }

    /// Delegate for the provider-hosted approval UI (redirect only)
    pub fn approval(&self) -> Option<ApprovalDelegate> {
        self.approval.clone()
    }

    /// Request cancellation. Idempotent; a no-op once the session resolved.
    pub fn cancel(&self) {
        self.guard.token.cancel();
    }

    /// Cancellation signal usable after the handle is consumed
    pub fn canceller(&self) -> CancelToken {
        self.guard.token.clone()
    }

    /// Wait for the single outcome
    pub async fn outcome(self) -> PaymentOutcome {
        let CheckoutHandle {
            mut guard,
            approval,
            outcome,
            ..
        } = self;
        // Keep the delegate alive until resolution so a caller who only
        // awaits does not read as an abandoned approval.
        let outcome = outcome.recv().await;
        guard.disarm();
        drop(approval);
        outcome
    }

    pub async fn into_result(self) -> Result<PaymentReceipt, CheckoutFailure> {
        self.outcome().await.into_result()
    }

    /// Callback form: exactly one of `on_success` / `on_error` is called
    pub async fn settle(self, observer: &dyn CheckoutObserver) -> PaymentOutcome {
        let outcome = self.outcome().await;
        match &outcome {
            PaymentOutcome::Succeeded(receipt) => observer.on_success(receipt),
            PaymentOutcome::Failed(failure) => observer.on_error(failure),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{ConfirmBehavior, MockBackend, MockCardConfirmer, PushProbe};
    use pay_core::{Currency, ErrorKind, PayerDetails, PollerConfig, Price, SessionStatus};
    use std::time::Duration;

    struct Fixture {
        backend: Arc<MockBackend>,
        confirmer: Arc<MockCardConfirmer>,
        coordinator: CheckoutCoordinator,
    }

    fn fixture(backend: MockBackend, confirm: ConfirmBehavior) -> Fixture {
        let backend = Arc::new(backend);
        let confirmer = Arc::new(MockCardConfirmer::new(confirm));

        let settings = CheckoutSettings {
            poll: PollerConfig::new(Duration::from_millis(100), 5),
            ..CheckoutSettings::default()
        };
        let registry = standard_registry(backend.clone(), confirmer.clone(), &settings);

        Fixture {
            backend,
            confirmer,
            coordinator: CheckoutCoordinator::from_settings(registry, &settings),
        }
    }

    fn request(method: PaymentMethod, payer: PayerDetails) -> PaymentRequest {
        PaymentRequest::new(method, Price::new(19.00, Currency::USD), "plan_pro", "Pro plan")
            .with_payer(payer)
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl CheckoutObserver for Recorder {
        fn on_success(&self, receipt: &PaymentReceipt) {
            self.calls.lock().unwrap().push(format!("success:{}", receipt.method));
        }

        fn on_error(&self, failure: &CheckoutFailure) {
            self.calls.lock().unwrap().push(format!("error:{}", failure.reason));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_amount_is_converted_once() {
        let fx = fixture(
            MockBackend::new().with_push_script([], PushProbe::Completed),
            ConfirmBehavior::Succeed,
        );

        let handle = fx
            .coordinator
            .checkout(request(PaymentMethod::Push, PayerDetails::new().with_phone("0712345678")))
            .unwrap();
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.settled_amount, Price::new(2470.0, Currency::KES));
        assert_eq!(snapshot.max_attempts, 5);

        assert!(handle.outcome().await.is_ok());

        let initiated = fx.backend.initiate_calls();
        assert_eq!(initiated.len(), 1);
        assert_eq!(initiated[0].amount, 2470.0);
        assert_eq!(initiated[0].currency, Currency::KES);
    }

    #[tokio::test]
    async fn test_card_is_not_converted() {
        let fx = fixture(MockBackend::new(), ConfirmBehavior::Succeed);

        let handle = fx
            .coordinator
            .checkout(request(PaymentMethod::Card, PayerDetails::new().with_card_token("pm_card_visa")))
            .unwrap();
        assert_eq!(handle.snapshot().settled_amount.currency, Currency::USD);
        assert_eq!(handle.snapshot().max_attempts, 0);

        let receipt = handle.into_result().await.unwrap();
        assert_eq!(receipt.method, PaymentMethod::Card);
    }

    #[tokio::test]
    async fn test_card_decline_notifies_observer_once() {
        let fx = fixture(MockBackend::new(), ConfirmBehavior::Decline("card_declined".into()));
        let recorder = Recorder::default();

        let outcome = fx
            .coordinator
            .checkout(request(PaymentMethod::Card, PayerDetails::new().with_card_token("pm_x")))
            .unwrap()
            .settle(&recorder)
            .await;

        assert_eq!(outcome.reason(), Some(ErrorKind::Declined));
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["error:declined".to_string()]);
        assert_eq!(fx.confirmer.calls(), 1);

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["reason"], "declined");
    }

    #[tokio::test]
    async fn test_second_checkout_rejected_while_active() {
        let fx = fixture(MockBackend::new(), ConfirmBehavior::Succeed);

        let first = fx
            .coordinator
            .checkout(request(PaymentMethod::Redirect, PayerDetails::new()))
            .unwrap();

        let err = fx
            .coordinator
            .checkout(request(PaymentMethod::Card, PayerDetails::new().with_card_token("pm_x")))
            .unwrap_err();
        assert!(matches!(err, PaymentError::SessionInProgress { ref session_id } if *session_id == first.session_id()));
        assert_eq!(err.kind(), ErrorKind::ValidationError);
        assert_eq!(
            fx.coordinator.active_session().map(|s| s.session_id),
            Some(first.session_id())
        );

        // Once the first resolves, a new checkout is accepted.
        first.cancel();
        assert_eq!(first.outcome().await.reason(), Some(ErrorKind::UserCancelled));
        assert!(fx.coordinator.active_session().is_none());

        let second = fx
            .coordinator
            .checkout(request(PaymentMethod::Card, PayerDetails::new().with_card_token("pm_x")))
            .unwrap();
        assert!(second.outcome().await.is_ok());

        // The first session was cancelled before it created an order.
        let initiated = fx.backend.initiate_calls();
        assert_eq!(initiated.len(), 1);
        assert!(initiated
            .iter()
            .all(|call| call.method == PaymentMethod::Card.provider_name()));
    }

    #[tokio::test]
    async fn test_redirect_through_handle() {
        let fx = fixture(MockBackend::new(), ConfirmBehavior::Succeed);

        let handle = fx
            .coordinator
            .checkout(request(PaymentMethod::Redirect, PayerDetails::new()))
            .unwrap();
        let delegate = handle.approval().unwrap();
        let session = handle.session();

        while session.status() != SessionStatus::AwaitingUserAction {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let order_id = session.external_ref().unwrap();
        assert!(delegate.on_approved(order_id.clone()));

        let receipt = handle.into_result().await.unwrap();
        assert_eq!(receipt.external_ref, Some(order_id));
        assert_eq!(fx.backend.captures(), 1);
    }

    #[tokio::test]
    async fn test_redirect_cancel_before_approval_never_captures() {
        let fx = fixture(MockBackend::new(), ConfirmBehavior::Succeed);

        let handle = fx
            .coordinator
            .checkout(request(PaymentMethod::Redirect, PayerDetails::new()))
            .unwrap();
        handle.approval().unwrap().on_cancelled();

        let outcome = handle.outcome().await;
        assert_eq!(outcome.reason(), Some(ErrorKind::UserCancelled));
        assert_eq!(fx.backend.captures(), 0);
    }

    #[tokio::test]
    async fn test_pre_session_errors() {
        let fx = fixture(MockBackend::new(), ConfirmBehavior::Succeed);

        let bad_amount = PaymentRequest::new(
            PaymentMethod::Card,
            Price::from_cents(0, Currency::USD),
            "plan_pro",
            "Pro",
        );
        assert_eq!(
            fx.coordinator.checkout(bad_amount).unwrap_err().kind(),
            ErrorKind::ValidationError
        );

        let unconvertible = PaymentRequest::new(
            PaymentMethod::Push,
            Price::new(19.0, Currency::GBP),
            "plan_pro",
            "Pro",
        );
        assert!(matches!(
            fx.coordinator.checkout(unconvertible).unwrap_err(),
            PaymentError::UnsupportedCurrency { .. }
        ));

        let empty = CheckoutCoordinator::new(AdapterRegistry::new(), ConversionTable::new());
        assert!(empty
            .checkout(request(PaymentMethod::Card, PayerDetails::new()))
            .is_err());

        assert!(fx.coordinator.active_session().is_none());
        assert!(fx.backend.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_coordinator_cancel_stops_push_polling() {
        let fx = fixture(MockBackend::new(), ConfirmBehavior::Succeed);

        let handle = fx
            .coordinator
            .checkout(request(PaymentMethod::Push, PayerDetails::new().with_phone("0712345678")))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(fx.coordinator.cancel());

        let outcome = handle.outcome().await;
        assert_eq!(outcome.reason(), Some(ErrorKind::UserCancelled));
        assert_eq!(fx.backend.status_probes(), 2);

        // Nothing left to cancel.
        assert!(!fx.coordinator.cancel());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_handle_stops_push_polling() {
        let fx = fixture(MockBackend::new(), ConfirmBehavior::Succeed);

        let handle = fx
            .coordinator
            .checkout(request(PaymentMethod::Push, PayerDetails::new().with_phone("0712345678")))
            .unwrap();
        let session = handle.session();

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(fx.backend.status_probes(), 1);
        drop(handle);

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(fx.backend.status_probes(), 1);
        assert_eq!(session.status(), SessionStatus::Cancelled);
        assert!(fx.coordinator.active_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_outcome_future_cancels() {
        let fx = fixture(MockBackend::new(), ConfirmBehavior::Succeed);

        let handle = fx
            .coordinator
            .checkout(request(PaymentMethod::Push, PayerDetails::new().with_phone("0712345678")))
            .unwrap();
        let session = handle.session();

        let waited = tokio::time::timeout(Duration::from_millis(150), handle.outcome()).await;
        assert!(waited.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(fx.backend.status_probes(), 1);
        assert_eq!(session.status(), SessionStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_redirect_capture_failure_reaches_caller() {
        let fx = fixture(
            MockBackend::new().failing_capture("ORDER_NOT_APPROVED"),
            ConfirmBehavior::Succeed,
        );
        let recorder = Recorder::default();

        let handle = fx
            .coordinator
            .checkout(request(PaymentMethod::Redirect, PayerDetails::new()))
            .unwrap();
        let delegate = handle.approval().unwrap();
        let session = handle.session();

        while session.status() != SessionStatus::AwaitingUserAction {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(delegate.on_approved(session.external_ref().unwrap()));

        let outcome = handle.settle(&recorder).await;
        assert_eq!(outcome.reason(), Some(ErrorKind::CaptureFailed));
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["error:capture_failed".to_string()]);
        assert_eq!(session.status(), SessionStatus::Failed);
        assert_eq!(fx.backend.captures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_timeout_through_coordinator() {
        let fx = fixture(MockBackend::new(), ConfirmBehavior::Succeed);

        let handle = fx
            .coordinator
            .checkout(request(PaymentMethod::Push, PayerDetails::new().with_phone("+254 712 345 678")))
            .unwrap();
        let session = handle.session();

        assert_eq!(handle.outcome().await.reason(), Some(ErrorKind::Timeout));
        assert_eq!(session.snapshot().attempts, 5);
        assert_eq!(session.status(), SessionStatus::TimedOut);
        assert_eq!(fx.backend.status_probes(), 5);
    }

    #[test]
    fn test_checkout_outside_runtime() {
        let fx = fixture(MockBackend::new(), ConfirmBehavior::Succeed);
        let err = fx
            .coordinator
            .checkout(request(PaymentMethod::Card, PayerDetails::new().with_card_token("pm_x")))
            .unwrap_err();
        assert!(matches!(err, PaymentError::Configuration(_)));
    }
}
