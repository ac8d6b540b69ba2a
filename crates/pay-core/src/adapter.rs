//! # Payment Adapter Trait
//!
//! Strategy pattern over the three payment flows. The coordinator selects an
//! adapter by [`PaymentMethod`] and every adapter resolves to the same
//! [`PaymentOutcome`].
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PaymentAdapter (trait)                   │
//! │  ├── submit(ctx) -> PaymentOutcome                          │
//! │  ├── method()                                               │
//! │  └── settlement_currency()                                  │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!          ┌─────────────────┼─────────────────┐
//!          │                 │                 │
//!  ┌───────┴───────┐ ┌───────┴───────┐ ┌───────┴───────┐
//!  │  CardAdapter  │ │RedirectAdapter│ │  PushAdapter  │
//!  │ tokenize/conf │ │order/approve/ │ │ initiate/poll │
//!  │               │ │   capture     │ │               │
//!  └───────────────┘ └───────────────┘ └───────────────┘
//! ```

use crate::cancel::CancelToken;
use crate::money::Currency;
use crate::outcome::PaymentOutcome;
use crate::request::{PaymentMethod, PaymentRequest};
use crate::session::SessionHandle;
use async_trait::async_trait;
use chrono::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Signal from the provider-hosted approval UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalEvent {
    Approved { order_id: String },
    Cancelled,
    ProviderError { message: String },
}

/// Delegate entry points handed to the provider-hosted approval UI.
///
/// Only the first call is delivered; later calls return `false`.
#[derive(Debug, Clone)]
pub struct ApprovalDelegate {
    tx: Arc<Mutex<Option<oneshot::Sender<ApprovalEvent>>>>,
}

/// Adapter-side end of the approval channel
#[derive(Debug, Default)]
pub struct ApprovalInbox {
    rx: Option<oneshot::Receiver<ApprovalEvent>>,
}

impl ApprovalDelegate {
    pub fn channel() -> (ApprovalDelegate, ApprovalInbox) {
        let (tx, rx) = oneshot::channel();
        (
            ApprovalDelegate {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            ApprovalInbox { rx: Some(rx) },
        )
    }

    fn send(&self, event: ApprovalEvent) -> bool {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        match sender {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    pub fn on_approved(&self, order_id: impl Into<String>) -> bool {
        self.send(ApprovalEvent::Approved {
            order_id: order_id.into(),
        })
    }

    pub fn on_cancelled(&self) -> bool {
        self.send(ApprovalEvent::Cancelled)
    }

    pub fn on_provider_error(&self, message: impl Into<String>) -> bool {
        self.send(ApprovalEvent::ProviderError {
            message: message.into(),
        })
    }

    /// Whether an event has already been delivered
    pub fn is_spent(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

impl ApprovalInbox {
    pub fn empty() -> Self {
        Self { rx: None }
    }

    pub fn take(&mut self) -> Option<oneshot::Receiver<ApprovalEvent>> {
        self.rx.take()
    }
}

/// Everything an adapter needs for one session
#[derive(Debug)]
pub struct AdapterContext {
    /// Request as submitted (base currency)
    pub request: PaymentRequest,
    /// Session owned by this adapter run; carries the settled amount
    pub session: SessionHandle,
    pub cancel: CancelToken,
    /// Approval events (redirect flow only)
    pub approvals: ApprovalInbox,
}

/// Core trait for payment flow implementations.
#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// Currency the provider settles in, when it differs per provider
    fn settlement_currency(&self) -> Option<Currency> {
        None
    }

    /// Status probe budget recorded on the session (push only)
    fn max_attempts(&self) -> u32 {
        0
    }

    /// Lifetime recorded on the session, if the flow bounds it
    fn session_ttl(&self) -> Option<Duration> {
        None
    }

    /// Run the flow to a terminal outcome. Never panics on provider failure;
    /// every failure is folded into the outcome.
    async fn submit(&self, ctx: AdapterContext) -> PaymentOutcome;
}

/// Type alias for a boxed payment adapter (dynamic dispatch)
pub type BoxedPaymentAdapter = Arc<dyn PaymentAdapter>;

/// Adapter lookup by payment method
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<PaymentMethod, BoxedPaymentAdapter>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register an adapter, replacing any previous one for its method
    pub fn register(&mut self, adapter: BoxedPaymentAdapter) {
        self.adapters.insert(adapter.method(), adapter);
    }

    /// Register with builder pattern
    pub fn with_adapter(mut self, adapter: BoxedPaymentAdapter) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, method: PaymentMethod) -> Option<&BoxedPaymentAdapter> {
        self.adapters.get(&method)
    }

    /// List all registered methods
    pub fn methods(&self) -> Vec<PaymentMethod> {
        let mut methods: Vec<_> = self.adapters.keys().copied().collect();
        methods.sort_by_key(|m| m.as_str());
        methods
    }

    pub fn has_method(&self, method: PaymentMethod) -> bool {
        self.adapters.contains_key(&method)
    }
}
