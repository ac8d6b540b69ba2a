//! # Push Adapter
//!
//! Mobile-money flow: normalize the phone number, trigger the push prompt,
//! then poll the backend until the payer acts or the window closes.
//!
//! ```text
//! idle ─▶ validating ─▶ initiating ─▶ awaiting_user_action ─▶ polling ─┬─▶ completed
//!            │              │                                          ├─▶ failed
//!            ▼              ▼                                          └─▶ timed_out
//!      ValidationError  InitiationFailed
//! ```

use crate::flow;
use async_trait::async_trait;
use pay_core::{
    AdapterContext, Currency, ErrorKind, InitiateRequest, PaymentAdapter, PaymentBackend,
    PaymentError, PaymentMethod, PaymentOutcome, PhoneRules, PollOutcome, PollerConfig,
    ProbeStatus, PushState, SessionStatus, StatusPoller,
};
use std::sync::Arc;
use tracing::{info, instrument};

/// Terminal provider answer seen by the poller
#[derive(Debug, Clone, PartialEq, Eq)]
enum PushResolution {
    Paid { payment_id: Option<String> },
    Rejected { message: Option<String> },
}

pub struct PushAdapter {
    backend: Arc<dyn PaymentBackend>,
    poll: PollerConfig,
    phone: PhoneRules,
    settlement_currency: Currency,
}

impl PushAdapter {
    pub fn new(backend: Arc<dyn PaymentBackend>) -> Self {
        Self {
            backend,
            poll: PollerConfig::default(),
            phone: PhoneRules::default(),
            settlement_currency: Currency::KES,
        }
    }

    pub fn with_poll_config(mut self, poll: PollerConfig) -> Self {
        self.poll = poll;
        self
    }

    pub fn with_phone_rules(mut self, phone: PhoneRules) -> Self {
        self.phone = phone;
        self
    }

    pub fn with_settlement_currency(mut self, currency: Currency) -> Self {
        self.settlement_currency = currency;
        self
    }

    async fn run(&self, ctx: &AdapterContext) -> PaymentOutcome {
        let session = &ctx.session;

        session.advance(SessionStatus::Validating);
        let raw_phone = ctx.request.payer.phone.as_deref().unwrap_or_default();
        let msisdn = match self.phone.normalize(raw_phone) {
            Ok(msisdn) => msisdn,
            Err(e) => return e.into(),
        };

        if ctx.cancel.is_cancelled() {
            return flow::cancelled(session);
        }
        session.advance(SessionStatus::Initiating);

        let settled = session.snapshot().settled_amount;
        let body = InitiateRequest::from_request(&ctx.request, &settled).with_phone_number(msisdn);
        let initiated = match self.backend.initiate(&body).await {
            Ok(response) => response,
            Err(e) => return PaymentOutcome::failure(ErrorKind::InitiationFailed, e.to_string()),
        };
        let Some(checkout_request_id) = initiated.checkout_request_id.filter(|id| !id.is_empty())
        else {
            return PaymentOutcome::failure(
                ErrorKind::InitiationFailed,
                "backend response carried no checkout request id",
            );
        };

        session.set_external_ref(checkout_request_id.clone());
        session.advance(SessionStatus::AwaitingUserAction);
        info!(
            checkout_request_id = %checkout_request_id,
            amount = %settled.display(),
            "push prompt sent, polling for confirmation"
        );

        let poller = StatusPoller::with_cancel(self.poll.clone(), ctx.cancel.clone());
        session.advance(SessionStatus::Polling);

        let backend = self.backend.clone();
        let probe_session = session.clone();
        let reference = checkout_request_id.clone();
        let polled = poller
            .run(move |_attempt| {
                let backend = backend.clone();
                let session = probe_session.clone();
                let reference = reference.clone();
                async move {
                    session.record_attempt()?;
                    let status = backend.push_status(&reference).await?;
                    Ok::<_, PaymentError>(match status.status {
                        PushState::Pending => ProbeStatus::Pending,
                        PushState::Completed => ProbeStatus::Done(PushResolution::Paid {
                            payment_id: status.payment_id,
                        }),
                        PushState::Failed => ProbeStatus::Done(PushResolution::Rejected {
                            message: status.message,
                        }),
                    })
                }
            })
            .await;

        match polled {
            PollOutcome::Done {
                value: PushResolution::Paid { payment_id },
                ..
            } => {
                let payment_id = payment_id
                    .or(initiated.payment_id)
                    .unwrap_or_else(|| checkout_request_id.clone());
                PaymentOutcome::success(payment_id, PaymentMethod::Push, Some(checkout_request_id))
            }
            PollOutcome::Done {
                value: PushResolution::Rejected { message },
                ..
            } => PaymentOutcome::failure(
                ErrorKind::Declined,
                message.unwrap_or_else(|| "payment was not approved on the phone".to_string()),
            ),
            PollOutcome::TimedOut { attempts } => PaymentError::PollTimeout { attempts }.into(),
            PollOutcome::Cancelled { .. } => PaymentOutcome::cancelled(),
        }
    }
}

#[async_trait]
impl PaymentAdapter for PushAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Push
    }

    fn settlement_currency(&self) -> Option<Currency> {
        Some(self.settlement_currency)
    }

    fn max_attempts(&self) -> u32 {
        self.poll.max_attempts
    }

    fn session_ttl(&self) -> Option<chrono::Duration> {
        chrono::Duration::from_std(self.poll.window()).ok()
    }

    #[instrument(skip(self, ctx), fields(session_id = %ctx.session.session_id(), subject_id = %ctx.request.subject_id))]
    async fn submit(&self, ctx: AdapterContext) -> PaymentOutcome {
        let outcome = self.run(&ctx).await;
        flow::finish(&ctx.session, outcome)
    }
}
