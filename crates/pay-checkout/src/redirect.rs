//! # Redirect Adapter
//!
//! Two-phase flow: create an order, wait for the provider-hosted approval,
//! then capture.
//!
//! ```text
//!  create_order ──▶ awaiting approval ──on_approved──▶ capture ──▶ Succeeded
//!       │                 │ on_cancelled / cancel()           │
//!       ▼                 ▼ on_provider_error / expiry        ▼
//!  InitiationFailed   UserCancelled / Declined          CaptureFailed
//! ```
//!
//! Capture only ever runs from `on_approved` and is never retried. An
//! approval still pending when the session expires counts as abandoned.

use crate::flow;
use async_trait::async_trait;
use pay_core::{
    AdapterContext, ApprovalEvent, CaptureResponse, ErrorKind, InitiateRequest, PaymentAdapter,
    PaymentBackend, PaymentError, PaymentMethod, PaymentOutcome, PaymentRequest, PaymentResult,
    Price, SessionStatus,
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct RedirectAdapter {
    backend: Arc<dyn PaymentBackend>,
}

/// Order created in phase one
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub order_id: String,
    pub payment_id: Option<String>,
}

impl RedirectAdapter {
    pub fn new(backend: Arc<dyn PaymentBackend>) -> Self {
        Self { backend }
    }

    /// Phase one. Every failure here is terminal.
    pub async fn create_order(
        &self,
        request: &PaymentRequest,
        settled: &Price,
    ) -> PaymentResult<CreatedOrder> {
        let body = InitiateRequest::from_request(request, settled);
        let response = self
            .backend
            .initiate(&body)
            .await
            .map_err(|e| PaymentError::InitiationFailed(e.to_string()))?;

        match response.order_id {
            Some(order_id) if !order_id.is_empty() => Ok(CreatedOrder {
                order_id,
                payment_id: response.payment_id,
            }),
            _ => Err(PaymentError::InitiationFailed(
                "backend response carried no order id".to_string(),
            )),
        }
    }

    /// Phase three. Failures are `CaptureFailed` and never retried.
    pub async fn capture(
        &self,
        order_id: &str,
        idempotency_key: &str,
    ) -> PaymentResult<CaptureResponse> {
        let capture_key = format!("{}-capture", idempotency_key);
        self.backend
            .capture_order(order_id, &capture_key)
            .await
            .map_err(|e| PaymentError::CaptureFailed {
                order_id: order_id.to_string(),
                message: e.to_string(),
            })
    }

    async fn run(&self, ctx: &mut AdapterContext) -> PaymentOutcome {
        let session = ctx.session.clone();

        session.advance(SessionStatus::Validating);
        let Some(approvals) = ctx.approvals.take() else {
            return PaymentError::Internal("redirect session has no approval channel".to_string())
                .into();
        };
        if ctx.cancel.is_cancelled() {
            return flow::cancelled(&session);
        }

        session.advance(SessionStatus::Initiating);
        let settled = session.snapshot().settled_amount;
        let order = match self.create_order(&ctx.request, &settled).await {
            Ok(order) => order,
            Err(e) => return e.into(),
        };
        session.set_external_ref(order.order_id.clone());
        session.advance(SessionStatus::AwaitingUserAction);
        info!(order_id = %order.order_id, "waiting for hosted approval");

        let window = (session.snapshot().expires_at - chrono::Utc::now())
            .to_std()
            .unwrap_or_default();

        let event = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => None,
            event = approvals => event.ok(),
            _ = tokio::time::sleep(window) => {
                info!(order_id = %order.order_id, "approval window expired");
                return PaymentOutcome::failure(
                    ErrorKind::UserCancelled,
                    "approval window expired",
                );
            }
        };

        let approved_id = match event {
            Some(ApprovalEvent::Approved { order_id }) => order_id,
            Some(ApprovalEvent::Cancelled) => return PaymentOutcome::cancelled(),
            Some(ApprovalEvent::ProviderError { message }) => {
                warn!(order_id = %order.order_id, "hosted approval reported an error");
                return PaymentOutcome::failure(ErrorKind::Declined, message);
            }
            // Cancelled by the caller, or every delegate was dropped.
            None => return PaymentOutcome::cancelled(),
        };

        if approved_id != order.order_id {
            return PaymentOutcome::failure(
                ErrorKind::ValidationError,
                format!(
                    "approved order {} does not match session order {}",
                    approved_id, order.order_id
                ),
            );
        }

        if ctx.cancel.is_cancelled() {
            return flow::cancelled(&session);
        }
        session.advance(SessionStatus::Capturing);

        match self.capture(&order.order_id, &ctx.request.idempotency_key).await {
            Ok(captured) => {
                let payment_id = captured
                    .payment_id
                    .or(order.payment_id)
                    .unwrap_or_else(|| order.order_id.clone());
                PaymentOutcome::success(payment_id, PaymentMethod::Redirect, Some(order.order_id))
            }
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl PaymentAdapter for RedirectAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Redirect
    }

    #[instrument(skip(self, ctx), fields(session_id = %ctx.session.session_id(), subject_id = %ctx.request.subject_id))]
    async fn submit(&self, mut ctx: AdapterContext) -> PaymentOutcome {
        let outcome = self.run(&mut ctx).await;
        flow::finish(&ctx.session, outcome)
    }
}
