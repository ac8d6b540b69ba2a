//! # Card Adapter
//!
//! Tokenize, initiate, confirm. One round trip with an immediate terminal
//! result and no retries.

use crate::card_confirm::intent_id_from_secret;
use crate::flow;
use async_trait::async_trait;
use pay_core::{
    AdapterContext, CardConfirmStatus, CardConfirmer, CardToken, CardTokenSource, ErrorKind,
    InitiateRequest, PaymentAdapter, PaymentBackend, PaymentError, PaymentMethod, PaymentOutcome,
    PaymentRequest, PaymentResult, SessionStatus,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Token source for the hosted card widget: the browser has already
/// produced the token and forwards it in `payer.card_token`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardedCardToken;

#[async_trait]
impl CardTokenSource for ForwardedCardToken {
    async fn create_token(&self, request: &PaymentRequest) -> PaymentResult<CardToken> {
        request
            .payer
            .card_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(|token| CardToken(token.to_string()))
            .ok_or_else(|| PaymentError::CardValidation("card details are incomplete".to_string()))
    }
}

pub struct CardAdapter {
    backend: Arc<dyn PaymentBackend>,
    tokens: Arc<dyn CardTokenSource>,
    confirmer: Arc<dyn CardConfirmer>,
}

impl CardAdapter {
    pub fn new(
        backend: Arc<dyn PaymentBackend>,
        tokens: Arc<dyn CardTokenSource>,
        confirmer: Arc<dyn CardConfirmer>,
    ) -> Self {
        Self {
            backend,
            tokens,
            confirmer,
        }
    }

    async fn run(&self, ctx: &AdapterContext) -> PaymentOutcome {
        let session = &ctx.session;

        session.advance(SessionStatus::Validating);
        if ctx.cancel.is_cancelled() {
            return flow::cancelled(session);
        }

        let token = match self.tokens.create_token(&ctx.request).await {
            Ok(token) => token,
            Err(e) => return e.into(),
        };

        if ctx.cancel.is_cancelled() {
            return flow::cancelled(session);
        }
        session.advance(SessionStatus::Initiating);

        let settled = session.snapshot().settled_amount;
        let body = InitiateRequest::from_request(&ctx.request, &settled);
        let initiated = match self.backend.initiate(&body).await {
            Ok(response) => response,
            Err(e) => return PaymentOutcome::failure(ErrorKind::InitiationFailed, e.to_string()),
        };

        let Some(client_secret) = initiated.client_secret else {
            return PaymentOutcome::failure(
                ErrorKind::InitiationFailed,
                "backend response carried no client secret",
            );
        };
        let intent_id = match intent_id_from_secret(&client_secret) {
            Ok(intent_id) => intent_id.to_string(),
            Err(e) => return e.into(),
        };
        session.set_external_ref(&intent_id);

        // Confirm is the commit point; nothing after it checks cancellation.
        if ctx.cancel.is_cancelled() {
            return flow::cancelled(session);
        }
        session.advance(SessionStatus::Confirming);
        debug!(intent_id = %intent_id, "confirming card payment");

        match self.confirmer.confirm(&client_secret, &token).await {
            Ok(confirmation) if confirmation.status == CardConfirmStatus::Succeeded => {
                let payment_id = initiated
                    .payment_id
                    .unwrap_or_else(|| confirmation.intent_id.clone());
                PaymentOutcome::success(payment_id, PaymentMethod::Card, Some(confirmation.intent_id))
            }
            Ok(confirmation) => {
                let detail = confirmation
                    .decline_code
                    .unwrap_or_else(|| format!("{:?}", confirmation.status));
                PaymentOutcome::failure(
                    ErrorKind::Declined,
                    format!("card payment not completed: {}", detail),
                )
            }
            Err(e) => e.into(),
        }
    }
}

#[async_trait]
impl PaymentAdapter for CardAdapter {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Card
    }

    #[instrument(skip(self, ctx), fields(session_id = %ctx.session.session_id(), subject_id = %ctx.request.subject_id))]
    async fn submit(&self, ctx: AdapterContext) -> PaymentOutcome {
        let outcome = self.run(&ctx).await;
        flow::finish(&ctx.session, outcome)
    }
}
