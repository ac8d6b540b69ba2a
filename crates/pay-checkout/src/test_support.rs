use chrono::Duration;
use pay_core::{
    AdapterContext, ApprovalInbox, CancelToken, PaymentRequest, PaymentSession, Price,
    SessionHandle,
};

pub(crate) fn context(request: PaymentRequest, settled: Price, approvals: ApprovalInbox) -> AdapterContext {
    context_with_attempts(request, settled, 0, approvals)
}

pub(crate) fn context_with_attempts(
    request: PaymentRequest,
    settled: Price,
    max_attempts: u32,
    approvals: ApprovalInbox,
) -> AdapterContext {
    let session = PaymentSession::new(request.method, settled, max_attempts, Duration::minutes(30));
    AdapterContext {
        request,
        session: SessionHandle::new(session),
        cancel: CancelToken::new(),
        approvals,
    }
}
