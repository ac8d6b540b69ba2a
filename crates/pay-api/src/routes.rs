//! # Routes
//!
//! Axum router configuration for the checkout API.

use crate::handlers;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Create the main application router
///
/// Routes:
/// - GET  /health
/// - POST /api/v1/checkout - Start a checkout
/// - GET  /api/v1/checkout/{session_id} - Session status and outcome
/// - POST /api/v1/checkout/{session_id}/approve - Hosted approval succeeded
/// - POST /api/v1/checkout/{session_id}/cancel - User abandoned checkout
/// - POST /api/v1/checkout/{session_id}/provider-error - Hosted approval failed
pub fn create_router(state: AppState) -> Router {
    // The browser widget calls the delegate routes directly.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let checkout_routes = Router::new()
        .route("/{session_id}", get(handlers::get_checkout))
        .route("/{session_id}/approve", post(handlers::approve_checkout))
        .route("/{session_id}/cancel", post(handlers::cancel_checkout))
        .route("/{session_id}/provider-error", post(handlers::provider_error));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .route("/api/v1/checkout", post(handlers::create_checkout))
        .nest("/api/v1/checkout", checkout_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{AppConfig, ProviderMode};
    use axum::http::StatusCode;
    use axum_test::TestServer;
    use pay_checkout::mock::{ConfirmBehavior, MockBackend, MockCardConfirmer, PushProbe};
    use pay_checkout::{standard_registry, CheckoutSettings};
    use pay_core::PollerConfig;
    use serde_json::{json, Value};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    fn server_with(backend: MockBackend, confirm: ConfirmBehavior) -> (TestServer, Arc<MockBackend>) {
        let backend = Arc::new(backend);
        let settings = CheckoutSettings {
            poll: PollerConfig::new(Duration::from_millis(20), 3),
            ..CheckoutSettings::default()
        };
        let registry = standard_registry(
            backend.clone(),
            Arc::new(MockCardConfirmer::new(confirm)),
            &settings,
        );
        let config = AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            environment: "test".to_string(),
            checkout_config: PathBuf::from("config/checkout.toml"),
            mode: ProviderMode::Mock,
        };

        let state = AppState::with_registry(config, settings, registry);
        let server = TestServer::new(create_router(state)).unwrap();
        (server, backend)
    }

    fn server() -> (TestServer, Arc<MockBackend>) {
        server_with(MockBackend::new(), ConfirmBehavior::Succeed)
    }

    async fn start(server: &TestServer, body: Value) -> Value {
        let response = server.post("/api/v1/checkout").json(&body).await;
        response.assert_status(StatusCode::ACCEPTED);
        response.json::<Value>()
    }

    /// Poll the status route until the outcome is present
    async fn resolved(server: &TestServer, session_id: &str) -> Value {
        for _ in 0..200 {
            let body = server
                .get(&format!("/api/v1/checkout/{}", session_id))
                .await
                .json::<Value>();
            if body.get("outcome").is_some() {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("checkout {} never resolved", session_id);
    }

    async fn wait_for_status(server: &TestServer, session_id: &str, status: &str) -> Value {
        for _ in 0..200 {
            let body = server
                .get(&format!("/api/v1/checkout/{}", session_id))
                .await
                .json::<Value>();
            if body["status"] == status {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("checkout {} never reached {}", session_id, status);
    }

    #[tokio::test]
    async fn test_health() {
        let (server, _) = server();
        let response = server.get("/health").await;
        response.assert_status_ok();

        let body = response.json::<Value>();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["live_sessions"], 0);
        assert_eq!(body["methods"], json!(["card", "push", "redirect"]));
    }

    #[tokio::test]
    async fn test_push_checkout_settles_in_kes() {
        let (server, backend) =
            server_with(MockBackend::new().with_push_script([], PushProbe::Completed), ConfirmBehavior::Succeed);

        let started = start(
            &server,
            json!({
                "method": "push",
                "amount": 19.00,
                "currency": "USD",
                "subject_id": "plan_pro",
                "description": "Pro plan",
                "payer": { "phone": "0712345678" }
            }),
        )
        .await;
        assert_eq!(started["settled_amount"], "KSh 2470.00");

        let session_id = started["session_id"].as_str().unwrap();
        let body = resolved(&server, session_id).await;
        assert_eq!(body["outcome"]["ok"], true);
        assert_eq!(body["outcome"]["method"], "push");
        assert_eq!(body["status"], "completed");
        assert_eq!(backend.initiate_calls()[0].amount, 2470.0);

        // Read once, then no longer tracked.
        server
            .get(&format!("/api/v1/checkout/{}", session_id))
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_card_decline_outcome() {
        let (server, _) = server_with(MockBackend::new(), ConfirmBehavior::Decline("insufficient_funds".into()));

        let started = start(
            &server,
            json!({
                "method": "card",
                "amount": 19.00,
                "currency": "USD",
                "subject_id": "plan_pro",
                "payer": { "card_token": "pm_card_chargeDeclined" }
            }),
        )
        .await;

        let body = resolved(&server, started["session_id"].as_str().unwrap()).await;
        assert_eq!(body["outcome"]["ok"], false);
        assert_eq!(body["outcome"]["reason"], "declined");
        assert_eq!(body["status"], "failed");
    }

    #[tokio::test]
    async fn test_redirect_approve_flow() {
        let (server, backend) = server();

        let started = start(
            &server,
            json!({
                "method": "paypal",
                "amount": 12.50,
                "currency": "EUR",
                "subject_id": "portfolio_7",
                "idempotency_key": "idem-7"
            }),
        )
        .await;
        let session_id = started["session_id"].as_str().unwrap();

        let waiting = wait_for_status(&server, session_id, "awaiting_user_action").await;
        let order_id = waiting["external_ref"].as_str().unwrap();

        let response = server
            .post(&format!("/api/v1/checkout/{}/approve", session_id))
            .json(&json!({ "order_id": order_id }))
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["accepted"], true);

        let body = resolved(&server, session_id).await;
        assert_eq!(body["outcome"]["ok"], true);
        assert_eq!(body["outcome"]["externalRef"], order_id);
        assert_eq!(backend.captures(), 1);
    }

    #[tokio::test]
    async fn test_redirect_cancel_never_captures() {
        let (server, backend) = server();

        let started = start(
            &server,
            json!({
                "method": "redirect",
                "amount": 12.50,
                "currency": "USD",
                "subject_id": "portfolio_8"
            }),
        )
        .await;
        let session_id = started["session_id"].as_str().unwrap();

        let response = server
            .post(&format!("/api/v1/checkout/{}/cancel", session_id))
            .await;
        response.assert_status_ok();

        // Approval arriving after cancellation is ignored.
        let late = server
            .post(&format!("/api/v1/checkout/{}/approve", session_id))
            .json(&json!({ "order_id": "ORDER_late" }))
            .await;
        assert_eq!(late.json::<Value>()["accepted"], false);

        let body = resolved(&server, session_id).await;
        assert_eq!(body["outcome"]["reason"], "user_cancelled");
        assert_eq!(body["status"], "cancelled");
        assert_eq!(backend.captures(), 0);
    }

    #[tokio::test]
    async fn test_second_checkout_per_instance_conflicts() {
        let (server, _) = server();
        let body = json!({
            "method": "redirect",
            "amount": 5.0,
            "currency": "USD",
            "subject_id": "plan_pro",
            "checkout_id": "tab-1"
        });

        let started = start(&server, body.clone()).await;
        assert_eq!(started["checkout_id"], "tab-1");

        let response = server.post("/api/v1/checkout").json(&body).await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(response.json::<Value>()["details"], "validation_error");

        // Another customer buying the same plan is unaffected.
        let other = start(
            &server,
            json!({
                "method": "redirect",
                "amount": 5.0,
                "currency": "USD",
                "subject_id": "plan_pro"
            }),
        )
        .await;
        assert_ne!(other["checkout_id"], "tab-1");
    }

    #[tokio::test]
    async fn test_invalid_phone_resolves_without_backend_calls() {
        let (server, backend) = server();

        let started = start(
            &server,
            json!({
                "method": "push",
                "amount": 19.00,
                "currency": "USD",
                "subject_id": "plan_basic",
                "payer": { "phone": "123" }
            }),
        )
        .await;

        let body = resolved(&server, started["session_id"].as_str().unwrap()).await;
        assert_eq!(body["outcome"]["reason"], "validation_error");
        assert!(backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejections_before_session() {
        let (server, _) = server();

        let unknown_method = server
            .post("/api/v1/checkout")
            .json(&json!({
                "method": "crypto",
                "amount": 1.0,
                "currency": "USD",
                "subject_id": "plan_pro"
            }))
            .await;
        unknown_method.assert_status(StatusCode::BAD_REQUEST);

        let no_rate = server
            .post("/api/v1/checkout")
            .json(&json!({
                "method": "push",
                "amount": 1.0,
                "currency": "JPY",
                "subject_id": "plan_pro",
                "payer": { "phone": "0712345678" }
            }))
            .await;
        no_rate.assert_status(StatusCode::BAD_REQUEST);

        server
            .get("/api/v1/checkout/cs_unknown")
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_approve_on_card_session_conflicts() {
        let (server, _) = server_with(MockBackend::new(), ConfirmBehavior::Succeed);

        let started = start(
            &server,
            json!({
                "method": "card",
                "amount": 19.00,
                "currency": "USD",
                "subject_id": "plan_pro",
                "payer": { "card_token": "pm_card_visa" }
            }),
        )
        .await;

        server
            .post(&format!("/api/v1/checkout/{}/approve", started["session_id"].as_str().unwrap()))
            .json(&json!({ "order_id": "ORDER_x" }))
            .await
            .assert_status(StatusCode::CONFLICT);
    }
}
