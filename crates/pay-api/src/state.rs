//! # Application State
//!
//! Shared state for the Axum application: one checkout coordinator per
//! client checkout instance, the sessions still running, and resolved
//! outcomes waiting to be read.

use pay_checkout::mock::{MockBackend, MockCardConfirmer};
use pay_checkout::{
    standard_registry, CardConfirmClient, CheckoutCoordinator, CheckoutSettings, HttpBackend,
};
use pay_core::{
    AdapterRegistry, ApprovalDelegate, CancelToken, PaymentError, PaymentOutcome, PaymentRequest,
    PaymentResult, PaymentSession, SessionHandle,
};
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

/// Which provider clients the service runs against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderMode {
    /// Real backend and card provider over HTTP
    Live,
    /// In-memory providers (local development and demos)
    Mock,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Environment (development, staging, production)
    pub environment: String,
    /// Path of the checkout tunables file
    pub checkout_config: PathBuf,
    pub mode: ProviderMode,
}

impl AppConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mode = match std::env::var("CHECKOUT_MODE") {
            Ok(mode) if mode.eq_ignore_ascii_case("mock") => ProviderMode::Mock,
            _ => ProviderMode::Live,
        };

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
            checkout_config: std::env::var("CHECKOUT_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/checkout.toml")),
            mode,
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid socket address {}:{}: {}", self.host, self.port, e))
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Resolved sessions kept for the status route
const RESOLVED_CAPACITY: usize = 1024;

/// A session started through the API that has not resolved yet
#[derive(Clone)]
pub struct TrackedCheckout {
    pub checkout_id: String,
    pub subject_id: String,
    pub session: SessionHandle,
    pub approval: Option<ApprovalDelegate>,
    pub cancel: CancelToken,
}

/// Point-in-time view of a session
#[derive(Debug, Clone)]
pub struct CheckoutView {
    pub checkout_id: String,
    pub subject_id: String,
    pub session: PaymentSession,
    pub outcome: Option<PaymentOutcome>,
}

/// Where a session id currently lives
pub enum Lookup {
    Live(TrackedCheckout),
    Resolved(CheckoutView),
}

/// Resolved views awaiting their read, oldest evicted first
#[derive(Debug)]
pub struct ResolvedCheckouts {
    capacity: usize,
    order: VecDeque<String>,
    views: HashMap<String, CheckoutView>,
}

impl ResolvedCheckouts {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            views: HashMap::new(),
        }
    }

    pub fn insert(&mut self, session_id: String, view: CheckoutView) {
        if self.views.insert(session_id.clone(), view).is_none() {
            self.order.push_back(session_id);
        }
        while self.views.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    if self.views.remove(&oldest).is_some() {
                        debug!(session_id = %oldest, "evicting unread checkout outcome");
                    }
                }
                None => break,
            }
        }
    }

    pub fn get(&self, session_id: &str) -> Option<&CheckoutView> {
        self.views.get(session_id)
    }

    pub fn take(&mut self, session_id: &str) -> Option<CheckoutView> {
        let view = self.views.remove(session_id)?;
        self.order.retain(|id| id != session_id);
        Some(view)
    }

    pub fn len(&self) -> usize {
        self.views.len()
    }

    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Adapters shared by every coordinator
    pub registry: AdapterRegistry,
    pub settings: Arc<CheckoutSettings>,
    /// Application config
    pub config: AppConfig,
    /// One coordinator per client checkout instance, dropped once idle
    coordinators: Arc<Mutex<HashMap<String, Arc<CheckoutCoordinator>>>>,
    live: Arc<Mutex<HashMap<String, TrackedCheckout>>>,
    resolved: Arc<Mutex<ResolvedCheckouts>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AppState {
    /// Create state from the environment and the checkout config file
    pub fn new() -> anyhow::Result<Self> {
        let config = AppConfig::from_env();
        let settings = CheckoutSettings::load(&config.checkout_config)
            .map_err(|e| anyhow::anyhow!("Failed to load checkout settings: {}", e))?;

        let registry = match config.mode {
            ProviderMode::Live => {
                let backend = HttpBackend::from_env()
                    .map_err(|e| anyhow::anyhow!("Failed to initialize backend client: {}", e))?;
                let confirmer = CardConfirmClient::from_env()
                    .map_err(|e| anyhow::anyhow!("Failed to initialize card provider: {}", e))?;
                standard_registry(Arc::new(backend), Arc::new(confirmer), &settings)
            }
            ProviderMode::Mock => {
                tracing::warn!("CHECKOUT_MODE=mock: payments are simulated in memory");
                standard_registry(
                    Arc::new(MockBackend::new()),
                    Arc::new(MockCardConfirmer::default()),
                    &settings,
                )
            }
        };

        Ok(Self::with_registry(config, settings, registry))
    }

    /// Create state around an explicit registry
    pub fn with_registry(
        config: AppConfig,
        settings: CheckoutSettings,
        registry: AdapterRegistry,
    ) -> Self {
        Self {
            registry,
            settings: Arc::new(settings),
            config,
            coordinators: Arc::new(Mutex::new(HashMap::new())),
            live: Arc::new(Mutex::new(HashMap::new())),
            resolved: Arc::new(Mutex::new(ResolvedCheckouts::new(RESOLVED_CAPACITY))),
        }
    }

    /// Start a checkout for a client checkout instance.
    ///
    /// Without a `checkout_id` a fresh instance is created. Reusing an id
    /// whose session is still unresolved is rejected with `SessionInProgress`.
    pub fn start_checkout(
        &self,
        checkout_id: Option<String>,
        request: PaymentRequest,
    ) -> PaymentResult<CheckoutView> {
        let checkout_id =
            checkout_id.unwrap_or_else(|| format!("co_{}", Uuid::new_v4().simple()));
        let subject_id = request.subject_id.clone();

        // Held across `checkout` so idle eviction cannot race a start.
        let handle = {
            let mut coordinators = lock(&self.coordinators);
            let coordinator = coordinators
                .entry(checkout_id.clone())
                .or_insert_with(|| {
                    debug!(checkout_id = %checkout_id, "creating checkout coordinator");
                    Arc::new(CheckoutCoordinator::from_settings(
                        self.registry.clone(),
                        &self.settings,
                    ))
                })
                .clone();

            let started = coordinator.checkout(request);
            if started.is_err() && coordinator.active_session().is_none() {
                coordinators.remove(&checkout_id);
            }
            started?
        };

        let tracked = TrackedCheckout {
            checkout_id: checkout_id.clone(),
            subject_id: subject_id.clone(),
            session: handle.session(),
            approval: handle.approval(),
            cancel: handle.canceller(),
        };
        let session_id = handle.session_id();
        let snapshot = tracked.session.snapshot();

        lock(&self.live).insert(session_id.clone(), tracked);

        let state = self.clone();
        tokio::spawn(async move {
            let outcome = handle.outcome().await;
            info!(session_id = %session_id, ok = outcome.is_ok(), "checkout resolved");
            state.resolve(&session_id, outcome);
        });

        Ok(CheckoutView {
            checkout_id,
            subject_id,
            session: snapshot,
            outcome: None,
        })
    }

    /// Move a session from the live set to the resolved cache and release
    /// its coordinator when idle
    fn resolve(&self, session_id: &str, outcome: PaymentOutcome) {
        let Some(tracked) = lock(&self.live).get(session_id).cloned() else {
            return;
        };

        let view = CheckoutView {
            checkout_id: tracked.checkout_id.clone(),
            subject_id: tracked.subject_id,
            session: tracked.session.snapshot(),
            outcome: Some(outcome),
        };
        lock(&self.resolved).insert(session_id.to_string(), view);
        lock(&self.live).remove(session_id);

        let mut coordinators = lock(&self.coordinators);
        let idle = coordinators
            .get(&tracked.checkout_id)
            .is_some_and(|coordinator| coordinator.active_session().is_none());
        if idle {
            coordinators.remove(&tracked.checkout_id);
            debug!(checkout_id = %tracked.checkout_id, "released idle checkout coordinator");
        }
    }

    pub fn lookup(&self, session_id: &str) -> PaymentResult<Lookup> {
        if let Some(tracked) = lock(&self.live).get(session_id) {
            return Ok(Lookup::Live(tracked.clone()));
        }
        lock(&self.resolved)
            .get(session_id)
            .cloned()
            .map(Lookup::Resolved)
            .ok_or_else(|| PaymentError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Current view of a session. A resolved view is handed out once.
    pub fn view(&self, session_id: &str) -> PaymentResult<CheckoutView> {
        if let Some(tracked) = lock(&self.live).get(session_id) {
            return Ok(CheckoutView {
                checkout_id: tracked.checkout_id.clone(),
                subject_id: tracked.subject_id.clone(),
                session: tracked.session.snapshot(),
                outcome: None,
            });
        }
        lock(&self.resolved)
            .take(session_id)
            .ok_or_else(|| PaymentError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    /// Sessions still unresolved
    pub fn live_count(&self) -> usize {
        lock(&self.live).len()
    }

    /// Resolved outcomes not yet read
    pub fn unread_count(&self) -> usize {
        lock(&self.resolved).len()
    }

    pub fn coordinator_count(&self) -> usize {
        lock(&self.coordinators).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pay_checkout::SessionSettings;
    use pay_core::{Currency, ErrorKind, PayerDetails, PaymentMethod, Price};
    use std::time::Duration;

    fn test_config() -> AppConfig {
        AppConfig {
            host: "0.0.0.0".to_string(),
            port: 3000,
            environment: "test".to_string(),
            checkout_config: PathBuf::from("config/checkout.toml"),
            mode: ProviderMode::Mock,
        }
    }

    #[test]
    fn test_socket_addr() {
        let addr = test_config().socket_addr().unwrap();
        assert_eq!(addr.to_string(), "0.0.0.0:3000");

        let bad = AppConfig {
            host: "not a host".to_string(),
            ..test_config()
        };
        assert!(bad.socket_addr().is_err());
    }

    fn state_with(settings: CheckoutSettings) -> AppState {
        let registry = standard_registry(
            Arc::new(MockBackend::new()),
            Arc::new(MockCardConfirmer::default()),
            &settings,
        );
        AppState::with_registry(test_config(), settings, registry)
    }

    fn plan_request(method: PaymentMethod) -> PaymentRequest {
        PaymentRequest::new(method, Price::new(19.0, Currency::USD), "plan_pro", "Pro plan")
            .with_payer(PayerDetails::new().with_card_token("pm_card_visa"))
    }

    #[tokio::test]
    async fn test_customers_of_same_plan_are_independent() {
        let state = state_with(CheckoutSettings::default());

        let first = state
            .start_checkout(None, plan_request(PaymentMethod::Redirect))
            .unwrap();
        let second = state
            .start_checkout(None, plan_request(PaymentMethod::Card))
            .unwrap();
        assert_ne!(first.checkout_id, second.checkout_id);

        // The same checkout instance cannot run two sessions.
        let err = state
            .start_checkout(Some(first.checkout_id.clone()), plan_request(PaymentMethod::Card))
            .unwrap_err();
        assert!(matches!(err, PaymentError::SessionInProgress { .. }));

        assert!(matches!(
            state.view("cs_missing"),
            Err(PaymentError::SessionNotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_redirect_resolves_without_reads() {
        let settings = CheckoutSettings {
            session: SessionSettings { ttl_secs: 60 },
            ..CheckoutSettings::default()
        };
        let state = state_with(settings);

        let started = state
            .start_checkout(Some("tab-1".to_string()), plan_request(PaymentMethod::Redirect))
            .unwrap();
        let session_id = started.session.session_id;
        assert_eq!(state.coordinator_count(), 1);

        for _ in 0..120 {
            if state.live_count() == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        // Evicted from the live set and its coordinator released, unread.
        assert_eq!(state.live_count(), 0);
        assert_eq!(state.coordinator_count(), 0);
        assert_eq!(state.unread_count(), 1);

        let view = state.view(&session_id).unwrap();
        assert_eq!(
            view.outcome.and_then(|outcome| outcome.reason()),
            Some(ErrorKind::UserCancelled)
        );
        assert_eq!(state.unread_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_start_leaves_no_coordinator() {
        let state = state_with(CheckoutSettings::default());

        let zero = PaymentRequest::new(
            PaymentMethod::Card,
            Price::from_cents(0, Currency::USD),
            "plan_pro",
            "Pro plan",
        );
        assert!(state.start_checkout(Some("tab-2".to_string()), zero).is_err());
        assert_eq!(state.coordinator_count(), 0);
    }

    #[test]
    fn test_resolved_cache_is_bounded() {
        let view = |id: &str| CheckoutView {
            checkout_id: format!("co_{}", id),
            subject_id: "plan_pro".to_string(),
            session: PaymentSession::new(
                PaymentMethod::Card,
                Price::new(19.0, Currency::USD),
                0,
                chrono::Duration::minutes(30),
            ),
            outcome: Some(PaymentOutcome::cancelled()),
        };

        let mut cache = ResolvedCheckouts::new(2);
        cache.insert("cs_1".to_string(), view("1"));
        cache.insert("cs_2".to_string(), view("2"));
        cache.insert("cs_3".to_string(), view("3"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("cs_1").is_none());
        assert!(cache.take("cs_2").is_some());
        assert!(cache.take("cs_2").is_none());
        assert_eq!(cache.len(), 1);
    }
}
