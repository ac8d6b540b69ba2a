//! # Checkout Configuration
//!
//! Secrets and endpoints come from environment variables; tunables
//! (polling, phone rules, settlement rates) come from `config/checkout.toml`.

use chrono::Duration;
use pay_core::{
    ConversionRate, ConversionTable, Currency, PaymentError, PaymentResult, PhoneRules,
    PollerConfig,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CARD_API_BASE_URL: &str = "https://api.stripe.com";
const DEFAULT_CARD_API_VERSION: &str = "2024-12-18.acacia";

/// Payments backend configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the payments backend (e.g. "https://api.example.com/api")
    pub base_url: String,

    /// Bearer token for the backend, if it requires one
    pub api_token: Option<String>,

    /// Transport timeout per call
    pub timeout_secs: u64,
}

impl BackendConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `BACKEND_BASE_URL`
    ///
    /// Optional:
    /// - `BACKEND_API_TOKEN`
    /// - `BACKEND_TIMEOUT_SECS`
    pub fn from_env() -> PaymentResult<Self> {
        dotenvy::dotenv().ok();

        let base_url = env::var("BACKEND_BASE_URL").map_err(|_| {
            PaymentError::Configuration("BACKEND_BASE_URL not set".to_string())
        })?;

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(PaymentError::Configuration(
                "BACKEND_BASE_URL must be an http(s) URL".to_string(),
            ));
        }

        let timeout_secs = env::var("BACKEND_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: env::var("BACKEND_API_TOKEN").ok().filter(|t| !t.is_empty()),
            timeout_secs,
        })
    }

    /// Create config with explicit values (for testing)
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Builder: set bearer token
    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Full URL for a backend path
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

/// Card provider configuration (client-side confirm, publishable key only)
#[derive(Debug, Clone)]
pub struct CardProviderConfig {
    /// Publishable key (pk_test_... or pk_live_...)
    pub publishable_key: String,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// API version
    pub api_version: String,
}

impl CardProviderConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `CARD_PUBLISHABLE_KEY`
    ///
    /// Optional:
    /// - `CARD_API_BASE_URL`
    pub fn from_env() -> PaymentResult<Self> {
        dotenvy::dotenv().ok();

        let publishable_key = env::var("CARD_PUBLISHABLE_KEY").map_err(|_| {
            PaymentError::Configuration("CARD_PUBLISHABLE_KEY not set".to_string())
        })?;

        let config = Self::new(publishable_key);
        config.validate()?;

        match env::var("CARD_API_BASE_URL") {
            Ok(url) if !url.is_empty() => Ok(config.with_api_base_url(url)),
            _ => Ok(config),
        }
    }

    /// Create config with explicit values (for testing)
    pub fn new(publishable_key: impl Into<String>) -> Self {
        Self {
            publishable_key: publishable_key.into(),
            api_base_url: DEFAULT_CARD_API_BASE_URL.to_string(),
            api_version: DEFAULT_CARD_API_VERSION.to_string(),
        }
    }

    /// Validate key format
    pub fn validate(&self) -> PaymentResult<()> {
        if !self.publishable_key.starts_with("pk_test_")
            && !self.publishable_key.starts_with("pk_live_")
        {
            return Err(PaymentError::Configuration(
                "CARD_PUBLISHABLE_KEY must start with pk_test_ or pk_live_".to_string(),
            ));
        }
        Ok(())
    }

    /// Check if using test keys
    pub fn is_test_mode(&self) -> bool {
        self.publishable_key.starts_with("pk_test_")
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.publishable_key)
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        let url: String = url.into();
        self.api_base_url = url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Lifetime recorded on card and redirect sessions
    #[serde(default = "default_session_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_session_ttl_secs() -> u64 {
    30 * 60
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_session_ttl_secs(),
        }
    }
}

impl SessionSettings {
    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_secs as i64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushSettings {
    /// Currency the mobile-money provider settles in
    #[serde(default = "default_push_currency")]
    pub settlement_currency: Currency,
}

fn default_push_currency() -> Currency {
    Currency::KES
}

impl Default for PushSettings {
    fn default() -> Self {
        Self {
            settlement_currency: default_push_currency(),
        }
    }
}

/// Orchestration tunables, loaded from TOML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSettings {
    #[serde(default)]
    pub poll: PollerConfig,

    #[serde(default)]
    pub phone: PhoneRules,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub push: PushSettings,

    #[serde(default = "default_rates")]
    pub rates: Vec<ConversionRate>,
}

fn default_rates() -> Vec<ConversionRate> {
    vec![ConversionRate::new(Currency::USD, Currency::KES, 130.0)]
}

impl Default for CheckoutSettings {
    fn default() -> Self {
        Self {
            poll: PollerConfig::default(),
            phone: PhoneRules::default(),
            session: SessionSettings::default(),
            push: PushSettings::default(),
            rates: default_rates(),
        }
    }
}

impl CheckoutSettings {
    /// Parse settings from a TOML string
    pub fn from_toml(toml_str: &str) -> PaymentResult<Self> {
        let settings: Self = toml::from_str(toml_str)
            .map_err(|e| PaymentError::Configuration(format!("invalid checkout settings: {}", e)))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load from a file; a missing file yields the defaults
    pub fn load(path: impl AsRef<Path>) -> PaymentResult<Self> {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("No checkout settings at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(PaymentError::Configuration(format!(
                "failed to read {}: {}",
                path.display(),
                e
            ))),
        }
    }

    pub fn validate(&self) -> PaymentResult<()> {
        if self.poll.max_attempts == 0 {
            return Err(PaymentError::Configuration(
                "poll.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.phone.country_prefix.is_empty()
            || !self.phone.country_prefix.chars().all(|c| c.is_ascii_digit())
        {
            return Err(PaymentError::Configuration(
                "phone.country_prefix must be digits".to_string(),
            ));
        }
        if let Some(bad) = self.rates.iter().find(|r| !(r.rate.is_finite() && r.rate > 0.0)) {
            return Err(PaymentError::Configuration(format!(
                "rate {} -> {} must be positive",
                bad.from, bad.to
            )));
        }
        Ok(())
    }

    pub fn conversion_table(&self) -> ConversionTable {
        self.rates.iter().copied().collect()
    }
}
