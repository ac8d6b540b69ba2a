//! # Status Poller
//!
//! Invokes an async probe on a fixed interval until it reports a terminal
//! result, the attempt budget runs out, or the poll is cancelled.
//!
//! ```text
//!   start ──interval──▶ tick ──▶ attempts += 1 ──▶ attempts > max? ──yes──▶ TimedOut
//!                        ▲                               │ no
//!                        │                               ▼
//!                        └──── Pending / Err (logged) ◀── probe(attempt) ──Done──▶ Done
//! ```
//!
//! The interval timer lives inside [`StatusPoller::run`]'s future, so it is
//! released on every exit path, including the caller dropping the future.

use crate::cancel::CancelToken;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Default delay between probes
pub const DEFAULT_INTERVAL_MS: u64 = 5_000;

/// Default probe budget (150s overall with the default interval)
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// What a single probe observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeStatus<T> {
    /// Not terminal yet, keep polling
    Pending,
    /// Terminal; stop and resolve with this value
    Done(T),
}

/// How a poll run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Done { value: T, attempts: u32 },
    TimedOut { attempts: u32 },
    Cancelled { attempts: u32 },
}

impl<T> PollOutcome<T> {
    /// Number of probe invocations made
    pub fn attempts(&self) -> u32 {
        match self {
            PollOutcome::Done { attempts, .. }
            | PollOutcome::TimedOut { attempts }
            | PollOutcome::Cancelled { attempts } => *attempts,
        }
    }
}

/// Poller timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl PollerConfig {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval_ms: interval.as_millis() as u64,
            max_attempts,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }

    /// Wall-clock budget before a timeout is reported
    pub fn window(&self) -> Duration {
        self.interval() * self.max_attempts
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Bounded-interval poller. Knows nothing about payment providers.
#[derive(Debug, Clone)]
pub struct StatusPoller {
    config: PollerConfig,
    cancel: CancelToken,
}

impl StatusPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self::with_cancel(config, CancelToken::new())
    }

    /// Share an existing stop signal (e.g. the owning session's)
    pub fn with_cancel(config: PollerConfig, cancel: CancelToken) -> Self {
        Self { config, cancel }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Stop polling. Idempotent; a no-op after the run has finished.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the probe until it is done, the budget is spent, or cancellation.
    ///
    /// The probe receives the 1-based attempt number. Probe errors are
    /// logged and counted as non-terminal attempts. A probe already in
    /// flight when cancellation lands runs to completion and its result is
    /// discarded.
    pub async fn run<T, E, F, Fut>(&self, mut probe: F) -> PollOutcome<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<ProbeStatus<T>, E>>,
        E: Display,
    {
        let period = self.config.interval();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut attempts: u32 = 0;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(attempts, "status polling cancelled");
                    return PollOutcome::Cancelled { attempts };
                }
                _ = ticker.tick() => {}
            }

            attempts += 1;
            if attempts > self.config.max_attempts {
                let attempts = self.config.max_attempts;
                warn!(attempts, "status polling exhausted its attempt budget");
                return PollOutcome::TimedOut { attempts };
            }

            let result = probe(attempts).await;

            if self.cancel.is_cancelled() {
                debug!(attempts, "discarding probe result after cancellation");
                return PollOutcome::Cancelled { attempts };
            }

            match result {
                Ok(ProbeStatus::Done(value)) => {
                    debug!(attempts, "status probe reported a terminal result");
                    return PollOutcome::Done { value, attempts };
                }
                Ok(ProbeStatus::Pending) => {
                    debug!(attempts, max_attempts = self.config.max_attempts, "status still pending");
                }
                Err(e) => {
                    warn!(attempts, error = %e, "status probe failed, will retry");
                }
            }
        }
    }
}
