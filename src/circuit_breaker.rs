//! Circuit breaker (§4.11): per-endpoint CLOSED/OPEN/HALF_OPEN state machine
//! guarding the ML advisory client.
//!
//! Composed from two primitives: plain atomics wrapped in `Arc`, read
//! without locks, for the rolling request/error tally, and an
//! `Arc<RwLock<snapshot>>` for the small bit of state (current `State`,
//! `opened_at`) that genuinely needs a lock because it's more than a
//! counter. Subscribers only ever read a snapshot via `state()`; they never
//! mutate it directly.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    /// Observability gauge value per §4.11: 0/1/2 for CLOSED/OPEN/HALF_OPEN.
    pub fn gauge(self) -> u8 {
        match self {
            BreakerState::Closed => 0,
            BreakerState::Open => 1,
            BreakerState::HalfOpen => 2,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BreakerConfig {
    pub timeout: Duration,
    pub error_threshold_pct: f64,
    pub volume_threshold: u32,
    pub reset_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            error_threshold_pct: 50.0,
            volume_threshold: 5,
            reset_timeout: Duration::from_secs(10),
        }
    }
}

struct Window {
    requests: AtomicU32,
    errors: AtomicU32,
}

impl Window {
    fn new() -> Self {
        Self {
            requests: AtomicU32::new(0),
            errors: AtomicU32::new(0),
        }
    }

    fn reset(&self) {
        self.requests.store(0, Ordering::Relaxed);
        self.errors.store(0, Ordering::Relaxed);
    }

    fn record(&self, ok: bool) -> (u32, u32) {
        let requests = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        let errors = if ok {
            self.errors.load(Ordering::Relaxed)
        } else {
            self.errors.fetch_add(1, Ordering::Relaxed) + 1
        };
        (requests, errors)
    }
}

/// A named breaker guarding one upstream call. Cheaply cloneable; all clones
/// share the same counters and state.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: &'static str,
    config: BreakerConfig,
    window: Arc<Window>,
    state: Arc<AtomicU8>,
    opened_at: Arc<Mutex<Option<Instant>>>,
}

const STATE_CLOSED: u8 = 0;
const STATE_OPEN: u8 = 1;
const STATE_HALF_OPEN: u8 = 2;

impl CircuitBreaker {
    pub fn new(name: &'static str, config: BreakerConfig) -> Self {
        Self {
            name,
            config,
            window: Arc::new(Window::new()),
            state: Arc::new(AtomicU8::new(STATE_CLOSED)),
            opened_at: Arc::new(Mutex::new(None)),
        }
    }

    pub fn state(&self) -> BreakerState {
        match self.state.load(Ordering::Acquire) {
            STATE_OPEN => {
                if self.half_open_probe_due() {
                    BreakerState::HalfOpen
                } else {
                    BreakerState::Open
                }
            }
            STATE_HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }

    fn half_open_probe_due(&self) -> bool {
        let guard = self.opened_at.lock();
        match *guard {
            Some(t) => t.elapsed() >= self.config.reset_timeout,
            None => false,
        }
    }

    fn transition_to_open(&self) {
        self.state.store(STATE_OPEN, Ordering::Release);
        *self.opened_at.lock() = Some(Instant::now());
        warn!(breaker = self.name, "circuit breaker opened");
    }

    fn transition_to_half_open(&self) {
        self.state.store(STATE_HALF_OPEN, Ordering::Release);
        info!(breaker = self.name, "circuit breaker half-open, probing");
    }

    fn transition_to_closed(&self) {
        self.state.store(STATE_CLOSED, Ordering::Release);
        *self.opened_at.lock() = None;
        self.window.reset();
        info!(breaker = self.name, "circuit breaker closed");
    }

    fn record_success(&self) {
        match self.state() {
            BreakerState::HalfOpen => self.transition_to_closed(),
            _ => {
                self.window.record(true);
            }
        }
    }

    fn record_failure(&self) {
        match self.state() {
            BreakerState::HalfOpen => self.transition_to_open(),
            BreakerState::Open => {}
            BreakerState::Closed => {
                let (requests, errors) = self.window.record(false);
                if requests >= self.config.volume_threshold {
                    let error_pct = (errors as f64 / requests as f64) * 100.0;
                    if error_pct >= self.config.error_threshold_pct {
                        self.transition_to_open();
                    }
                }
            }
        }
    }

    /// Runs `call` if the breaker admits a request (CLOSED, or HALF_OPEN
    /// probing after `reset_timeout`); otherwise runs `fallback` without
    /// attempting the call. A fallback never fails (§4.11 contract) — its
    /// signature enforces that by returning `T` directly, not `Result<T, _>`.
    pub async fn call<F, Fut, T, Fb>(&self, call: F, fallback: Fb) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, String>>,
        Fb: FnOnce() -> T,
    {
        if self.state() == BreakerState::Open {
            return fallback();
        }
        if self.state() == BreakerState::HalfOpen && self.state.load(Ordering::Acquire) == STATE_OPEN {
            self.transition_to_half_open();
        }

        match tokio::time::timeout(self.config.timeout, call()).await {
            Ok(Ok(value)) => {
                self.record_success();
                value
            }
            Ok(Err(_)) => {
                self.record_failure();
                fallback()
            }
            Err(_) => {
                self.record_failure();
                fallback()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            timeout: Duration::from_millis(50),
            error_threshold_pct: 50.0,
            volume_threshold: 2,
            reset_timeout: Duration::from_millis(30),
        }
    }

    #[tokio::test]
    async fn opens_after_error_threshold_and_volume_met() {
        let breaker = CircuitBreaker::new("test", fast_config());
        assert_eq!(breaker.state(), BreakerState::Closed);

        for _ in 0..2 {
            breaker
                .call(|| async { Err::<(), String>("boom".into()) }, || ())
                .await;
        }

        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn falls_back_without_calling_when_open() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..2 {
            breaker
                .call(|| async { Err::<u32, String>("boom".into()) }, || 0u32)
                .await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        let calls = Arc::new(AtomicU32::new(0));
        let calls2 = calls.clone();
        let result = breaker
            .call(
                move || {
                    calls2.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<u32, String>(42) }
                },
                || 99,
            )
            .await;

        assert_eq!(result, 99);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn half_open_recovers_to_closed_on_first_success() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..2 {
            breaker
                .call(|| async { Err::<u32, String>("boom".into()) }, || 0u32)
                .await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        let result = breaker
            .call(|| async { Ok::<u32, String>(7) }, || 0u32)
            .await;
        assert_eq!(result, 7);
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn timeout_counts_as_failure() {
        let breaker = CircuitBreaker::new("test", fast_config());
        for _ in 0..2 {
            let result = breaker
                .call(
                    || async {
                        tokio::time::sleep(Duration::from_millis(200)).await;
                        Ok::<u32, String>(1)
                    },
                    || 0u32,
                )
                .await;
            assert_eq!(result, 0);
        }
        assert_eq!(breaker.state(), BreakerState::Open);
    }
}
