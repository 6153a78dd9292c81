//! Circuit breaker for external data feeds.
//!
//! ESPN endpoints go down for minutes at a time. Once a feed has failed
//! `failure_threshold` times in a row the breaker opens and callers skip the
//! request entirely (the injury cache then serves its fallback). After
//! `recovery_timeout` one probe is let through; `success_threshold`
//! consecutive successes close it again.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedCircuitState {
    /// Requests flow normally
    Closed,
    /// Requests are refused until the recovery timeout elapses
    Open,
    /// Probing whether the feed is back
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct FeedBreakerConfig {
    pub failure_threshold: u32,
    pub recovery_timeout: Duration,
    pub success_threshold: u32,
}

impl Default for FeedBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            success_threshold: 2,
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: FeedCircuitState,
    consecutive_failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
}

/// Per-feed breaker shared by every request to that feed.
#[derive(Debug)]
pub struct FeedBreaker {
    feed: String,
    config: FeedBreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl FeedBreaker {
    pub fn new(feed: &str, config: FeedBreakerConfig) -> Self {
        Self {
            feed: feed.to_string(),
            config,
            inner: Mutex::new(BreakerInner {
                state: FeedCircuitState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                opened_at: None,
            }),
        }
    }

    pub fn with_defaults(feed: &str) -> Self {
        Self::new(feed, FeedBreakerConfig::default())
    }

    /// Whether a request may go out now. Moves Open to HalfOpen once the
    /// recovery timeout has elapsed.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            FeedCircuitState::Closed | FeedCircuitState::HalfOpen => true,
            FeedCircuitState::Open => {
                let cooled = inner
                    .opened_at
                    .map_or(true, |t| t.elapsed() >= self.config.recovery_timeout);
                if cooled {
                    inner.state = FeedCircuitState::HalfOpen;
                    inner.probe_successes = 0;
                    info!("Feed '{}' breaker half-open, probing", self.feed);
                }
                cooled
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        if inner.state == FeedCircuitState::HalfOpen {
            inner.probe_successes += 1;
            if inner.probe_successes < self.config.success_threshold {
                return;
            }
            info!(
                "Feed '{}' breaker closed after {} successful probes",
                self.feed, inner.probe_successes
            );
        }
        inner.state = FeedCircuitState::Closed;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        match inner.state {
            FeedCircuitState::Closed
                if inner.consecutive_failures >= self.config.failure_threshold =>
            {
                inner.state = FeedCircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!(
                    "Feed '{}' breaker OPEN after {} consecutive failures",
                    self.feed, inner.consecutive_failures
                );
            }
            FeedCircuitState::HalfOpen => {
                inner.state = FeedCircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!("Feed '{}' breaker re-opened: probe failed", self.feed);
            }
            _ => {}
        }
    }

    pub fn state(&self) -> FeedCircuitState {
        self.inner.lock().state
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    pub fn feed(&self) -> &str {
        &self.feed
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = FeedCircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.probe_successes = 0;
        inner.opened_at = None;
    }
}
