//! Per-client admission control
//!
//! Each client key gets its own token bucket. A bucket holds at most
//! `burst` tokens, gains one token every `refill_interval`, and every
//! admitted request spends one token. Buckets are created full the first
//! time a key is seen.
//!
//! ## Concurrency
//!
//! Buckets live in a sharded [`DashMap`]. Refill and consume for a key run
//! while holding that key's shard guard, so concurrent calls for the same
//! key are linearizable and never overspend. Calls for keys on different
//! shards proceed in parallel.
//!
//! ## Eviction
//!
//! A bucket untouched for longer than the idle TTL is dropped. The TTL is
//! never shorter than the time a drained bucket takes to refill completely,
//! so a client that comes back after eviction gets a full bucket it would
//! have had anyway.
//!
//! Sweeps happen in three ways:
//! - opportunistically from [`AdmissionController::allow`], at most once per sweep interval
//! - on demand through [`AdmissionController::evict_idle`]
//! - from a background task started with [`AdmissionController::spawn_eviction_task`]
//!
//! ## Usage
//!
//! ```
//! use chopper_gateway::admission::{AdmissionController, BucketPolicy};
//!
//! let policy = BucketPolicy::per_second(1, 5).unwrap();
//! let controller = AdmissionController::new(policy);
//!
//! for _ in 0..5 {
//!     assert!(controller.allow("10.0.0.1"));
//! }
//! assert!(!controller.allow("10.0.0.1"));
//! assert!(controller.allow("10.0.0.2"));
//! ```

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::clock::{Clock, SystemClock};
use crate::config::AdmissionConfig;
use crate::error::ConfigError;
use crate::gateway_metrics;

/// Refill rate and capacity shared by every bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketPolicy {
    refill_interval: Duration,
    burst: u32,
}

impl BucketPolicy {
    /// One token accrues every `refill_interval`, up to `burst` tokens
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroRefillInterval`] for a zero interval and
    /// [`ConfigError::ZeroBurst`] for a zero burst.
    pub fn new(refill_interval: Duration, burst: u32) -> Result<Self, ConfigError> {
        if refill_interval.is_zero() {
            return Err(ConfigError::ZeroRefillInterval);
        }
        if burst == 0 {
            return Err(ConfigError::ZeroBurst);
        }
        Ok(Self {
            refill_interval,
            burst,
        })
    }

    /// `per_second` tokens per second, up to `burst` tokens
    ///
    /// # Errors
    ///
    /// Returns error if `per_second` or `burst` is zero
    pub fn per_second(per_second: u32, burst: u32) -> Result<Self, ConfigError> {
        if per_second == 0 {
            return Err(ConfigError::ZeroRefillInterval);
        }
        Self::new(Duration::from_secs(1) / per_second, burst)
    }

    /// Time for one token to accrue
    pub fn refill_interval(&self) -> Duration {
        self.refill_interval
    }

    /// Bucket capacity
    pub fn burst(&self) -> u32 {
        self.burst
    }

    /// Time for an empty bucket to refill completely
    pub fn full_refill_time(&self) -> Duration {
        self.refill_interval.saturating_mul(self.burst)
    }
}

/// Limiter state for one client key
///
/// Tokens are whole numbers. `last_refill` only moves forward by whole
/// refill intervals, so partial progress toward the next token survives
/// any number of denied calls.
#[derive(Debug, Clone)]
struct TokenBucket {
    tokens: u32,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(policy: &BucketPolicy, now: Instant) -> Self {
        Self {
            tokens: policy.burst,
            last_refill: now,
        }
    }

    fn refill(&mut self, policy: &BucketPolicy, now: Instant) {
        // A full bucket accrues nothing; the clock restarts on the next spend
        if self.tokens >= policy.burst {
            self.last_refill = now;
            return;
        }

        let elapsed = now.saturating_duration_since(self.last_refill);
        let accrued = elapsed.as_nanos() / policy.refill_interval.as_nanos();
        if accrued == 0 {
            return;
        }

        let missing = policy.burst - self.tokens;
        if accrued >= u128::from(missing) {
            self.tokens = policy.burst;
            self.last_refill = now;
        } else {
            // accrued < missing <= u32::MAX
            let accrued = accrued as u32;
            self.tokens += accrued;
            self.last_refill += policy.refill_interval * accrued;
        }
    }

    fn try_take(&mut self, policy: &BucketPolicy, now: Instant) -> bool {
        self.refill(policy, now);
        if self.tokens > 0 {
            self.tokens -= 1;
            true
        } else {
            false
        }
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_refill)
    }
}

/// Decides, per client key, whether a request may proceed
#[derive(Debug)]
pub struct AdmissionController {
    buckets: DashMap<String, TokenBucket>,
    policy: BucketPolicy,
    idle_ttl: Duration,
    sweep_interval: Duration,
    last_sweep: Mutex<Instant>,
    clock: Arc<dyn Clock>,
}

impl AdmissionController {
    /// Default idle time after which a bucket is evicted
    pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(600);

    /// Default minimum spacing between opportunistic sweeps
    pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

    /// Create a controller using the system clock and default eviction settings
    pub fn new(policy: BucketPolicy) -> Self {
        Self::with_clock(policy, Arc::new(SystemClock))
    }

    /// Create a controller driven by the given clock
    pub fn with_clock(policy: BucketPolicy, clock: Arc<dyn Clock>) -> Self {
        let now = clock.monotonic_now();
        Self {
            buckets: DashMap::new(),
            policy,
            idle_ttl: Self::DEFAULT_IDLE_TTL,
            sweep_interval: Self::DEFAULT_SWEEP_INTERVAL,
            last_sweep: Mutex::new(now),
            clock,
        }
    }

    /// Build a controller from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configured burst or refill interval is zero
    pub fn from_config(config: &AdmissionConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.policy()?)
            .idle_ttl(config.idle_ttl)
            .sweep_interval(config.sweep_interval))
    }

    /// Set how long a bucket may sit unused before it is evicted
    pub fn idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    /// Set the minimum spacing between sweeps triggered from [`allow`](Self::allow)
    pub fn sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }

    /// Replace the time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        *self.last_sweep.get_mut() = clock.monotonic_now();
        self.clock = clock;
        self
    }

    /// Spend one token from `client_key`'s bucket if one is available
    ///
    /// Any string is a valid key. The empty key is an ordinary bucket
    /// shared by every client that could not be identified.
    pub fn allow(&self, client_key: &str) -> bool {
        let now = self.clock.monotonic_now();

        // Must run before any shard guard below is taken
        self.maybe_sweep(now);

        let allowed = if let Some(mut bucket) = self.buckets.get_mut(client_key) {
            bucket.try_take(&self.policy, now)
        } else {
            let mut bucket = self
                .buckets
                .entry(client_key.to_string())
                .or_insert_with(|| TokenBucket::full(&self.policy, now));
            bucket.try_take(&self.policy, now)
        };

        if !allowed {
            trace!(client_key, "Bucket empty");
        }
        allowed
    }

    /// Remove buckets idle longer than the effective TTL, returning how many
    pub fn evict_idle(&self) -> usize {
        self.evict_at(self.clock.monotonic_now())
    }

    /// Idle time after which a bucket is evicted
    ///
    /// The larger of the configured idle TTL and the policy's full refill time.
    pub fn effective_idle_ttl(&self) -> Duration {
        self.idle_ttl.max(self.policy.full_refill_time())
    }

    /// Number of client keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }

    /// Forget one client's bucket
    pub fn reset(&self, client_key: &str) {
        self.buckets.remove(client_key);
    }

    /// Forget every bucket
    pub fn reset_all(&self) {
        self.buckets.clear();
    }

    /// The policy applied to every bucket
    pub fn policy(&self) -> BucketPolicy {
        self.policy
    }

    /// Evict idle buckets every `period` on the tokio runtime
    ///
    /// The task holds only a weak reference and exits once the controller
    /// is dropped. A zero `period` is raised to one millisecond.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn_eviction_task(self: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let controller: Weak<Self> = Arc::downgrade(self);
        // interval() panics on a zero period
        let period = period.max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(controller) = controller.upgrade() else {
                    debug!("Admission controller dropped, stopping eviction task");
                    break;
                };
                controller.evict_idle();
            }
        })
    }

    fn maybe_sweep(&self, now: Instant) {
        let Some(mut last_sweep) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last_sweep) < self.sweep_interval {
            return;
        }
        *last_sweep = now;
        drop(last_sweep);

        self.evict_at(now);
    }

    fn evict_at(&self, now: Instant) -> usize {
        let ttl = self.effective_idle_ttl();
        let mut evicted = 0;
        self.buckets.retain(|_, bucket| {
            let keep = bucket.idle_for(now) < ttl;
            if !keep {
                evicted += 1;
            }
            keep
        });

        if evicted > 0 {
            gateway_metrics::record_evictions(evicted);
            debug!(
                evicted,
                remaining = self.buckets.len(),
                "Evicted idle admission buckets"
            );
        }
        evicted
    }
}
