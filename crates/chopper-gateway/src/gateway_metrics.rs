//! Gateway metrics
//!
//! Enable with the `metrics` feature flag. A `metrics` recorder must be
//! installed by the application for anything to be exported.
//!
//! ## Metrics Provided
//!
//! - `chopper_gateway_decisions_total` - Counter of gateway decisions (labels: outcome)
//! - `chopper_gateway_evicted_buckets_total` - Counter of idle admission buckets removed
//!
//! `outcome` is `admitted` or one of the rejection reasons: `rate_limited`,
//! `missing_token`, `malformed_header`, or the token failure class such as
//! `expired` or `signature_mismatch`.

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter};

#[cfg(feature = "metrics")]
use std::sync::Once;

#[cfg(feature = "metrics")]
static INIT: Once = Once::new();

/// Register metric descriptions. Safe to call more than once.
#[cfg(feature = "metrics")]
pub fn init_gateway_metrics() {
    INIT.call_once(|| {
        describe_counter!(
            "chopper_gateway_decisions_total",
            "Gateway decisions by outcome"
        );
        describe_counter!(
            "chopper_gateway_evicted_buckets_total",
            "Idle admission buckets evicted"
        );
    });
}

/// Record one gateway decision
#[cfg(feature = "metrics")]
pub(crate) fn record_decision(outcome: &'static str) {
    counter!("chopper_gateway_decisions_total", "outcome" => outcome).increment(1);
}

/// Record evicted admission buckets
#[cfg(feature = "metrics")]
pub(crate) fn record_evictions(count: usize) {
    counter!("chopper_gateway_evicted_buckets_total").increment(count as u64);
}

#[cfg(not(feature = "metrics"))]
#[allow(missing_docs)]
pub fn init_gateway_metrics() {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_decision(_outcome: &'static str) {}

#[cfg(not(feature = "metrics"))]
pub(crate) fn record_evictions(_count: usize) {}
