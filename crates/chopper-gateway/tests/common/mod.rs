//! Common test utilities for integration tests
//!
//! Shared fixtures for building authorities, controllers and gateways
//! against a [`ManualClock`], plus token mangling helpers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chopper_gateway::{
    AdmissionController, BucketPolicy, Gateway, ManualClock, TokenAuthority,
};

pub const SECRET: &str = "test_secret_key_at_least_32_bytes_long_12345678";
pub const ISSUER: &str = "chopper";
pub const AUDIENCE: &str = "chopper-web";

/// Fresh manual clock at a fixed instant
pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::default())
}

/// Authority with the shared test settings and a one-hour lifetime
pub fn authority(clock: &Arc<ManualClock>) -> TokenAuthority {
    authority_with(SECRET, ISSUER, AUDIENCE, Duration::from_secs(3600), clock)
}

/// Authority with explicit settings
pub fn authority_with(
    secret: &str,
    issuer: &str,
    audience: &str,
    expiration: Duration,
    clock: &Arc<ManualClock>,
) -> TokenAuthority {
    TokenAuthority::builder()
        .secret(secret)
        .issuer(issuer)
        .audience(audience)
        .expiration(expiration)
        .clock(clock.clone())
        .build()
        .expect("valid authority settings")
}

/// Controller with `per_second` refill and `burst` capacity
pub fn controller(per_second: u32, burst: u32, clock: &Arc<ManualClock>) -> AdmissionController {
    let policy = BucketPolicy::per_second(per_second, burst).expect("valid policy");
    AdmissionController::with_clock(policy, clock.clone())
}

/// Gateway sharing one clock between its authority and its controller
pub fn gateway(per_second: u32, burst: u32, clock: &Arc<ManualClock>) -> Gateway {
    Gateway::new(
        authority(clock),
        Arc::new(controller(per_second, burst, clock)),
    )
}

/// Replace the character at `index` with a different base64url character
///
/// The result differs from the input at exactly that position.
pub fn replace_char_at(token: &str, index: usize) -> String {
    token
        .char_indices()
        .map(|(i, c)| {
            if i != index {
                c
            } else if c == 'A' {
                'B'
            } else {
                'A'
            }
        })
        .collect()
}

/// Change the first character of the signature segment
pub fn tamper_signature(token: &str) -> String {
    let signature_start = token.rfind('.').expect("three segments") + 1;
    replace_char_at(token, signature_start)
}
