//! # Chopper Gateway
//!
//! The request gateway that sits in front of the chopper journaling API.
//! Every request passes two gates before it reaches business logic:
//!
//! - **Admission control**: a per-client token bucket decides whether the
//!   request may proceed at all (429 when the bucket is empty).
//! - **Identity verification**: protected routes require a signed,
//!   time-bound bearer token issued by the same service (401 otherwise).
//!
//! ## Architecture
//!
//! - [`authority`] - [`TokenAuthority`] issues and verifies HS256 identity tokens
//! - [`admission`] - [`AdmissionController`] keeps one token bucket per client key
//! - [`pipeline`] - [`Gateway`] orders the two gates and classifies rejections
//! - [`tower`] - [`GatewayLayer`] runs the gateway as tower middleware
//! - [`config`] - [`GatewayConfig`] loading from files and environment
//! - [`capabilities`] - password hashing and id generation behind traits
//! - [`clock`] - injectable time source
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use chopper_gateway::{
//!     AdmissionController, BucketPolicy, Gateway, Role, RouteAccess, TokenAuthority,
//!     bearer_header_value,
//! };
//!
//! let authority = TokenAuthority::builder()
//!     .secret("0123456789abcdef0123456789abcdef")
//!     .issuer("chopper")
//!     .audience("chopper-web")
//!     .build()
//!     .unwrap();
//! let admission = AdmissionController::new(BucketPolicy::per_second(1, 5).unwrap());
//! let gateway = Gateway::new(authority, Arc::new(admission));
//!
//! let token = gateway.authority().issue("u1", "Ursula", Role::Standard).unwrap();
//! let header = bearer_header_value(&token).unwrap();
//!
//! let admission = gateway
//!     .admit("203.0.113.7", RouteAccess::Protected, Some(&header))
//!     .unwrap();
//! assert_eq!(admission.identity().unwrap().subject, "u1");
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics` - record gateway decisions with the `metrics` crate

pub mod admission;
pub mod authority;
pub mod capabilities;
pub mod clock;
pub mod config;
pub mod error;
pub mod gateway_metrics;
pub mod pipeline;
pub mod tower;

#[doc(inline)]
pub use admission::{AdmissionController, BucketPolicy};

#[doc(inline)]
pub use authority::{
    Hs256Signer, Identity, IdentityClaims, Role, TokenAuthority, TokenAuthorityBuilder,
    TokenSigner,
};

#[doc(inline)]
pub use capabilities::{BcryptHasher, IdGenerator, PasswordHasher, UuidGenerator};

#[doc(inline)]
pub use clock::{Clock, ManualClock, SystemClock};

#[doc(inline)]
pub use config::{AdmissionConfig, GatewayConfig, TokenConfig};

#[doc(inline)]
pub use error::{ConfigError, CredentialError, SigningError, VerifyError};

pub use gateway_metrics::init_gateway_metrics;

#[doc(inline)]
pub use pipeline::{
    Admission, BEARER_PREFIX, Gateway, Rejection, RouteAccess, bearer_header_value, parse_bearer,
};

#[doc(inline)]
pub use crate::tower::{
    ClientKeyExtractor, GatewayLayer, GatewayLayerConfig, GatewayService, IpKeyExtractor,
};
