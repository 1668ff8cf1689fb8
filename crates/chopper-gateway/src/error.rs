//! Error types for the request gateway
//!
//! Each concern gets its own error enum so callers can match on exactly the
//! failures they care about:
//!
//! - [`VerifyError`] - why a bearer token was refused (classified, internal)
//! - [`SigningError`] - token issuance failed
//! - [`ConfigError`] - the gateway cannot be constructed (fatal at startup)
//! - [`CredentialError`] - password hashing backend failure
//!
//! Admission denial has no error type; `AdmissionController::allow` returns
//! a plain `bool`.

use std::path::PathBuf;

use thiserror::Error;

/// Classified token verification failure
///
/// The classes are checked in a fixed order (structure/signature, expiry,
/// issuer, audience) and the first failing check wins. All of them collapse
/// into one client-visible "invalid token" response; the class is kept for
/// logging and tests.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum VerifyError {
    /// The token could not be parsed (segments, base64, JSON, claim shape)
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Signature did not match, or the token declares a different algorithm
    #[error("token signature mismatch")]
    SignatureMismatch,

    /// `now >= exp`
    #[error("token expired")]
    Expired,

    /// The `iss` claim is not the configured issuer
    #[error("unexpected token issuer: {0}")]
    WrongIssuer(String),

    /// The configured audience is not listed in the `aud` claim
    #[error("token audience does not include this service")]
    WrongAudience,
}

impl VerifyError {
    /// Whether this failure means the token bytes themselves are not what
    /// the authority produced (as opposed to a well-formed, genuine token
    /// that is stale or meant for someone else).
    pub fn is_integrity_failure(&self) -> bool {
        matches!(self, Self::Malformed(_) | Self::SignatureMismatch)
    }

    /// Short, stable label used in logs and metrics
    pub fn class(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::SignatureMismatch => "signature_mismatch",
            Self::Expired => "expired",
            Self::WrongIssuer(_) => "wrong_issuer",
            Self::WrongAudience => "wrong_audience",
        }
    }
}

/// Token issuance failure
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SigningError {
    /// The signing backend rejected the claims or key
    #[error("failed to sign token: {0}")]
    Encode(#[from] jsonwebtoken::errors::Error),

    /// The system clock is before the unix epoch
    #[error("system clock is before the unix epoch")]
    ClockBeforeEpoch,
}

/// Gateway construction and configuration loading errors
///
/// These surface once, at startup, and are never retried.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// Signing secret is empty
    #[error("token signing secret must not be empty")]
    EmptySecret,

    /// A required string setting is empty
    #[error("`{0}` must not be empty")]
    EmptyField(&'static str),

    /// Token lifetime is shorter than the one-second claim resolution
    #[error("token expiration must be at least one second")]
    ExpirationTooShort,

    /// Bucket capacity of zero would reject every request
    #[error("burst capacity must be at least 1")]
    ZeroBurst,

    /// A zero refill interval has no meaningful rate
    #[error("refill interval must be greater than zero")]
    ZeroRefillInterval,

    /// Config file not found
    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    /// Unsupported file format
    #[error("unsupported configuration file format, use .toml, .yaml, .yml or .json")]
    UnsupportedFormat,

    /// Parsing or deserialization failed
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Password hashing backend failure
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum CredentialError {
    /// bcrypt rejected the input or the stored hash
    #[error("password hashing failed: {0}")]
    Bcrypt(#[from] bcrypt::BcryptError),
}
