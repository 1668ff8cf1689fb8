//! Token signing backends
//!
//! [`TokenSigner`] owns the cryptography: producing the compact token and
//! checking structure plus signature on the way back in. Claim policy
//! (expiry, issuer, audience) stays in [`TokenAuthority`](super::TokenAuthority)
//! so it can be tested against any signer.

use std::fmt;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::{ExposeSecret, SecretString};

use super::claims::IdentityClaims;
use crate::error::{SigningError, VerifyError};

/// Produces and checks signed tokens
pub trait TokenSigner: Send + Sync + fmt::Debug {
    /// Sign the claims into a compact token string
    ///
    /// # Errors
    ///
    /// Returns error if the backend cannot encode the claims
    fn sign(&self, claims: &IdentityClaims) -> Result<String, SigningError>;

    /// Parse a token and verify its signature, without judging the claims
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Malformed`] or [`VerifyError::SignatureMismatch`]
    fn decode(&self, token: &str) -> Result<IdentityClaims, VerifyError>;
}

/// HMAC-SHA256 signer
///
/// Only HS256 is accepted on decode. A token whose header names any other
/// algorithm, symmetric or not, fails as [`VerifyError::SignatureMismatch`].
pub struct Hs256Signer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

// Keys never show up in debug output
impl fmt::Debug for Hs256Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hs256Signer")
            .field("algorithm", &Algorithm::HS256)
            .finish_non_exhaustive()
    }
}

impl Hs256Signer {
    /// Create a signer from raw key bytes
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Claim checks belong to the authority, in its own order and with its clock
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
        }
    }

    /// Create a signer from a configured secret string
    pub fn from_secret(secret: &SecretString) -> Self {
        Self::new(secret.expose_secret().as_bytes())
    }
}

impl TokenSigner for Hs256Signer {
    fn sign(&self, claims: &IdentityClaims) -> Result<String, SigningError> {
        Ok(encode(&Header::new(Algorithm::HS256), claims, &self.encoding)?)
    }

    fn decode(&self, token: &str) -> Result<IdentityClaims, VerifyError> {
        decode::<IdentityClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(classify)
    }
}

fn classify(error: jsonwebtoken::errors::Error) -> VerifyError {
    match error.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => VerifyError::SignatureMismatch,
        _ => VerifyError::Malformed(error.to_string()),
    }
}
