//! Identity token issuance and verification
//!
//! A [`TokenAuthority`] signs short-lived identity tokens after login and
//! verifies them on every protected request. It holds no per-token state:
//! everything needed to accept or refuse a token travels inside the token.
//!
//! Verification runs its checks in a fixed order and reports the first one
//! that fails:
//!
//! 1. structure and signature ([`VerifyError::Malformed`], [`VerifyError::SignatureMismatch`])
//! 2. expiry, `now >= exp` ([`VerifyError::Expired`])
//! 3. issuer ([`VerifyError::WrongIssuer`])
//! 4. audience membership ([`VerifyError::WrongAudience`])
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use chopper_gateway::authority::{Role, TokenAuthority};
//!
//! let authority = TokenAuthority::builder()
//!     .secret(b"0123456789abcdef0123456789abcdef")
//!     .issuer("chopper")
//!     .audience("chopper-web")
//!     .expiration(Duration::from_secs(3600))
//!     .build()
//!     .unwrap();
//!
//! let token = authority.issue("u1", "Ursula", Role::Standard).unwrap();
//! let identity = authority.verify(&token).unwrap();
//! assert_eq!(identity.subject, "u1");
//! ```

mod claims;
pub mod signer;

pub use claims::{Identity, IdentityClaims, Role, UnknownRole};
pub use signer::{Hs256Signer, TokenSigner};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::capabilities::{IdGenerator, UuidGenerator};
use crate::clock::{Clock, SystemClock};
use crate::config::TokenConfig;
use crate::error::{ConfigError, SigningError, VerifyError};

/// Secrets shorter than this are accepted but logged as weak
pub const RECOMMENDED_SECRET_LEN: usize = 32;

/// Issues and verifies signed identity tokens
///
/// Issuer, audience and expiration are fixed at construction. Cloning is
/// cheap and clones share the signer.
#[derive(Clone)]
pub struct TokenAuthority {
    signer: Arc<dyn TokenSigner>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    issuer: String,
    audience: String,
    expiration: Duration,
}

impl fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("signer", &self.signer)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    /// Start building an authority
    pub fn builder() -> TokenAuthorityBuilder {
        TokenAuthorityBuilder::default()
    }

    /// Build an HS256 authority from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the configuration fails [`TokenConfig::validate`]
    pub fn from_config(config: &TokenConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.secret_len() < RECOMMENDED_SECRET_LEN {
            warn!(
                secret_len = config.secret_len(),
                recommended = RECOMMENDED_SECRET_LEN,
                "Token signing secret is shorter than recommended"
            );
        }
        Self::builder()
            .signer(Hs256Signer::from_secret(&config.secret))
            .issuer(config.issuer.clone())
            .audience(config.audience.clone())
            .expiration(config.expiration)
            .build()
    }

    /// Issue a token for a caller whose credentials were already checked
    ///
    /// Every call produces a distinct token, even for identical inputs in
    /// the same second, because each carries a fresh `jti`.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The system clock is before the unix epoch
    /// - The signer fails to encode the claims
    pub fn issue(
        &self,
        subject: &str,
        display_name: &str,
        role: Role,
    ) -> Result<String, SigningError> {
        let iat = self.clock.unix_now().ok_or(SigningError::ClockBeforeEpoch)?;
        let claims = IdentityClaims {
            sub: subject.to_string(),
            name: display_name.to_string(),
            role,
            iss: self.issuer.clone(),
            aud: vec![self.audience.clone()],
            iat,
            exp: iat.saturating_add(self.expiration.as_secs()),
            jti: self.ids.new_id().to_string(),
        };

        let token = self.signer.sign(&claims)?;
        debug!(
            subject = %claims.sub,
            role = %claims.role,
            expires_at = claims.exp,
            "Issued identity token"
        );
        Ok(token)
    }

    /// Verify a token and return the identity it carries
    ///
    /// # Errors
    ///
    /// Same as [`verify_claims`](Self::verify_claims)
    pub fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        self.verify_claims(token).map(Identity::from)
    }

    /// Verify a token and return its full claim set
    ///
    /// # Errors
    ///
    /// Returns the first failing check, in this order:
    /// - Token is malformed or its signature does not match
    /// - Token is expired (`now >= exp`)
    /// - Issuer is not the configured issuer
    /// - Configured audience is not among the token's audiences
    pub fn verify_claims(&self, token: &str) -> Result<IdentityClaims, VerifyError> {
        let claims = self.signer.decode(token)?;

        // A clock before the epoch cannot vouch for anything: fail closed
        let now = self.clock.unix_now().unwrap_or(u64::MAX);
        if now >= claims.exp {
            return Err(VerifyError::Expired);
        }
        if claims.iss != self.issuer {
            return Err(VerifyError::WrongIssuer(claims.iss));
        }
        if !claims.has_audience(&self.audience) {
            return Err(VerifyError::WrongAudience);
        }

        Ok(claims)
    }

    /// Configured issuer
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Configured audience
    pub fn audience(&self) -> &str {
        &self.audience
    }

    /// Lifetime of issued tokens
    pub fn expiration(&self) -> Duration {
        self.expiration
    }
}

/// Builder for [`TokenAuthority`]
///
/// Either [`secret`](Self::secret) or [`signer`](Self::signer) must be set.
/// Clock and id generator default to the system clock and random UUIDs.
#[derive(Default)]
pub struct TokenAuthorityBuilder {
    secret: Option<Vec<u8>>,
    signer: Option<Arc<dyn TokenSigner>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    issuer: String,
    audience: String,
    expiration: Option<Duration>,
}

impl fmt::Debug for TokenAuthorityBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthorityBuilder")
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("signer", &self.signer)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

impl TokenAuthorityBuilder {
    /// Sign with HS256 using these key bytes
    pub fn secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        self.secret = Some(secret.as_ref().to_vec());
        self
    }

    /// Use a custom signer instead of a raw secret
    pub fn signer(mut self, signer: impl TokenSigner + 'static) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Set the issuer written into and required of every token
    pub fn issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = issuer.into();
        self
    }

    /// Set the audience written into and required of every token
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = audience.into();
        self
    }

    /// Set the token lifetime (at least one second)
    pub fn expiration(mut self, expiration: Duration) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Use a specific time source
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Use a specific token id source
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Validate settings and build the authority
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Issuer or audience is empty
    /// - Expiration is under one second
    /// - Neither a signer nor a non-empty secret was given
    pub fn build(self) -> Result<TokenAuthority, ConfigError> {
        if self.issuer.is_empty() {
            return Err(ConfigError::EmptyField("issuer"));
        }
        if self.audience.is_empty() {
            return Err(ConfigError::EmptyField("audience"));
        }
        let expiration = self.expiration.unwrap_or(TokenConfig::DEFAULT_EXPIRATION);
        if expiration < Duration::from_secs(1) {
            return Err(ConfigError::ExpirationTooShort);
        }

        let signer = match (self.signer, self.secret) {
            (Some(signer), _) => signer,
            (None, Some(secret)) if !secret.is_empty() => {
                if secret.len() < RECOMMENDED_SECRET_LEN {
                    warn!(
                        secret_len = secret.len(),
                        recommended = RECOMMENDED_SECRET_LEN,
                        "Token signing secret is shorter than recommended"
                    );
                }
                Arc::new(Hs256Signer::new(&secret)) as Arc<dyn TokenSigner>
            }
            (None, _) => return Err(ConfigError::EmptySecret),
        };

        Ok(TokenAuthority {
            signer,
            ids: self.ids.unwrap_or_else(|| Arc::new(UuidGenerator)),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            issuer: self.issuer,
            audience: self.audience,
            expiration,
        })
    }
}
