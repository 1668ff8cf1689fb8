//! The request gateway pipeline
//!
//! [`Gateway::admit`] runs the two gates every request passes through:
//!
//! 1. **Admission**: the client's token bucket must have a token left,
//!    otherwise the request is refused with 429 and identity is never looked at.
//! 2. **Identity** (protected routes only): the `Authorization` header must
//!    carry `Bearer <token>` and the token must verify.
//!
//! The outcome is either an [`Admission`], carrying the caller's
//! [`Identity`] on protected routes, or a [`Rejection`] that maps to exactly
//! one HTTP response. Rejected requests never reach business logic.

use std::sync::Arc;

use http::header::{CONTENT_TYPE, InvalidHeaderValue, WWW_AUTHENTICATE};
use http::{HeaderValue, Response, StatusCode};
use tracing::{debug, warn};

use crate::admission::AdmissionController;
use crate::authority::{Identity, TokenAuthority};
use crate::config::GatewayConfig;
use crate::error::{ConfigError, VerifyError};
use crate::gateway_metrics;

/// Authorization scheme prefix, including the separating space
pub const BEARER_PREFIX: &str = "Bearer ";

/// Whether a route requires a verified identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteAccess {
    /// Admission gate only
    Public,
    /// Admission gate, then identity gate
    Protected,
}

/// A request that passed every gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Public route, no identity evaluated
    Anonymous,
    /// Protected route with a verified caller
    Authenticated(Identity),
}

impl Admission {
    /// The verified caller, if any
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(identity) => Some(identity),
        }
    }

    /// Take the verified caller, if any
    pub fn into_identity(self) -> Option<Identity> {
        match self {
            Self::Anonymous => None,
            Self::Authenticated(identity) => Some(identity),
        }
    }
}

/// Why a request was refused
///
/// `Display` gives the internal description for logs. Clients only ever see
/// [`client_message`](Self::client_message), which does not distinguish
/// between token failure classes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Rejection {
    /// The client's bucket is empty
    #[error("rate limit exceeded")]
    RateLimited,

    /// Protected route without an `Authorization` header
    #[error("missing authorization header")]
    MissingToken,

    /// `Authorization` header is not `Bearer <token>`
    #[error("malformed authorization header")]
    MalformedHeader,

    /// Bearer token failed verification
    #[error("token rejected: {0}")]
    InvalidToken(VerifyError),
}

impl Rejection {
    /// HTTP status for this rejection
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::MissingToken | Self::MalformedHeader | Self::InvalidToken(_) => {
                StatusCode::UNAUTHORIZED
            }
        }
    }

    /// Message returned to the client
    pub fn client_message(&self) -> &'static str {
        match self {
            Self::RateLimited => "too many requests",
            Self::MissingToken => "no token",
            Self::MalformedHeader => "invalid authorization field",
            Self::InvalidToken(_) => "invalid token",
        }
    }

    /// Stable label for logs and metrics
    ///
    /// Token failures report their verification class.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::MissingToken => "missing_token",
            Self::MalformedHeader => "malformed_header",
            Self::InvalidToken(err) => err.class(),
        }
    }

    /// Build the HTTP response for this rejection
    ///
    /// JSON body `{"error": "<client message>"}`; 401 responses also carry
    /// `WWW-Authenticate: Bearer`.
    pub fn to_response<B>(&self) -> Response<B>
    where
        B: From<String>,
    {
        let body = serde_json::json!({ "error": self.client_message() }).to_string();
        let mut response = Response::new(B::from(body));
        *response.status_mut() = self.status();

        let headers = response.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if self.status() == StatusCode::UNAUTHORIZED {
            headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

/// Admission control and identity verification in front of business logic
///
/// Cheap to clone; clones share the same buckets and authority.
#[derive(Debug, Clone)]
pub struct Gateway {
    authority: TokenAuthority,
    admission: Arc<AdmissionController>,
}

impl Gateway {
    /// Compose a gateway from its two components
    pub fn new(authority: TokenAuthority, admission: Arc<AdmissionController>) -> Self {
        Self {
            authority,
            admission,
        }
    }

    /// Build both components from loaded configuration
    ///
    /// # Errors
    ///
    /// Returns error if the token or admission settings are invalid
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        let authority = TokenAuthority::from_config(&config.token)?;
        let admission = AdmissionController::from_config(&config.admission)?;
        Ok(Self::new(authority, Arc::new(admission)))
    }

    /// Decide whether a request may proceed
    ///
    /// `authorization` is the raw `Authorization` header value, if present.
    /// It is only looked at for [`RouteAccess::Protected`] routes, and only
    /// after the admission gate has let the request through.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] of the first gate that refuses the request
    pub fn admit(
        &self,
        client_key: &str,
        access: RouteAccess,
        authorization: Option<&HeaderValue>,
    ) -> Result<Admission, Rejection> {
        let decision = self.evaluate(client_key, access, authorization);

        match &decision {
            Ok(admission) => {
                gateway_metrics::record_decision("admitted");
                debug!(
                    client_key,
                    ?access,
                    subject = admission.identity().map(|id| id.subject.as_str()),
                    "Request admitted"
                );
            }
            Err(rejection @ Rejection::RateLimited) => {
                gateway_metrics::record_decision(rejection.reason());
                debug!(
                    client_key,
                    ?access,
                    reason = rejection.reason(),
                    status = rejection.status().as_u16(),
                    "Request rejected"
                );
            }
            Err(rejection) => {
                gateway_metrics::record_decision(rejection.reason());
                warn!(
                    client_key,
                    ?access,
                    reason = rejection.reason(),
                    status = rejection.status().as_u16(),
                    "Request rejected"
                );
            }
        }
        decision
    }

    fn evaluate(
        &self,
        client_key: &str,
        access: RouteAccess,
        authorization: Option<&HeaderValue>,
    ) -> Result<Admission, Rejection> {
        if !self.admission.allow(client_key) {
            return Err(Rejection::RateLimited);
        }

        if access == RouteAccess::Public {
            return Ok(Admission::Anonymous);
        }

        let header = authorization.ok_or(Rejection::MissingToken)?;
        let token = parse_bearer(header).ok_or(Rejection::MalformedHeader)?;
        let identity = self
            .authority
            .verify(token)
            .map_err(Rejection::InvalidToken)?;

        Ok(Admission::Authenticated(identity))
    }

    /// The token authority, for issuing tokens at login
    pub fn authority(&self) -> &TokenAuthority {
        &self.authority
    }

    /// The admission controller, for maintenance
    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value
///
/// The scheme match is exact and case-sensitive. The token must be
/// non-empty with no surrounding whitespace; non-UTF-8 values never parse.
pub fn parse_bearer(value: &HeaderValue) -> Option<&str> {
    let token = value.to_str().ok()?.strip_prefix(BEARER_PREFIX)?;
    if token.is_empty() || token.trim() != token {
        return None;
    }
    Some(token)
}

/// `Authorization` header value for a freshly issued token
///
/// # Errors
///
/// Returns error if the token contains bytes not allowed in a header value
pub fn bearer_header_value(token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut value = HeaderValue::from_str(&format!("{BEARER_PREFIX}{token}"))?;
    value.set_sensitive(true);
    Ok(value)
}
