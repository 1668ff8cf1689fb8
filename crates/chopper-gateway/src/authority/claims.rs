//! Identity token claims and the identity resolved from them

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// Caller role carried in the token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Role {
    /// Regular account holder
    #[serde(alias = "user")]
    Standard,
}

impl Role {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "standard" | "user" => Ok(Self::Standard),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Returned when parsing a role name that does not exist
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

/// Claims embedded in every identity token
///
/// Registered claims follow RFC 7519 naming. `aud` is always written as an
/// array; a bare string is accepted when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityClaims {
    /// Subject (opaque user id)
    pub sub: String,
    /// Display name
    pub name: String,
    /// Role
    pub role: Role,
    /// Issuer
    pub iss: String,
    /// Audience set
    #[serde(deserialize_with = "one_or_many")]
    pub aud: Vec<String>,
    /// Issued at (unix seconds)
    pub iat: u64,
    /// Expires at (unix seconds)
    pub exp: u64,
    /// Token id, unique per issued token
    pub jti: String,
}

impl IdentityClaims {
    /// Whether `audience` is one of the token's audiences
    pub fn has_audience(&self, audience: &str) -> bool {
        self.aud.iter().any(|a| a == audience)
    }

    /// The caller identity these claims describe
    pub fn identity(&self) -> Identity {
        Identity {
            subject: self.sub.clone(),
            display_name: self.name.clone(),
            role: self.role,
        }
    }
}

impl From<IdentityClaims> for Identity {
    fn from(claims: IdentityClaims) -> Self {
        Self {
            subject: claims.sub,
            display_name: claims.name,
            role: claims.role,
        }
    }
}

/// A verified caller, attached to the request for downstream handlers
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Subject identifier
    pub subject: String,
    /// Display name
    pub display_name: String,
    /// Role
    pub role: Role,
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(aud) => vec![aud],
        OneOrMany::Many(aud) => aud,
    })
}
