//! Swappable capabilities used around the gateway
//!
//! Password hashing and id generation sit behind narrow traits so the
//! login flow and the token authority can be exercised with deterministic
//! substitutes. Token signing has its own trait in
//! [`authority::signer`](crate::authority::signer).

use std::fmt;

use tracing::debug;
use uuid::Uuid;

use crate::error::CredentialError;

/// One-way password hashing
pub trait PasswordHasher: Send + Sync + fmt::Debug {
    /// Hash a plaintext password for storage
    ///
    /// # Errors
    ///
    /// Returns error if the hashing backend fails
    fn hash(&self, password: &str) -> Result<String, CredentialError>;

    /// Check a plaintext password against a stored hash
    ///
    /// `Ok(false)` means a well-formed hash that does not match.
    ///
    /// # Errors
    ///
    /// Returns error if the stored hash cannot be parsed
    fn verify(&self, password: &str, hash: &str) -> Result<bool, CredentialError>;
}

/// bcrypt-backed [`PasswordHasher`]
#[derive(Debug, Clone, Copy)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    /// Create a hasher with an explicit work factor (4..=31)
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// The configured work factor
    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for BcryptHasher {
    fn hash(&self, password: &str) -> Result<String, CredentialError> {
        Ok(bcrypt::hash(password, self.cost)?)
    }

    fn verify(&self, password: &str, hash: &str) -> Result<bool, CredentialError> {
        let matched = bcrypt::verify(password, hash)?;
        if !matched {
            debug!("password hash mismatch");
        }
        Ok(matched)
    }
}

/// Source of fresh unique identifiers
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Produce an identifier never returned before
    fn new_id(&self) -> Uuid;
}

/// Random v4 UUIDs
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn new_id(&self) -> Uuid {
        Uuid::new_v4()
    }
}
