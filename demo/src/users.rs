//! In-memory account store

use std::sync::Arc;

use chopper_gateway::{CredentialError, IdGenerator, PasswordHasher, Role};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use uuid::Uuid;

/// A registered account
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    password_hash: String,
}

#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("username already taken")]
    UsernameTaken,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error(transparent)]
    Credential(#[from] CredentialError),
}

/// Accounts keyed by username
#[derive(Debug)]
pub struct UserStore {
    users: DashMap<String, User>,
    hasher: Arc<dyn PasswordHasher>,
    ids: Arc<dyn IdGenerator>,
}

impl UserStore {
    pub fn new(hasher: Arc<dyn PasswordHasher>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            users: DashMap::new(),
            hasher,
            ids,
        }
    }

    /// Create an account. Blocks on password hashing.
    pub fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<User, UserError> {
        if self.users.contains_key(username) {
            return Err(UserError::UsernameTaken);
        }
        let password_hash = self.hasher.hash(password)?;

        match self.users.entry(username.to_string()) {
            // Lost a race with a concurrent registration
            Entry::Occupied(_) => Err(UserError::UsernameTaken),
            Entry::Vacant(slot) => {
                let user = User {
                    id: self.ids.new_id(),
                    username: username.to_string(),
                    email: email.to_string(),
                    role: Role::Standard,
                    password_hash,
                };
                slot.insert(user.clone());
                Ok(user)
            }
        }
    }

    /// Check a username and password. Blocks on password hashing.
    ///
    /// Unknown users and wrong passwords are indistinguishable to the caller.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User, UserError> {
        let user = self
            .users
            .get(username)
            .map(|entry| entry.value().clone())
            .ok_or(UserError::InvalidCredentials)?;

        if self.hasher.verify(password, &user.password_hash)? {
            Ok(user)
        } else {
            Err(UserError::InvalidCredentials)
        }
    }

    /// Number of registered accounts
    pub fn count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chopper_gateway::{BcryptHasher, UuidGenerator};

    fn store() -> UserStore {
        UserStore::new(Arc::new(BcryptHasher::new(4)), Arc::new(UuidGenerator))
    }

    #[test]
    fn test_register_then_authenticate() {
        let users = store();
        let created = users.register("ursula", "u@example.com", "hunter22").unwrap();

        let found = users.authenticate("ursula", "hunter22").unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.email, "u@example.com");
        assert_eq!(found.role, Role::Standard);
        assert_eq!(users.count(), 1);
    }

    #[test]
    fn test_duplicate_username() {
        let users = store();
        users.register("ursula", "u@example.com", "a").unwrap();
        assert!(matches!(
            users.register("ursula", "other@example.com", "b"),
            Err(UserError::UsernameTaken)
        ));
    }

    #[test]
    fn test_bad_credentials() {
        let users = store();
        users.register("ursula", "u@example.com", "right").unwrap();

        assert!(matches!(
            users.authenticate("ursula", "wrong"),
            Err(UserError::InvalidCredentials)
        ));
        assert!(matches!(
            users.authenticate("nobody", "right"),
            Err(UserError::InvalidCredentials)
        ));
    }
}
