//! Profile mirror port.
//!
//! A copy of identity data kept in the document database so other views can
//! list users without asking the identity provider. The mirror never holds a
//! plaintext password, only an argon2 PHC string.

use argon2::{Argon2, PasswordHasher, PasswordVerifier};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use password_hash::{PasswordHash, SaltString};
use school_manager_core::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ProfileError;
use crate::role::RoleSet;

/// Argon2 digest of a password in PHC string format.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PasswordDigest(String);

impl PasswordDigest {
    /// Hashes `password` with a fresh random salt.
    pub fn compute(password: &str) -> Result<Self, ProfileError> {
        let mut salt_bytes = [0u8; 16];
        getrandom::fill(&mut salt_bytes).map_err(|e| ProfileError::Hashing {
            details: e.to_string(),
        })?;
        let salt = SaltString::encode_b64(&salt_bytes).map_err(|e| ProfileError::Hashing {
            details: e.to_string(),
        })?;
        let phc = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| ProfileError::Hashing {
                details: e.to_string(),
            })?
            .to_string();
        Ok(Self(phc))
    }

    /// Wraps an existing PHC string, e.g. one read back from the store.
    #[must_use]
    pub fn from_phc(phc: impl Into<String>) -> Self {
        Self(phc.into())
    }

    /// Returns the PHC string.
    #[must_use]
    pub fn as_phc(&self) -> &str {
        &self.0
    }

    /// Returns true if `password` matches this digest.
    #[must_use]
    pub fn verify(&self, password: &str) -> bool {
        PasswordHash::new(&self.0).is_ok_and(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
    }
}

impl fmt::Debug for PasswordDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordDigest(<redacted>)")
    }
}

/// A mirrored user profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserProfile {
    pub user_id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    /// Informational copy; authorization reads roles from the token.
    pub roles: RoleSet,
    pub password_hash: Option<PasswordDigest>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Creates a profile for a newly registered account.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            email: None,
            display_name: None,
            roles: RoleSet::empty(),
            password_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.email = email;
        self
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, display_name: Option<String>) -> Self {
        self.display_name = display_name;
        self
    }

    /// Sets the password digest.
    #[must_use]
    pub fn with_password_hash(mut self, digest: PasswordDigest) -> Self {
        self.password_hash = Some(digest);
        self
    }
}

/// Document-database port for the profile mirror.
///
/// Every call carries the signed-in user's ID token; the store authorizes
/// requests against it.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Creates or replaces the profile document.
    async fn save_profile(&self, id_token: &str, profile: &UserProfile)
    -> Result<(), ProfileError>;

    /// Fetches a profile, or `None` if no document exists.
    async fn get_profile(
        &self,
        id_token: &str,
        user_id: &UserId,
    ) -> Result<Option<UserProfile>, ProfileError>;

    /// Replaces the stored password digest and bumps `updated_at`.
    async fn update_password(
        &self,
        id_token: &str,
        user_id: &UserId,
        digest: &PasswordDigest,
    ) -> Result<(), ProfileError>;
}
