//! Session types for the signed-in principal.
//!
//! A `Principal` is what the identity provider hands back after a
//! credential exchange. A `Session` is a principal whose roles have been
//! resolved. Both carry a `BearerToken` whose validity ends at a fixed
//! instant; once that instant passes, the token is never handed out again.

use chrono::{DateTime, Duration, Utc};
use school_manager_core::UserId;
use std::fmt;

use crate::role::{Role, RoleSet};

/// Opaque bearer credential with a finite validity window.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken {
    secret: String,
    expires_at: DateTime<Utc>,
}

impl BearerToken {
    /// Creates a token that is valid until `expires_at` (exclusive).
    #[must_use]
    pub fn new(secret: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// Creates a token that expires `lifetime` from now.
    #[must_use]
    pub fn expiring_in(secret: impl Into<String>, lifetime: Duration) -> Self {
        Self::new(secret, Utc::now() + lifetime)
    }

    /// Returns the token value, or `None` once it has expired.
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        if self.is_expired() {
            None
        } else {
            Some(&self.secret)
        }
    }

    /// Returns the token value regardless of expiry.
    ///
    /// Only the session cache and role resolution read an unchecked token.
    pub(crate) fn expose_unchecked(&self) -> &str {
        &self.secret
    }

    /// Returns the expiration instant.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Returns true at or after the expiration instant.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Returns true if the token is invalid at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Returns true if the token expires within `margin` of now.
    #[must_use]
    pub fn expires_within(&self, margin: Duration) -> bool {
        self.is_expired_at(Utc::now() + margin)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// An identity reported by the provider after a successful credential exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Provider-assigned account identifier.
    pub user_id: UserId,
    /// Account email, when the provider has one.
    pub email: Option<String>,
    /// Display name, when set on the account.
    pub display_name: Option<String>,
    /// ID token for calls made on the user's behalf.
    pub id_token: BearerToken,
    /// Long-lived token used to mint new ID tokens.
    pub refresh_token: Option<String>,
}

impl Principal {
    /// Creates a principal with the required fields.
    #[must_use]
    pub fn new(user_id: UserId, id_token: BearerToken) -> Self {
        Self {
            user_id,
            email: None,
            display_name: None,
            id_token,
            refresh_token: None,
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

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: Option<String>) -> Self {
        self.refresh_token = refresh_token;
        self
    }
}

/// An authenticated session: a principal plus its resolved roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user_id: UserId,
    email: Option<String>,
    display_name: Option<String>,
    roles: RoleSet,
    token: BearerToken,
    refresh_token: Option<String>,
}

impl Session {
    /// Creates a session for a principal with the given roles.
    #[must_use]
    pub fn new(principal: Principal, roles: RoleSet) -> Self {
        Self {
            user_id: principal.user_id,
            email: principal.email,
            display_name: principal.display_name,
            roles,
            token: principal.id_token,
            refresh_token: principal.refresh_token,
        }
    }

    /// Returns the authenticated user's ID.
    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// Returns the account email, if known.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns the display name, if known.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Returns the session's roles.
    #[must_use]
    pub fn roles(&self) -> &RoleSet {
        &self.roles
    }

    /// Returns the bearer token, or `None` once it has expired.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.secret()
    }

    /// Returns the token's expiration instant.
    #[must_use]
    pub fn token_expiration(&self) -> DateTime<Utc> {
        self.token.expires_at()
    }

    /// Returns the refresh token, if the provider issued one.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    /// Returns true once the token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.token.is_expired()
    }

    /// Returns true if the token expires within `margin`.
    #[must_use]
    pub fn needs_refresh(&self, margin: Duration) -> bool {
        self.token.expires_within(margin)
    }

    /// Returns true if the session holds at least one of `allowed`.
    #[must_use]
    pub fn has_any_role(&self, allowed: &[Role]) -> bool {
        self.roles.intersects(allowed)
    }

    pub(crate) fn bearer(&self) -> &BearerToken {
        &self.token
    }

    /// Rebuilds the principal this session was created from.
    #[must_use]
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            id_token: self.token.clone(),
            refresh_token: self.refresh_token.clone(),
        }
    }
}
