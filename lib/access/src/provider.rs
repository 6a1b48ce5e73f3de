//! Identity provider port.
//!
//! The access crate depends only on outcomes: success or a provider error
//! code, an opaque token with an expiry, and a stable user id. Request and
//! response shapes belong to the adapter.

use async_trait::async_trait;
use school_manager_core::UserId;

use crate::error::ProviderError;
use crate::session::Principal;

/// Account state as reported by the provider's lookup call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// Provider-assigned account identifier.
    pub user_id: UserId,
    /// Account email, if any.
    pub email: Option<String>,
    /// Whether the email address has been verified.
    pub email_verified: bool,
    /// Whether the account is disabled.
    pub disabled: bool,
    /// Display name, if set.
    pub display_name: Option<String>,
}

/// Credential operations offered by an external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates an account and signs it in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Principal, ProviderError>;

    /// Exchanges an email and password for tokens.
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, ProviderError>;

    /// Sends an address-verification email to the account behind `id_token`.
    async fn send_email_verification(&self, id_token: &str) -> Result<(), ProviderError>;

    /// Sends a password-reset email.
    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError>;

    /// Looks up the account behind `id_token`.
    async fn lookup_account(&self, id_token: &str) -> Result<AccountInfo, ProviderError>;

    /// Changes the password; the provider returns fresh tokens.
    async fn update_password(
        &self,
        id_token: &str,
        new_password: &str,
    ) -> Result<Principal, ProviderError>;

    /// Mints a new ID token from a refresh token.
    async fn refresh(&self, refresh_token: &str) -> Result<Principal, ProviderError>;

    /// Ends the provider-side session.
    ///
    /// Providers whose tokens cannot be revoked by the client keep the default.
    async fn sign_out(&self, _refresh_token: Option<&str>) -> Result<(), ProviderError> {
        Ok(())
    }
}
