//! Credential gateway.
//!
//! Every operation returns one `Result` with a user-facing [`AuthError`].
//! Local validation runs before any network call. The gateway never decides
//! navigation; callers act on the outcome.

use regex::Regex;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::AccessConfig;
use crate::error::{AuthError, ProviderError};
use crate::profile::{PasswordDigest, ProfileStore, UserProfile};
use crate::provider::IdentityProvider;
use crate::session::{Principal, Session};
use crate::store::{AuthState, ProviderEvent, SessionStore};
use crate::token::TokenProvider;

/// Returns true if `email` looks like an address.
#[must_use]
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email.trim()))
}

/// Input to [`CredentialGateway::signup`].
#[derive(Clone, Default)]
pub struct SignupRequest {
    pub email: String,
    pub password: String,
    /// Repeated password, when the form asks for one.
    pub confirm_password: Option<String>,
    pub display_name: Option<String>,
}

impl std::fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupRequest")
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Result of a successful signup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupOutcome {
    /// Session, when verified email is not required for login.
    pub session: Option<Session>,
    /// Whether a verification email went out.
    pub verification_sent: bool,
    /// Whether the profile mirror was written.
    pub profile_saved: bool,
}

/// Result of a successful password change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordUpdateOutcome {
    /// Whether the profile mirror received the new digest.
    pub profile_updated: bool,
}

/// Login, signup, logout, and password operations.
#[derive(Clone)]
pub struct CredentialGateway {
    provider: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileStore>,
    store: SessionStore,
    tokens: TokenProvider,
    require_verified_email: bool,
    send_verification_email: bool,
}

impl CredentialGateway {
    /// Creates a gateway.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileStore>,
        store: SessionStore,
        tokens: TokenProvider,
        config: &AccessConfig,
    ) -> Self {
        Self {
            provider,
            profiles,
            store,
            tokens,
            require_verified_email: config.require_verified_email,
            send_verification_email: config.send_verification_email,
        }
    }

    /// Signs in with email and password.
    ///
    /// # Errors
    ///
    /// `InvalidEmailFormat` before any network call, `EmailNotVerified` when
    /// verification is required and missing, the mapped provider error on
    /// rejection, and `Unknown(ROLE_RESOLUTION_FAILED)` when roles could not
    /// be resolved.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let email = email.trim();
        if !valid_email(email) {
            return Err(AuthError::InvalidEmailFormat);
        }

        let principal = self
            .provider
            .sign_in_with_password(email, password)
            .await
            .map_err(|e| rejected("login", e))?;

        if self.require_verified_email {
            let account = self
                .provider
                .lookup_account(principal.id_token.expose_unchecked())
                .await
                .map_err(|e| rejected("account lookup", e))?;
            if account.disabled {
                info!(user_id = %principal.user_id, "login refused, account disabled");
                return Err(AuthError::AccountDisabled);
            }
            if !account.email_verified {
                info!(user_id = %principal.user_id, "login refused, email not verified");
                return Err(AuthError::EmailNotVerified);
            }
        }

        self.establish(principal).await
    }

    /// Registers a new account.
    ///
    /// # Errors
    ///
    /// `PasswordMismatch`, `PasswordRequired`, and `InvalidEmailFormat`
    /// before any network call; the mapped provider error on rejection.
    #[instrument(skip(self, request), fields(email = %request.email.trim()))]
    pub async fn signup(&self, request: SignupRequest) -> Result<SignupOutcome, AuthError> {
        if let Some(confirm) = &request.confirm_password {
            if request.password.trim() != confirm.trim() {
                return Err(AuthError::PasswordMismatch);
            }
        }
        if request.password.trim().is_empty() {
            return Err(AuthError::PasswordRequired);
        }
        let email = request.email.trim();
        if !valid_email(email) {
            return Err(AuthError::InvalidEmailFormat);
        }

        let principal = self
            .provider
            .sign_up(email, &request.password)
            .await
            .map_err(|e| rejected("signup", e))?;
        let principal = principal.with_display_name(
            request
                .display_name
                .clone()
                .filter(|name| !name.trim().is_empty()),
        );
        let id_token = principal.id_token.expose_unchecked().to_string();
        info!(user_id = %principal.user_id, "account created");

        let verification_sent = if self.send_verification_email {
            match self.provider.send_email_verification(&id_token).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(user_id = %principal.user_id, error = %e, "verification email not sent");
                    false
                }
            }
        } else {
            false
        };

        let profile_saved = self
            .mirror_new_profile(&id_token, &principal, &request.password)
            .await;

        let session = if self.require_verified_email {
            None
        } else {
            Some(self.establish(principal).await?)
        };

        Ok(SignupOutcome {
            session,
            verification_sent,
            profile_saved,
        })
    }

    /// Signs out. Safe to call when no one is signed in.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        let refresh_token = match self.store.state() {
            AuthState::Authenticated(session) => session.refresh_token().map(str::to_string),
            _ => None,
        };
        if let Err(e) = self.provider.sign_out(refresh_token.as_deref()).await {
            warn!(error = %e, "provider sign-out failed");
        }
        self.store.apply(ProviderEvent::SignedOut).await;
    }

    /// Sends a password-reset email.
    ///
    /// An unknown or disabled address is reported as success so the outcome
    /// does not reveal which addresses have accounts.
    ///
    /// # Errors
    ///
    /// `InvalidEmailFormat` before any network call; the mapped provider
    /// error for other rejections.
    #[instrument(skip(self))]
    pub async fn reset_password(&self, email: &str) -> Result<(), AuthError> {
        let email = email.trim();
        if !valid_email(email) {
            return Err(AuthError::InvalidEmailFormat);
        }
        match self.provider.send_password_reset(email).await {
            Ok(()) => Ok(()),
            Err(e)
                if matches!(
                    e.code(),
                    Some("EMAIL_NOT_FOUND" | "USER_NOT_FOUND" | "USER_DISABLED")
                ) =>
            {
                debug!(code = e.code(), "password reset not sent");
                Ok(())
            }
            Err(e) => Err(rejected("password reset", e)),
        }
    }

    /// Changes the signed-in user's password.
    ///
    /// # Errors
    ///
    /// `PasswordRequired` before any network call, `NotAuthenticated` without
    /// a session, and the mapped provider error on rejection.
    #[instrument(skip(self, new_password))]
    pub async fn update_password(
        &self,
        new_password: &str,
    ) -> Result<PasswordUpdateOutcome, AuthError> {
        if new_password.trim().is_empty() {
            return Err(AuthError::PasswordRequired);
        }
        let Some(id_token) = self.tokens.current_token().await? else {
            return Err(AuthError::NotAuthenticated);
        };
        let current = self.store.session();

        let mut principal = self
            .provider
            .update_password(&id_token, new_password)
            .await
            .map_err(|e| rejected("password update", e))?;
        if let Some(current) = &current {
            principal.email = principal.email.or_else(|| current.email().map(str::to_string));
            principal.display_name = principal
                .display_name
                .or_else(|| current.display_name().map(str::to_string));
            principal.refresh_token = principal
                .refresh_token
                .or_else(|| current.refresh_token().map(str::to_string));
        }
        let fresh_token = principal.id_token.expose_unchecked().to_string();
        let user_id = principal.user_id.clone();
        info!(user_id = %user_id, "password changed");

        self.store.apply(ProviderEvent::SignedIn(principal)).await;

        let profile_updated = match PasswordDigest::compute(new_password) {
            Ok(digest) => match self
                .profiles
                .update_password(&fresh_token, &user_id, &digest)
                .await
            {
                Ok(()) => true,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "profile password not updated");
                    false
                }
            },
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "profile password not updated");
                false
            }
        };

        Ok(PasswordUpdateOutcome { profile_updated })
    }

    async fn establish(&self, principal: Principal) -> Result<Session, AuthError> {
        match self.store.apply(ProviderEvent::SignedIn(principal)).await {
            AuthState::Authenticated(session) => Ok(session),
            _ => Err(AuthError::unknown(AuthError::ROLE_RESOLUTION_FAILED)),
        }
    }

    async fn mirror_new_profile(&self, id_token: &str, principal: &Principal, password: &str) -> bool {
        let digest = match PasswordDigest::compute(password) {
            Ok(digest) => digest,
            Err(e) => {
                warn!(user_id = %principal.user_id, error = %e, "profile not saved");
                return false;
            }
        };
        let profile = UserProfile::new(principal.user_id.clone())
            .with_email(principal.email.clone())
            .with_display_name(principal.display_name.clone())
            .with_password_hash(digest);
        match self.profiles.save_profile(id_token, &profile).await {
            Ok(()) => true,
            Err(e) => {
                warn!(user_id = %principal.user_id, error = %e, "profile not saved");
                false
            }
        }
    }
}

fn rejected(operation: &str, err: ProviderError) -> AuthError {
    debug!(operation, error = %err, "identity provider call failed");
    err.into()
}
