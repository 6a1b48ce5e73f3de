//! Bearer tokens on demand.
//!
//! Hands out the current session's ID token, refreshing it through the
//! identity provider when it is inside the refresh margin. Concurrent callers
//! share a single refresh.

use chrono::Duration;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::AuthError;
use crate::provider::IdentityProvider;
use crate::session::Session;
use crate::store::{AuthState, ProviderEvent, SessionStore};

/// Supplies bearer tokens for outgoing requests.
#[derive(Clone)]
pub struct TokenProvider {
    provider: Arc<dyn IdentityProvider>,
    store: SessionStore,
    refresh_margin: Duration,
    refresh_lock: Arc<Mutex<()>>,
}

impl TokenProvider {
    /// Creates a token provider reading from `store`.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        store: SessionStore,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            provider,
            store,
            refresh_margin,
            refresh_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns a valid token, or `None` when no one is signed in.
    ///
    /// # Errors
    ///
    /// Returns the mapped provider error when a needed refresh fails. The
    /// session is destroyed in that case.
    pub async fn current_token(&self) -> Result<Option<String>, AuthError> {
        let Some(session) = self.authenticated().await else {
            return Ok(None);
        };
        if !session.needs_refresh(self.refresh_margin) {
            return Ok(session.token().map(str::to_string));
        }

        let _refreshing = self.refresh_lock.lock().await;

        // Another caller may have refreshed, or a new sign-in started, while
        // we waited.
        let Some(session) = self.authenticated().await else {
            return Ok(None);
        };
        if !session.needs_refresh(self.refresh_margin) {
            return Ok(session.token().map(str::to_string));
        }
        self.refresh(&session).await
    }

    /// Returns an `Authorization` header value for the current token.
    ///
    /// # Errors
    ///
    /// Same as [`current_token`](Self::current_token).
    pub async fn authorization_header(&self) -> Result<Option<String>, AuthError> {
        Ok(self
            .current_token()
            .await?
            .map(|token| format!("Bearer {token}")))
    }

    async fn authenticated(&self) -> Option<Session> {
        let state = match self.store.state() {
            AuthState::Resolving => self.store.wait_until_settled().await,
            state => state,
        };
        match state {
            AuthState::Authenticated(session) => Some(session),
            _ => None,
        }
    }

    async fn refresh(&self, session: &Session) -> Result<Option<String>, AuthError> {
        let Some(refresh_token) = session.refresh_token() else {
            if session.is_expired() {
                info!(user_id = %session.user_id(), "token expired and cannot be refreshed");
                self.store.apply(ProviderEvent::SignedOut).await;
                return Ok(None);
            }
            return Ok(session.token().map(str::to_string));
        };

        debug!(user_id = %session.user_id(), "refreshing token");
        match self.provider.refresh(refresh_token).await {
            Ok(mut principal) => {
                principal.email = principal.email.or_else(|| session.email().map(str::to_string));
                principal.display_name = principal
                    .display_name
                    .or_else(|| session.display_name().map(str::to_string));
                principal.refresh_token = principal
                    .refresh_token
                    .or_else(|| Some(refresh_token.to_string()));
                let state = self.store.apply(ProviderEvent::SignedIn(principal)).await;
                Ok(state.session().and_then(Session::token).map(str::to_string))
            }
            Err(e) => {
                warn!(user_id = %session.user_id(), error = %e, "token refresh failed");
                self.store.apply(ProviderEvent::SignedOut).await;
                Err(e.into())
            }
        }
    }
}
