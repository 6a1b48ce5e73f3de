//! Route guard.
//!
//! Navigation to a protected view passes two checks in order: a session must
//! exist, then the session must share at least one role with the route. The
//! role check never runs against an absent session.

use std::fmt;
use tracing::debug;

use crate::config::AccessConfig;
use crate::role::Role;
use crate::session::Session;
use crate::store::SessionStore;

/// Query parameter that carries the originally requested path to login.
pub const RETURN_URL_PARAM: &str = "returnUrl";

/// A view that requires a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtectedRoute {
    pub path: String,
    /// Roles allowed in; empty means any signed-in user.
    pub allowed_roles: Vec<Role>,
}

impl ProtectedRoute {
    /// A route open to any signed-in user.
    #[must_use]
    pub fn authenticated(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            allowed_roles: Vec::new(),
        }
    }

    /// A route open to users holding any of `roles`.
    #[must_use]
    pub fn for_roles(path: impl Into<String>, roles: &[Role]) -> Self {
        Self {
            path: path.into(),
            allowed_roles: roles.to_vec(),
        }
    }
}

/// Where to send a navigation that was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
    /// Path to come back to after login.
    pub return_to: Option<String>,
}

impl Redirect {
    /// Renders the redirect target, e.g. `/login?returnUrl=%2Fadmin`.
    #[must_use]
    pub fn location(&self) -> String {
        match &self.return_to {
            Some(path) => {
                let encoded: String = url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
                format!("{}?{RETURN_URL_PARAM}={encoded}", self.to)
            }
            None => self.to.clone(),
        }
    }
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.location())
    }
}

/// Result of evaluating a route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Granted(Session),
    Redirect(Redirect),
}

/// Evaluates protected routes against the session store.
#[derive(Clone)]
pub struct RouteGuard {
    store: SessionStore,
    login_path: String,
    landing_path: String,
}

impl RouteGuard {
    /// Creates a guard using the configured login and landing paths.
    #[must_use]
    pub fn new(store: SessionStore, config: &AccessConfig) -> Self {
        Self {
            store,
            login_path: config.login_path.clone(),
            landing_path: config.landing_path.clone(),
        }
    }

    /// Runs the authentication check, then the role check.
    pub async fn authorize(&self, route: &ProtectedRoute, requested_path: &str) -> GuardOutcome {
        let session = match self.check_authenticated(requested_path).await {
            Ok(session) => session,
            Err(redirect) => return GuardOutcome::Redirect(redirect),
        };
        match self.check_roles(route, &session) {
            Ok(()) => GuardOutcome::Granted(session),
            Err(redirect) => GuardOutcome::Redirect(redirect),
        }
    }

    /// Waits for the store to settle and requires a valid session.
    ///
    /// # Errors
    ///
    /// Returns a redirect to login carrying `requested_path`.
    pub async fn check_authenticated(&self, requested_path: &str) -> Result<Session, Redirect> {
        self.store.wait_until_settled().await;
        self.store.session().ok_or_else(|| {
            debug!(path = requested_path, "no session, redirecting to login");
            Redirect {
                to: self.login_path.clone(),
                return_to: Some(requested_path.to_string()),
            }
        })
    }

    /// Requires `session` to hold one of the route's roles.
    ///
    /// # Errors
    ///
    /// Returns a redirect to the landing view, without a return target.
    pub fn check_roles(&self, route: &ProtectedRoute, session: &Session) -> Result<(), Redirect> {
        if route.allowed_roles.is_empty() || session.has_any_role(&route.allowed_roles) {
            return Ok(());
        }
        debug!(
            path = %route.path,
            user_id = %session.user_id(),
            roles = %session.roles(),
            "missing role, redirecting to landing"
        );
        Err(Redirect {
            to: self.landing_path.clone(),
            return_to: None,
        })
    }
}
