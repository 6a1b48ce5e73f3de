//! Application wiring and command handlers.
//!
//! `App::build` connects the access components to the Firebase adapters.
//! Every invocation restores the persisted session before running a command.

use school_manager_access::{
    AuthError, AuthState, ClaimsRoleResolver, CredentialGateway, FileSessionCache, GuardOutcome,
    IdentityProvider, ProfileStore, ProtectedRoute, RouteGuard, SessionStore, SignupRequest,
    TokenProvider,
};
use school_manager_core::Result;
use school_manager_firebase::{FirestoreProfileStore, IdentityToolkitClient};
use std::io::Write;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cli::Action;
use crate::config::CliConfig;
use crate::error::CliError;
use crate::routes::{declared_routes, describe_roles, find_route};

/// How a command finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Failure,
}

/// The wired client.
pub struct App {
    store: SessionStore,
    gateway: CredentialGateway,
    tokens: TokenProvider,
    guard: RouteGuard,
    profiles: Arc<dyn ProfileStore>,
    routes: Vec<ProtectedRoute>,
}

impl App {
    /// Wires the access components to Firebase.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn build(config: &CliConfig) -> Result<Self, CliError> {
        let http = config
            .firebase
            .http_client()
            .map_err(|e| CliError::Http {
                details: e.to_string(),
            })?;

        let identity: Arc<dyn IdentityProvider> = Arc::new(IdentityToolkitClient::new(
            http.clone(),
            config.firebase.clone(),
        ));
        let profiles: Arc<dyn ProfileStore> =
            Arc::new(FirestoreProfileStore::new(http, config.firebase.clone()));
        let store = SessionStore::new(
            identity.clone(),
            Arc::new(ClaimsRoleResolver::new(config.access.roles_claim.clone())),
            Arc::new(FileSessionCache::new(config.cache_path.clone())),
            config.access.role_resolution_timeout(),
        );
        let tokens = TokenProvider::new(
            identity.clone(),
            store.clone(),
            config.access.refresh_margin(),
        );
        let gateway = CredentialGateway::new(
            identity,
            profiles.clone(),
            store.clone(),
            tokens.clone(),
            &config.access,
        );
        let guard = RouteGuard::new(store.clone(), &config.access);

        Ok(Self {
            store,
            gateway,
            tokens,
            guard,
            profiles,
            routes: declared_routes(),
        })
    }

    /// Restores the persisted session.
    pub async fn restore(&self) -> AuthState {
        self.store.restore().await
    }

    /// Runs one command, writing its output to `out`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or output cannot be written.
    pub async fn run<W: Write>(
        &self,
        action: Action,
        out: &mut W,
    ) -> Result<Status, CliError> {
        match action {
            Action::Login { email, password } => self.login(&email, &password, out).await,
            Action::Signup(request) => self.signup(request, out).await,
            Action::Logout => {
                self.gateway.logout().await;
                writeln!(out, "Signed out.").map_err(CliError::from)?;
                Ok(Status::Success)
            }
            Action::ResetPassword { email } => {
                self.gateway
                    .reset_password(&email)
                    .await
                    .map_err(CliError::from)?;
                writeln!(
                    out,
                    "If an account exists for {}, a password reset link has been sent.",
                    email.trim()
                )
                .map_err(CliError::from)?;
                Ok(Status::Success)
            }
            Action::ChangePassword {
                password,
                confirm_password,
            } => self.change_password(&password, confirm_password.as_deref(), out).await,
            Action::WhoAmI => self.whoami(out).await,
            Action::Token => self.token(out).await,
            Action::Open { path } => self.open(&path, out).await,
            Action::Routes => {
                for route in &self.routes {
                    writeln!(out, "{:<20} {}", route.path, describe_roles(route))
                        .map_err(CliError::from)?;
                }
                Ok(Status::Success)
            }
        }
    }

    async fn login<W: Write>(
        &self,
        email: &str,
        password: &str,
        out: &mut W,
    ) -> Result<Status, CliError> {
        let session = self
            .gateway
            .login(email, password)
            .await
            .map_err(CliError::from)?;
        writeln!(
            out,
            "Signed in as {} with roles {}.",
            session.email().unwrap_or(email),
            session.roles()
        )
        .map_err(CliError::from)?;
        Ok(Status::Success)
    }

    async fn signup<W: Write>(
        &self,
        request: SignupRequest,
        out: &mut W,
    ) -> Result<Status, CliError> {
        let email = request.email.trim().to_string();
        let outcome = self.gateway.signup(request).await.map_err(CliError::from)?;
        writeln!(out, "Account created for {email}.").map_err(CliError::from)?;
        if outcome.verification_sent {
            writeln!(out, "Check your inbox to verify your email before logging in.")
                .map_err(CliError::from)?;
        }
        if !outcome.profile_saved {
            writeln!(out, "Warning: your profile could not be saved.").map_err(CliError::from)?;
        }
        if let Some(session) = outcome.session {
            writeln!(out, "Signed in as {}.", session.user_id()).map_err(CliError::from)?;
        }
        Ok(Status::Success)
    }

    async fn change_password<W: Write>(
        &self,
        password: &str,
        confirm_password: Option<&str>,
        out: &mut W,
    ) -> Result<Status, CliError> {
        if let Some(confirm) = confirm_password {
            if confirm.trim() != password.trim() {
                return Err(CliError::from(AuthError::PasswordMismatch).into());
            }
        }
        let outcome = self
            .gateway
            .update_password(password)
            .await
            .map_err(CliError::from)?;
        writeln!(out, "Password changed.").map_err(CliError::from)?;
        if !outcome.profile_updated {
            writeln!(out, "Warning: your profile could not be updated.")
                .map_err(CliError::from)?;
        }
        Ok(Status::Success)
    }

    async fn whoami<W: Write>(&self, out: &mut W) -> Result<Status, CliError> {
        let Some(session) = self.store.session() else {
            writeln!(out, "Not signed in.").map_err(CliError::from)?;
            return Ok(Status::Success);
        };
        writeln!(out, "user:    {}", session.user_id()).map_err(CliError::from)?;
        writeln!(out, "email:   {}", session.email().unwrap_or("-")).map_err(CliError::from)?;
        writeln!(out, "name:    {}", session.display_name().unwrap_or("-"))
            .map_err(CliError::from)?;
        writeln!(out, "roles:   {}", session.roles()).map_err(CliError::from)?;
        writeln!(
            out,
            "expires: {}",
            session.token_expiration().to_rfc3339()
        )
        .map_err(CliError::from)?;

        let profile = match self.tokens.current_token().await.map_err(CliError::from)? {
            Some(token) => self.profiles.get_profile(&token, session.user_id()).await,
            None => Ok(None),
        };
        let written = match profile {
            Ok(Some(profile)) => writeln!(
                out,
                "profile: created {}",
                profile.created_at.to_rfc3339()
            ),
            Ok(None) => writeln!(out, "profile: none"),
            Err(e) => {
                warn!(error = %e, "profile lookup failed");
                writeln!(out, "profile: unavailable")
            }
        };
        written.map_err(CliError::from)?;
        Ok(Status::Success)
    }

    async fn token<W: Write>(&self, out: &mut W) -> Result<Status, CliError> {
        match self.tokens.current_token().await.map_err(CliError::from)? {
            Some(token) => {
                writeln!(out, "{token}").map_err(CliError::from)?;
                Ok(Status::Success)
            }
            None => {
                info!("no session, no token");
                Ok(Status::Failure)
            }
        }
    }

    async fn open<W: Write>(&self, path: &str, out: &mut W) -> Result<Status, CliError> {
        let route = find_route(&self.routes, path).ok_or_else(|| CliError::UnknownView {
            path: path.to_string(),
        })?;
        let written = match self.guard.authorize(route, path).await {
            GuardOutcome::Granted(_) => writeln!(out, "granted"),
            GuardOutcome::Redirect(redirect) => writeln!(out, "redirect {redirect}"),
        };
        written.map_err(CliError::from)?;
        Ok(Status::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use school_manager_access::AccessConfig;
    use school_manager_firebase::FirebaseConfig;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn id_token(roles: &[&str]) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(json!({ "sub": "uid-1", "roles": roles }).to_string());
        format!("{header}.{payload}.signature")
    }

    fn config(server: &MockServer, dir: &tempfile::TempDir) -> CliConfig {
        CliConfig {
            firebase: FirebaseConfig::new("k", "school-manager").with_base_url(server.uri()),
            access: AccessConfig::default(),
            cache_path: dir.path().join("session.json"),
        }
    }

    async fn mock_firebase(server: &MockServer, roles: &[&str]) {
        Mock::given(method("POST"))
            .and(path("/v1/accounts:signInWithPassword"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "localId": "uid-1",
                "email": "t@school.test",
                "idToken": id_token(roles),
                "refreshToken": "refresh-1",
                "expiresIn": "3600"
            })))
            .mount(server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/accounts:lookup"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "users": [{ "localId": "uid-1", "email": "t@school.test", "emailVerified": true }]
            })))
            .mount(server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(server)
            .await;
    }

    async fn run(app: &App, action: Action) -> (Status, String) {
        let mut out = Vec::new();
        let status = app.run(action, &mut out).await.expect("command");
        (status, String::from_utf8(out).expect("utf8"))
    }

    #[tokio::test]
    async fn login_open_token_logout_flow() {
        let server = MockServer::start().await;
        mock_firebase(&server, &["teacher"]).await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app = App::build(&config(&server, &dir)).expect("app");
        app.restore().await;

        let (status, output) = run(
            &app,
            Action::Login {
                email: "t@school.test".to_string(),
                password: "pw".to_string(),
            },
        )
        .await;
        assert_eq!(status, Status::Success);
        assert!(output.contains("[teacher]"), "{output}");

        let (_, output) = run(
            &app,
            Action::Open {
                path: "/teacher/grades".to_string(),
            },
        )
        .await;
        assert_eq!(output.trim(), "granted");

        let (_, output) = run(
            &app,
            Action::Open {
                path: "/admin".to_string(),
            },
        )
        .await;
        assert_eq!(output.trim(), "redirect /dashboard");

        let (status, output) = run(&app, Action::Token).await;
        assert_eq!(status, Status::Success);
        assert_eq!(output.trim(), id_token(&["teacher"]));

        let (_, output) = run(&app, Action::WhoAmI).await;
        assert!(output.contains("uid-1"));
        assert!(output.contains("profile: none"));

        run(&app, Action::Logout).await;
        let (status, output) = run(&app, Action::Token).await;
        assert_eq!(status, Status::Failure);
        assert!(output.is_empty());

        let (_, output) = run(
            &app,
            Action::Open {
                path: "/admin".to_string(),
            },
        )
        .await;
        assert_eq!(output.trim(), "redirect /login?returnUrl=%2Fadmin");
    }

    #[tokio::test]
    async fn session_survives_restart() {
        let server = MockServer::start().await;
        mock_firebase(&server, &["student"]).await;
        let dir = tempfile::tempdir().expect("tempdir");

        let first = App::build(&config(&server, &dir)).expect("app");
        first.restore().await;
        run(
            &first,
            Action::Login {
                email: "t@school.test".to_string(),
                password: "pw".to_string(),
            },
        )
        .await;

        let second = App::build(&config(&server, &dir)).expect("app");
        let state = second.restore().await;
        assert!(matches!(state, AuthState::Authenticated(_)));
        let (_, output) = run(
            &second,
            Action::Open {
                path: "/student/progress".to_string(),
            },
        )
        .await;
        assert_eq!(output.trim(), "granted");
    }

    #[tokio::test]
    async fn unknown_view_is_an_error() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app = App::build(&config(&server, &dir)).expect("app");
        app.restore().await;

        let mut out = Vec::new();
        let result = app
            .run(
                Action::Open {
                    path: "/library".to_string(),
                },
                &mut out,
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mismatched_confirmation_never_reaches_provider() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app = App::build(&config(&server, &dir)).expect("app");
        app.restore().await;

        let mut out = Vec::new();
        let result = app
            .run(
                Action::ChangePassword {
                    password: "one".to_string(),
                    confirm_password: Some("two".to_string()),
                },
                &mut out,
            )
            .await;
        assert!(result.is_err());
        let requests = server.received_requests().await.expect("recorded");
        assert!(requests.is_empty());
    }

    #[tokio::test]
    async fn routes_lists_every_view() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().expect("tempdir");
        let app = App::build(&config(&server, &dir)).expect("app");

        let (_, output) = run(&app, Action::Routes).await;
        assert_eq!(output.lines().count(), declared_routes().len());
        assert!(output.contains("/admin"));
    }
}
