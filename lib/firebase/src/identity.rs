//! Identity Toolkit and Secure Token REST client.
//!
//! Implements [`IdentityProvider`] over the `accounts:*` endpoints and the
//! token refresh endpoint. Error bodies have the shape
//! `{"error":{"message":"CODE[ : detail]"}}`; the message is passed through
//! as the provider code.

use async_trait::async_trait;
use chrono::Duration;
use school_manager_access::{AccountInfo, BearerToken, IdentityProvider, Principal, ProviderError};
use school_manager_core::UserId;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::FirebaseConfig;

/// Lifetime Firebase gives ID tokens when a response omits `expiresIn`.
const DEFAULT_TOKEN_LIFETIME_SECONDS: i64 = 3600;

/// Identity provider backed by Firebase Authentication.
#[derive(Debug, Clone)]
pub struct IdentityToolkitClient {
    http: reqwest::Client,
    config: FirebaseConfig,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Body of `signUp`, `signInWithPassword`, and `update`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountTokens {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
}

/// Body of the Secure Token refresh call.
#[derive(Deserialize)]
struct RefreshedTokens {
    id_token: String,
    refresh_token: Option<String>,
    expires_in: Option<String>,
    user_id: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<LookupUser>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LookupUser {
    local_id: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    disabled: bool,
    display_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

impl IdentityToolkitClient {
    /// Creates a client using a shared HTTP client.
    #[must_use]
    pub fn new(http: reqwest::Client, config: FirebaseConfig) -> Self {
        Self { http, config }
    }

    async fn accounts<B, R>(&self, method: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let url = format!(
            "{}/v1/accounts:{method}",
            self.config.identity_toolkit_url()
        );
        debug!(method, "identity toolkit request");
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key())])
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        read_response(response).await
    }
}

async fn read_response<R: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<R, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => ProviderError::Rejected {
                code: envelope.error.message,
            },
            Err(_) => ProviderError::InvalidResponse {
                details: format!("HTTP {status}: {body}"),
            },
        });
    }
    response
        .json::<R>()
        .await
        .map_err(|e| ProviderError::InvalidResponse {
            details: e.to_string(),
        })
}

fn transport(e: reqwest::Error) -> ProviderError {
    ProviderError::Transport {
        details: e.to_string(),
    }
}

fn expiry(expires_in: Option<&str>) -> Result<Duration, ProviderError> {
    match expires_in {
        None => Ok(Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECONDS)),
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map(Duration::seconds)
            .map_err(|e| ProviderError::InvalidResponse {
                details: format!("expiresIn '{raw}': {e}"),
            }),
    }
}

impl AccountTokens {
    fn into_principal(self) -> Result<Principal, ProviderError> {
        let lifetime = expiry(self.expires_in.as_deref())?;
        let id_token = self.id_token.ok_or_else(|| ProviderError::InvalidResponse {
            details: "response carries no idToken".to_string(),
        })?;
        Ok(
            Principal::new(
                UserId::new(self.local_id),
                BearerToken::expiring_in(id_token, lifetime),
            )
            .with_email(self.email)
            .with_display_name(self.display_name.filter(|name| !name.is_empty()))
            .with_refresh_token(self.refresh_token),
        )
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkitClient {
    #[instrument(skip(self, password))]
    async fn sign_up(&self, email: &str, password: &str) -> Result<Principal, ProviderError> {
        let tokens: AccountTokens = self
            .accounts(
                "signUp",
                &PasswordCredentials {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        tokens.into_principal()
    }

    #[instrument(skip(self, password))]
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Principal, ProviderError> {
        let tokens: AccountTokens = self
            .accounts(
                "signInWithPassword",
                &PasswordCredentials {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        tokens.into_principal()
    }

    #[instrument(skip_all)]
    async fn send_email_verification(&self, id_token: &str) -> Result<(), ProviderError> {
        let _: IgnoredAny = self
            .accounts(
                "sendOobCode",
                &json!({ "requestType": "VERIFY_EMAIL", "idToken": id_token }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn send_password_reset(&self, email: &str) -> Result<(), ProviderError> {
        let _: IgnoredAny = self
            .accounts(
                "sendOobCode",
                &json!({ "requestType": "PASSWORD_RESET", "email": email }),
            )
            .await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn lookup_account(&self, id_token: &str) -> Result<AccountInfo, ProviderError> {
        let response: LookupResponse = self
            .accounts("lookup", &json!({ "idToken": id_token }))
            .await?;
        let user = response
            .users
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Rejected {
                code: "USER_NOT_FOUND".to_string(),
            })?;
        Ok(AccountInfo {
            user_id: UserId::new(user.local_id),
            email: user.email,
            email_verified: user.email_verified,
            disabled: user.disabled,
            display_name: user.display_name,
        })
    }

    #[instrument(skip_all)]
    async fn update_password(
        &self,
        id_token: &str,
        new_password: &str,
    ) -> Result<Principal, ProviderError> {
        let tokens: AccountTokens = self
            .accounts(
                "update",
                &json!({
                    "idToken": id_token,
                    "password": new_password,
                    "returnSecureToken": true,
                }),
            )
            .await?;
        tokens.into_principal()
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<Principal, ProviderError> {
        let url = format!("{}/v1/token", self.config.secure_token_url());
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(transport)?;
        let tokens: RefreshedTokens = read_response(response).await?;
        let lifetime = expiry(tokens.expires_in.as_deref())?;
        Ok(Principal::new(
            UserId::new(tokens.user_id),
            BearerToken::expiring_in(tokens.id_token, lifetime),
        )
        .with_refresh_token(tokens.refresh_token))
    }

    async fn sign_out(&self, _refresh_token: Option<&str>) -> Result<(), ProviderError> {
        // Firebase offers no client-side revocation; tokens lapse on their own.
        debug!("local sign-out only");
        Ok(())
    }
}
