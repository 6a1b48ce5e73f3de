//! Role resolution from identity-token claims.
//!
//! Roles are custom claims set on the account by an administrative process
//! and embedded in every ID token the provider mints. The token was received
//! directly from the provider over TLS, so the payload is read without
//! verifying the signature; backends verify it on every request.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::Value;

use crate::error::RoleResolutionError;
use crate::role::RoleSet;
use crate::session::Principal;

/// Default name of the custom claim holding roles.
pub const DEFAULT_ROLES_CLAIM: &str = "roles";

/// Derives the role set for a freshly reported principal.
#[async_trait]
pub trait RoleResolver: Send + Sync {
    /// Resolves the roles held by `principal`.
    async fn resolve(&self, principal: &Principal) -> Result<RoleSet, RoleResolutionError>;
}

/// Reads roles from a custom claim in the ID token payload.
#[derive(Debug, Clone)]
pub struct ClaimsRoleResolver {
    claim: String,
}

impl ClaimsRoleResolver {
    /// Creates a resolver that reads the given claim.
    #[must_use]
    pub fn new(claim: impl Into<String>) -> Self {
        Self {
            claim: claim.into(),
        }
    }

    /// Returns the claim name this resolver reads.
    #[must_use]
    pub fn claim(&self) -> &str {
        &self.claim
    }

    /// Extracts roles from a compact JWT.
    ///
    /// A missing claim means no roles. A claim may be a single string or an
    /// array of strings.
    pub fn roles_from_token(&self, token: &str) -> Result<RoleSet, RoleResolutionError> {
        let payload = decode_payload(token)?;
        match payload.get(&self.claim) {
            None | Some(Value::Null) => Ok(RoleSet::empty()),
            Some(Value::String(single)) => Ok(RoleSet::from_claim_values(&[single.as_str()])),
            Some(Value::Array(values)) => {
                let names = values
                    .iter()
                    .map(|v| {
                        v.as_str().ok_or_else(|| RoleResolutionError::InvalidClaim {
                            claim: self.claim.clone(),
                            reason: format!("expected string entries, found {v}"),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RoleSet::from_claim_values(names.as_slice()))
            }
            Some(other) => Err(RoleResolutionError::InvalidClaim {
                claim: self.claim.clone(),
                reason: format!("expected string or array, found {other}"),
            }),
        }
    }
}

impl Default for ClaimsRoleResolver {
    fn default() -> Self {
        Self::new(DEFAULT_ROLES_CLAIM)
    }
}

#[async_trait]
impl RoleResolver for ClaimsRoleResolver {
    async fn resolve(&self, principal: &Principal) -> Result<RoleSet, RoleResolutionError> {
        self.roles_from_token(principal.id_token.expose_unchecked())
    }
}

fn decode_payload(token: &str) -> Result<serde_json::Map<String, Value>, RoleResolutionError> {
    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return Err(RoleResolutionError::MalformedToken {
            reason: "expected three dot-separated segments".to_string(),
        });
    };

    // Some encoders keep padding; URL_SAFE_NO_PAD rejects it.
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| RoleResolutionError::MalformedToken {
            reason: format!("payload is not base64url: {e}"),
        })?;

    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RoleResolutionError::MalformedToken {
            reason: "payload is not a JSON object".to_string(),
        }),
        Err(e) => Err(RoleResolutionError::MalformedToken {
            reason: format!("payload is not JSON: {e}"),
        }),
    }
}

/// Builds an unsigned compact JWT carrying `claims`, for tests.
#[cfg(test)]
pub(crate) fn unsigned_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.sig")
}
