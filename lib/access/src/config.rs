//! Access configuration.
//!
//! Deserialized by the binary from the `access` section of its layered
//! configuration; every field has a default.

use chrono::Duration;
use serde::Deserialize;

use crate::claims::DEFAULT_ROLES_CLAIM;

/// Session, credential, and guard settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    /// Refuse login until the account's email address is verified.
    #[serde(default = "default_true")]
    pub require_verified_email: bool,

    /// Send a verification email after signup.
    #[serde(default = "default_true")]
    pub send_verification_email: bool,

    /// Refresh a token this many seconds before it expires.
    #[serde(default = "default_refresh_margin_seconds")]
    pub refresh_margin_seconds: u64,

    /// Upper bound on a single role resolution, in seconds.
    #[serde(default = "default_role_resolution_timeout_seconds")]
    pub role_resolution_timeout_seconds: u64,

    /// ID-token claim that carries the user's roles.
    #[serde(default = "default_roles_claim")]
    pub roles_claim: String,

    /// Where unauthenticated navigation is sent.
    #[serde(default = "default_login_path")]
    pub login_path: String,

    /// Where authenticated users without a required role are sent.
    #[serde(default = "default_landing_path")]
    pub landing_path: String,
}

fn default_true() -> bool {
    true
}

fn default_refresh_margin_seconds() -> u64 {
    300
}

fn default_role_resolution_timeout_seconds() -> u64 {
    10
}

fn default_roles_claim() -> String {
    DEFAULT_ROLES_CLAIM.to_string()
}

fn default_login_path() -> String {
    "/login".to_string()
}

fn default_landing_path() -> String {
    "/dashboard".to_string()
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            require_verified_email: default_true(),
            send_verification_email: default_true(),
            refresh_margin_seconds: default_refresh_margin_seconds(),
            role_resolution_timeout_seconds: default_role_resolution_timeout_seconds(),
            roles_claim: default_roles_claim(),
            login_path: default_login_path(),
            landing_path: default_landing_path(),
        }
    }
}

impl AccessConfig {
    /// Returns the refresh margin as a duration.
    #[must_use]
    pub fn refresh_margin(&self) -> Duration {
        Duration::seconds(i64::try_from(self.refresh_margin_seconds).unwrap_or(i64::MAX))
    }

    /// Returns the role resolution timeout.
    #[must_use]
    pub fn role_resolution_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.role_resolution_timeout_seconds)
    }
}
