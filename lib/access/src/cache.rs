//! Persisted session cache.
//!
//! The cache holds one entry: enough of the last authenticated session to
//! restore it on the next start. It is written on every successful
//! authentication, read once at start, and cleared on logout.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use school_manager_core::UserId;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CacheError;
use crate::session::{BearerToken, Principal, Session};

/// Serialized form of a cached session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    /// Account email, if any.
    pub email: Option<String>,
    /// Provider-assigned account identifier.
    pub user_id: UserId,
    /// ID token at the time of caching.
    pub token: String,
    /// Instant the token stops being valid.
    pub token_expiration_date: DateTime<Utc>,
    /// Refresh token, when the provider issued one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl PersistedSession {
    /// Captures the persistable part of a session.
    #[must_use]
    pub fn from_session(session: &Session) -> Self {
        Self {
            email: session.email().map(str::to_string),
            user_id: session.user_id().clone(),
            token: session.bearer().expose_unchecked().to_string(),
            token_expiration_date: session.token_expiration(),
            refresh_token: session.refresh_token().map(str::to_string),
        }
    }

    /// Returns true once the cached token has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.token_expiration_date
    }

    /// Rebuilds the principal for role resolution.
    #[must_use]
    pub fn into_principal(self) -> Principal {
        Principal::new(
            self.user_id,
            BearerToken::new(self.token, self.token_expiration_date),
        )
        .with_email(self.email)
        .with_refresh_token(self.refresh_token)
    }
}

/// Storage port for the persisted session.
#[async_trait]
pub trait SessionCache: Send + Sync {
    /// Reads the cached entry, if any.
    async fn load(&self) -> Result<Option<PersistedSession>, CacheError>;

    /// Replaces the cached entry.
    async fn save(&self, entry: &PersistedSession) -> Result<(), CacheError>;

    /// Removes the cached entry. Clearing an empty cache succeeds.
    async fn clear(&self) -> Result<(), CacheError>;
}

/// Session cache backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileSessionCache {
    path: PathBuf,
}

impl FileSessionCache {
    /// Creates a cache stored at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, e: &std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.display().to_string(),
            details: e.to_string(),
        }
    }
}

#[async_trait]
impl SessionCache for FileSessionCache {
    async fn load(&self) -> Result<Option<PersistedSession>, CacheError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(&e)),
        };
        if contents.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&contents)
            .map(Some)
            .map_err(|e| CacheError::Corrupt {
                details: e.to_string(),
            })
    }

    async fn save(&self, entry: &PersistedSession) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_error(&e))?;
            }
        }
        let json = serde_json::to_vec_pretty(entry).map_err(|e| CacheError::Corrupt {
            details: e.to_string(),
        })?;

        // Write then rename so a crash never leaves a half-written entry.
        let staging = self.path.with_extension("json.tmp");
        tokio::fs::write(&staging, json)
            .await
            .map_err(|e| self.io_error(&e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| self.io_error(&e))
    }

    async fn clear(&self) -> Result<(), CacheError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(&e)),
        }
    }
}
