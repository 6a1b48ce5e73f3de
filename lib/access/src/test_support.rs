//! In-memory fakes for the access ports.

use async_trait::async_trait;
use chrono::Duration;
use school_manager_core::UserId;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::cache::{PersistedSession, SessionCache};
use crate::claims::{RoleResolver, unsigned_token};
use crate::error::{CacheError, ProfileError, ProviderError, RoleResolutionError};
use crate::profile::{PasswordDigest, ProfileStore, UserProfile};
use crate::provider::{AccountInfo, IdentityProvider};
use crate::role::{Role, RoleSet};
use crate::session::{BearerToken, Principal};
use crate::store::SessionStore;

pub(crate) const SIGN_UP: &str = "sign_up";
pub(crate) const SIGN_IN: &str = "sign_in";
pub(crate) const SEND_VERIFICATION: &str = "send_verification";
pub(crate) const SEND_RESET: &str = "send_reset";
pub(crate) const LOOKUP: &str = "lookup";
pub(crate) const UPDATE_PASSWORD: &str = "update_password";
pub(crate) const REFRESH: &str = "refresh";
pub(crate) const SIGN_OUT: &str = "sign_out";

/// Identity provider that records every call and mints unsigned tokens.
pub(crate) struct FakeProvider {
    calls: Mutex<Vec<&'static str>>,
    failures: Mutex<HashMap<&'static str, ProviderError>>,
    roles: Mutex<Vec<String>>,
    email_verified: Mutex<bool>,
    disabled: Mutex<bool>,
    token_lifetime: Mutex<Duration>,
    refresh_delay: Mutex<Option<std::time::Duration>>,
    minted: Mutex<u32>,
}

impl FakeProvider {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(HashMap::new()),
            roles: Mutex::new(Vec::new()),
            email_verified: Mutex::new(true),
            disabled: Mutex::new(false),
            token_lifetime: Mutex::new(Duration::hours(1)),
            refresh_delay: Mutex::new(None),
            minted: Mutex::new(0),
        }
    }

    /// Makes `op` fail with a provider rejection carrying `code`.
    pub(crate) fn reject(&self, op: &'static str, code: &str) {
        self.fail(
            op,
            ProviderError::Rejected {
                code: code.to_string(),
            },
        );
    }

    pub(crate) fn fail(&self, op: &'static str, err: ProviderError) {
        self.failures.lock().unwrap().insert(op, err);
    }

    pub(crate) fn set_roles(&self, roles: &[&str]) {
        *self.roles.lock().unwrap() = roles.iter().map(|r| (*r).to_string()).collect();
    }

    pub(crate) fn set_email_verified(&self, verified: bool) {
        *self.email_verified.lock().unwrap() = verified;
    }

    pub(crate) fn set_disabled(&self, disabled: bool) {
        *self.disabled.lock().unwrap() = disabled;
    }

    pub(crate) fn set_token_lifetime(&self, lifetime: Duration) {
        *self.token_lifetime.lock().unwrap() = lifetime;
    }

    pub(crate) fn set_refresh_delay(&self, delay: std::time::Duration) {
        *self.refresh_delay.lock().unwrap() = Some(delay);
    }

    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| **c == op).count()
    }

    fn record(&self, op: &'static str) -> Result<(), ProviderError> {
        self.calls.lock().unwrap().push(op);
        match self.failures.lock().unwrap().get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Mints a principal the way the provider would after a credential exchange.
    pub(crate) fn mint(&self, email: Option<&str>) -> Principal {
        let serial = {
            let mut minted = self.minted.lock().unwrap();
            *minted += 1;
            *minted
        };
        let roles = self.roles.lock().unwrap().clone();
        let token = unsigned_token(&json!({
            "sub": "uid-1",
            "email": email,
            "roles": roles,
            "serial": serial,
        }));
        let lifetime = *self.token_lifetime.lock().unwrap();
        Principal::new(UserId::new("uid-1"), BearerToken::expiring_in(token, lifetime))
            .with_email(email.map(str::to_string))
            .with_refresh_token(Some(format!("refresh-{serial}")))
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    async fn sign_up(&self, email: &str, _password: &str) -> Result<Principal, ProviderError> {
        self.record(SIGN_UP)?;
        Ok(self.mint(Some(email)))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        _password: &str,
    ) -> Result<Principal, ProviderError> {
        self.record(SIGN_IN)?;
        Ok(self.mint(Some(email)))
    }

    async fn send_email_verification(&self, _id_token: &str) -> Result<(), ProviderError> {
        self.record(SEND_VERIFICATION)
    }

    async fn send_password_reset(&self, _email: &str) -> Result<(), ProviderError> {
        self.record(SEND_RESET)
    }

    async fn lookup_account(&self, _id_token: &str) -> Result<AccountInfo, ProviderError> {
        self.record(LOOKUP)?;
        Ok(AccountInfo {
            user_id: UserId::new("uid-1"),
            email: None,
            email_verified: *self.email_verified.lock().unwrap(),
            disabled: *self.disabled.lock().unwrap(),
            display_name: None,
        })
    }

    async fn update_password(
        &self,
        _id_token: &str,
        _new_password: &str,
    ) -> Result<Principal, ProviderError> {
        self.record(UPDATE_PASSWORD)?;
        Ok(self.mint(None))
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<Principal, ProviderError> {
        self.record(REFRESH)?;
        let delay = *self.refresh_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.mint(None))
    }

    async fn sign_out(&self, _refresh_token: Option<&str>) -> Result<(), ProviderError> {
        self.record(SIGN_OUT)
    }
}

/// Session cache held in memory.
#[derive(Default)]
pub(crate) struct MemoryCache {
    entry: Mutex<Option<PersistedSession>>,
    corrupt: Mutex<bool>,
    clears: Mutex<usize>,
    save_delay: Option<std::time::Duration>,
}

impl MemoryCache {
    pub(crate) fn with_entry(entry: PersistedSession) -> Self {
        let cache = Self::default();
        *cache.entry.lock().unwrap() = Some(entry);
        cache
    }

    /// A cache whose writes take `delay` to land.
    pub(crate) fn with_save_delay(delay: std::time::Duration) -> Self {
        Self {
            save_delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn corrupt() -> Self {
        let cache = Self::default();
        *cache.corrupt.lock().unwrap() = true;
        cache
    }

    pub(crate) fn entry(&self) -> Option<PersistedSession> {
        self.entry.lock().unwrap().clone()
    }

    pub(crate) fn clears(&self) -> usize {
        *self.clears.lock().unwrap()
    }
}

#[async_trait]
impl SessionCache for MemoryCache {
    async fn load(&self) -> Result<Option<PersistedSession>, CacheError> {
        if *self.corrupt.lock().unwrap() {
            return Err(CacheError::Corrupt {
                details: "unreadable".to_string(),
            });
        }
        Ok(self.entry.lock().unwrap().clone())
    }

    async fn save(&self, entry: &PersistedSession) -> Result<(), CacheError> {
        if let Some(delay) = self.save_delay {
            tokio::time::sleep(delay).await;
        }
        *self.entry.lock().unwrap() = Some(entry.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), CacheError> {
        *self.corrupt.lock().unwrap() = false;
        *self.entry.lock().unwrap() = None;
        *self.clears.lock().unwrap() += 1;
        Ok(())
    }
}

/// Profile store held in memory.
#[derive(Default)]
pub(crate) struct MemoryProfileStore {
    profiles: Mutex<HashMap<UserId, UserProfile>>,
    unavailable: Mutex<bool>,
}

impl MemoryProfileStore {
    pub(crate) fn unavailable() -> Self {
        let store = Self::default();
        *store.unavailable.lock().unwrap() = true;
        store
    }

    pub(crate) fn profile(&self, user_id: &UserId) -> Option<UserProfile> {
        self.profiles.lock().unwrap().get(user_id).cloned()
    }

    fn check(&self) -> Result<(), ProfileError> {
        if *self.unavailable.lock().unwrap() {
            Err(ProfileError::Transport {
                details: "store offline".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn save_profile(
        &self,
        _id_token: &str,
        profile: &UserProfile,
    ) -> Result<(), ProfileError> {
        self.check()?;
        self.profiles
            .lock()
            .unwrap()
            .insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    async fn get_profile(
        &self,
        _id_token: &str,
        user_id: &UserId,
    ) -> Result<Option<UserProfile>, ProfileError> {
        self.check()?;
        Ok(self.profile(user_id))
    }

    async fn update_password(
        &self,
        _id_token: &str,
        user_id: &UserId,
        digest: &PasswordDigest,
    ) -> Result<(), ProfileError> {
        self.check()?;
        let mut profiles = self.profiles.lock().unwrap();
        let profile = profiles
            .entry(user_id.clone())
            .or_insert_with(|| UserProfile::new(user_id.clone()));
        profile.password_hash = Some(digest.clone());
        profile.updated_at = chrono::Utc::now();
        Ok(())
    }
}

/// Resolver that always answers with the same roles.
pub(crate) struct FixedResolver(pub(crate) RoleSet);

#[async_trait]
impl RoleResolver for FixedResolver {
    async fn resolve(&self, _principal: &Principal) -> Result<RoleSet, RoleResolutionError> {
        Ok(self.0.clone())
    }
}

/// Resolver whose source is always down.
pub(crate) struct FailingResolver;

#[async_trait]
impl RoleResolver for FailingResolver {
    async fn resolve(&self, _principal: &Principal) -> Result<RoleSet, RoleResolutionError> {
        Err(RoleResolutionError::SourceFailed {
            reason: "directory offline".to_string(),
        })
    }
}

/// Resolver that answers after a delay.
pub(crate) struct SlowResolver {
    pub(crate) delay: std::time::Duration,
    pub(crate) roles: RoleSet,
}

#[async_trait]
impl RoleResolver for SlowResolver {
    async fn resolve(&self, _principal: &Principal) -> Result<RoleSet, RoleResolutionError> {
        tokio::time::sleep(self.delay).await;
        Ok(self.roles.clone())
    }
}

/// Resolver that derives roles from the mailbox name, e.g. `admin@...`.
pub(crate) struct EmailPatternResolver;

#[async_trait]
impl RoleResolver for EmailPatternResolver {
    async fn resolve(&self, principal: &Principal) -> Result<RoleSet, RoleResolutionError> {
        let mailbox = principal
            .email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .unwrap_or_default();
        let role = match mailbox {
            "admin" => Some(Role::Admin),
            "teacher" => Some(Role::Teacher),
            "student" => Some(Role::Student),
            _ => None,
        };
        Ok(role.into_iter().collect())
    }
}

/// A store wired to in-memory fakes.
pub(crate) struct Harness {
    pub(crate) provider: Arc<FakeProvider>,
    pub(crate) cache: Arc<MemoryCache>,
    pub(crate) store: SessionStore,
}

impl Harness {
    pub(crate) fn new(resolver: impl RoleResolver + 'static) -> Self {
        Self::with_cache(resolver, MemoryCache::default())
    }

    pub(crate) fn with_cache(resolver: impl RoleResolver + 'static, cache: MemoryCache) -> Self {
        let provider = Arc::new(FakeProvider::new());
        let cache = Arc::new(cache);
        let store = SessionStore::new(
            provider.clone(),
            Arc::new(resolver),
            cache.clone(),
            std::time::Duration::from_millis(200),
        );
        Self {
            provider,
            cache,
            store,
        }
    }
}
