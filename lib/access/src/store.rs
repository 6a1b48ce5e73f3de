//! Session store.
//!
//! The store is the single writer of the current authentication state.
//! Identity-provider events enter through [`SessionStore::apply`] and the
//! persisted cache through [`SessionStore::restore`]; both pass through role
//! resolution before a session is published. Readers observe the state via
//! `watch` receivers or take synchronous snapshots.
//!
//! Each event bumps a generation counter. A resolution that finishes after a
//! newer event started is discarded instead of published. Cache writes are
//! serialized and re-check the generation under the write lock, so a stale
//! resolution never persists a session that a later sign-out cleared.
//!
//! The logged-in flag follows token expiry: when a published session's token
//! runs out, observers see the flag drop without a new event.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use crate::cache::{PersistedSession, SessionCache};
use crate::claims::RoleResolver;
use crate::error::RoleResolutionError;
use crate::provider::IdentityProvider;
use crate::session::{Principal, Session};

/// Authentication state published by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    /// Nothing has been restored or reported yet.
    Uninitialized,
    /// An event is being turned into a session.
    Resolving,
    /// A principal was reported and its roles resolved.
    Authenticated(Session),
    /// No one is signed in.
    Unauthenticated,
}

impl AuthState {
    /// Returns true once the state is neither uninitialized nor resolving.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Authenticated(_) | Self::Unauthenticated)
    }

    /// Returns the session if authenticated with an unexpired token.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Authenticated(session) if !session.is_expired() => Some(session),
            _ => None,
        }
    }
}

/// Events reported by the identity provider.
#[derive(Debug, Clone)]
pub enum ProviderEvent {
    /// A principal signed in, or its tokens were renewed.
    SignedIn(Principal),
    /// The principal signed out or was invalidated.
    SignedOut,
}

/// Handle to the session store. Clones share state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

struct Inner {
    state: watch::Sender<AuthState>,
    loading: watch::Sender<bool>,
    logged_in: watch::Sender<bool>,
    generation: AtomicU64,
    cache_writes: Mutex<()>,
    provider: Arc<dyn IdentityProvider>,
    resolver: Arc<dyn RoleResolver>,
    cache: Arc<dyn SessionCache>,
    resolution_timeout: Duration,
}

impl SessionStore {
    /// Creates a store in the `Uninitialized` state.
    #[must_use]
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        resolver: Arc<dyn RoleResolver>,
        cache: Arc<dyn SessionCache>,
        resolution_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(AuthState::Uninitialized);
        let (loading, _) = watch::channel(true);
        let (logged_in, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                state,
                loading,
                logged_in,
                generation: AtomicU64::new(0),
                cache_writes: Mutex::new(()),
                provider,
                resolver,
                cache,
                resolution_timeout,
            }),
        }
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Returns the current raw state.
    #[must_use]
    pub fn state(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    /// Returns the current session, if authenticated with an unexpired token.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.inner.state.borrow().session().cloned()
    }

    /// Subscribes to the logged-in flag.
    #[must_use]
    pub fn subscribe_logged_in(&self) -> watch::Receiver<bool> {
        self.inner.logged_in.subscribe()
    }

    /// Returns true if a valid session exists right now.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.inner.state.borrow().session().is_some()
    }

    /// Subscribes to the loading flag.
    #[must_use]
    pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
        self.inner.loading.subscribe()
    }

    /// Returns true until the first resolution completes.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        *self.inner.loading.borrow()
    }

    /// Waits until the state is settled and returns it.
    pub async fn wait_until_settled(&self) -> AuthState {
        let mut rx = self.subscribe();
        match rx.wait_for(AuthState::is_settled).await {
            Ok(state) => state.clone(),
            // The sender lives as long as `self`.
            Err(_) => self.state(),
        }
    }

    /// Restores the session from the persisted cache.
    ///
    /// Called once at start. An unreadable or expired entry is cleared.
    pub async fn restore(&self) -> AuthState {
        let generation = self.begin();
        match self.inner.cache.load().await {
            Ok(Some(entry)) if entry.is_expired() => {
                info!(user_id = %entry.user_id, "cached session expired");
                self.clear_cache().await;
                self.finish(generation, AuthState::Unauthenticated)
            }
            Ok(Some(entry)) => {
                debug!(user_id = %entry.user_id, "restoring cached session");
                self.resolve(generation, entry.into_principal()).await
            }
            Ok(None) => {
                debug!("no cached session");
                self.finish(generation, AuthState::Unauthenticated)
            }
            Err(e) => {
                warn!(error = %e, "discarding unreadable session cache");
                self.clear_cache().await;
                self.finish(generation, AuthState::Unauthenticated)
            }
        }
    }

    /// Applies an identity-provider event and returns the resulting state.
    pub async fn apply(&self, event: ProviderEvent) -> AuthState {
        let generation = self.begin();
        match event {
            ProviderEvent::SignedIn(principal) => self.resolve(generation, principal).await,
            ProviderEvent::SignedOut => {
                self.clear_cache().await;
                let state = self.finish(generation, AuthState::Unauthenticated);
                info!("signed out");
                state
            }
        }
    }

    fn begin(&self) -> u64 {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.state.send_replace(AuthState::Resolving);
        generation
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) == generation
    }

    async fn resolve(&self, generation: u64, principal: Principal) -> AuthState {
        let roles = match tokio::time::timeout(
            self.inner.resolution_timeout,
            self.inner.resolver.resolve(&principal),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RoleResolutionError::TimedOut),
        };

        if !self.is_current(generation) {
            debug!(generation, "discarding superseded role resolution");
            return self.state();
        }

        match roles {
            Ok(roles) => {
                let session = Session::new(principal, roles);
                if !self.persist(generation, &session).await {
                    debug!(generation, "discarding superseded session");
                    return self.state();
                }
                info!(
                    user_id = %session.user_id(),
                    roles = %session.roles(),
                    "session established"
                );
                self.finish(generation, AuthState::Authenticated(session))
            }
            Err(e) => {
                warn!(
                    user_id = %principal.user_id,
                    error = %e,
                    "role resolution failed, signing out"
                );
                if let Err(e) = self
                    .inner
                    .provider
                    .sign_out(principal.refresh_token.as_deref())
                    .await
                {
                    warn!(error = %e, "provider sign-out failed");
                }
                self.clear_cache().await;
                self.finish(generation, AuthState::Unauthenticated)
            }
        }
    }

    /// Saves `session` unless a newer event has started. Returns false if
    /// superseded.
    async fn persist(&self, generation: u64, session: &Session) -> bool {
        let _writing = self.inner.cache_writes.lock().await;
        if !self.is_current(generation) {
            return false;
        }
        if let Err(e) = self
            .inner
            .cache
            .save(&PersistedSession::from_session(session))
            .await
        {
            warn!(error = %e, "failed to persist session");
        }
        true
    }

    async fn clear_cache(&self) {
        let _writing = self.inner.cache_writes.lock().await;
        if let Err(e) = self.inner.cache.clear().await {
            warn!(error = %e, "failed to clear session cache");
        }
    }

    /// Publishes `next` unless a newer event has started since `generation`.
    fn finish(&self, generation: u64, next: AuthState) -> AuthState {
        let published = self.inner.state.send_if_modified(|state| {
            if self.is_current(generation) {
                *state = next;
                true
            } else {
                false
            }
        });
        if !published {
            debug!(generation, "discarding superseded state");
            return self.state();
        }
        let logged_in = self.is_logged_in();
        self.inner.logged_in.send_if_modified(|flag| {
            let changed = *flag != logged_in;
            *flag = logged_in;
            changed
        });
        self.inner.loading.send_if_modified(|loading| {
            let changed = *loading;
            *loading = false;
            changed
        });
        let state = self.state();
        if let Some(session) = state.session() {
            self.watch_expiry(generation, session.token_expiration());
        }
        state
    }

    /// Drops the logged-in flag when the token published by `generation`
    /// expires, unless a newer event has replaced it by then.
    fn watch_expiry(&self, generation: u64, expires_at: DateTime<Utc>) {
        let Ok(remaining) = (expires_at - Utc::now()).to_std() else {
            return;
        };
        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(remaining).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let expired = inner.logged_in.send_if_modified(|flag| {
                let current = inner.generation.load(Ordering::SeqCst) == generation;
                let changed = current && *flag;
                if changed {
                    *flag = false;
                }
                changed
            });
            if expired {
                info!(generation, "session token expired");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::{Role, RoleSet};
    use crate::session::BearerToken;
    use crate::test_support::{
        FailingResolver, FixedResolver, Harness, MemoryCache, SIGN_OUT, SlowResolver,
    };
    use chrono::Duration as ChronoDuration;
    use school_manager_core::UserId;

    fn teacher() -> RoleSet {
        RoleSet::from_roles([Role::Teacher])
    }

    fn cached(lifetime: ChronoDuration) -> PersistedSession {
        let principal = Principal::new(
            UserId::new("uid-9"),
            BearerToken::expiring_in("cached-token", lifetime),
        )
        .with_email(Some("cached@school.test".to_string()));
        PersistedSession::from_session(&Session::new(principal, RoleSet::empty()))
    }

    #[tokio::test]
    async fn starts_uninitialized_and_loading() {
        let h = Harness::new(FixedResolver(teacher()));
        assert_eq!(h.store.state(), AuthState::Uninitialized);
        assert!(h.store.is_loading());
        assert!(!h.store.is_logged_in());
        assert_eq!(h.store.session(), None);
    }

    #[tokio::test]
    async fn sign_in_publishes_session_and_persists_it() {
        let h = Harness::new(FixedResolver(teacher()));
        let principal = h.provider.mint(Some("t@school.test"));

        let state = h.store.apply(ProviderEvent::SignedIn(principal)).await;

        let AuthState::Authenticated(session) = state else {
            panic!("expected authenticated, got {state:?}");
        };
        assert_eq!(session.roles(), &teacher());
        assert!(h.store.is_logged_in());
        assert!(!h.store.is_loading());
        assert_eq!(
            h.cache.entry().map(|e| e.user_id),
            Some(UserId::new("uid-1"))
        );
    }

    #[tokio::test]
    async fn loading_flag_clears_after_first_resolution_even_on_failure() {
        let h = Harness::new(FailingResolver);
        let mut loading = h.store.subscribe_loading();
        assert!(*loading.borrow_and_update());

        h.store
            .apply(ProviderEvent::SignedIn(h.provider.mint(None)))
            .await;

        assert!(loading.has_changed().expect("open"));
        assert!(!*loading.borrow_and_update());
        h.store.apply(ProviderEvent::SignedOut).await;
        assert!(!h.store.is_loading());
    }

    #[tokio::test]
    async fn role_resolution_failure_forces_sign_out() {
        let h = Harness::new(FailingResolver);
        let state = h
            .store
            .apply(ProviderEvent::SignedIn(h.provider.mint(Some("x@y.test"))))
            .await;

        assert_eq!(state, AuthState::Unauthenticated);
        assert_eq!(h.provider.count(SIGN_OUT), 1);
        assert_eq!(h.cache.entry(), None);
        assert!(h.cache.clears() >= 1);
    }

    #[tokio::test]
    async fn role_resolution_timeout_is_a_failure() {
        let h = Harness::new(SlowResolver {
            delay: std::time::Duration::from_secs(5),
            roles: teacher(),
        });
        let state = h
            .store
            .apply(ProviderEvent::SignedIn(h.provider.mint(None)))
            .await;
        assert_eq!(state, AuthState::Unauthenticated);
        assert_eq!(h.provider.count(SIGN_OUT), 1);
    }

    #[tokio::test]
    async fn stale_resolution_is_discarded() {
        let h = Harness::new(SlowResolver {
            delay: std::time::Duration::from_millis(100),
            roles: teacher(),
        });
        let store = h.store.clone();
        let principal = h.provider.mint(None);
        let slow = tokio::spawn(async move { store.apply(ProviderEvent::SignedIn(principal)).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        h.store.apply(ProviderEvent::SignedOut).await;
        slow.await.expect("join");

        assert_eq!(h.store.state(), AuthState::Unauthenticated);
        assert!(!h.store.is_logged_in());
    }

    #[tokio::test]
    async fn restore_without_cache_is_unauthenticated() {
        let h = Harness::new(FixedResolver(teacher()));
        assert_eq!(h.store.restore().await, AuthState::Unauthenticated);
        assert!(!h.store.is_loading());
    }

    #[tokio::test]
    async fn restore_valid_cache_authenticates() {
        let h = Harness::with_cache(
            FixedResolver(teacher()),
            MemoryCache::with_entry(cached(ChronoDuration::hours(1))),
        );
        h.store.restore().await;

        let session = h.store.session().expect("session");
        assert_eq!(session.user_id().as_str(), "uid-9");
        assert_eq!(session.email(), Some("cached@school.test"));
        assert_eq!(session.token(), Some("cached-token"));
    }

    #[tokio::test]
    async fn restore_expired_cache_clears_it() {
        let h = Harness::with_cache(
            FixedResolver(teacher()),
            MemoryCache::with_entry(cached(ChronoDuration::seconds(-30))),
        );
        assert_eq!(h.store.restore().await, AuthState::Unauthenticated);
        assert_eq!(h.cache.entry(), None);
        assert_eq!(h.cache.clears(), 1);
    }

    #[tokio::test]
    async fn restore_unreadable_cache_clears_it() {
        let h = Harness::with_cache(FixedResolver(teacher()), MemoryCache::corrupt());
        assert_eq!(h.store.restore().await, AuthState::Unauthenticated);
        assert_eq!(h.cache.clears(), 1);
    }

    #[tokio::test]
    async fn expired_session_is_treated_as_absent() {
        let h = Harness::new(FixedResolver(teacher()));
        h.provider.set_token_lifetime(ChronoDuration::seconds(-1));
        let state = h
            .store
            .apply(ProviderEvent::SignedIn(h.provider.mint(None)))
            .await;

        assert!(matches!(state, AuthState::Authenticated(_)));
        assert_eq!(h.store.session(), None);
        assert!(!h.store.is_logged_in());
    }

    #[tokio::test]
    async fn wait_until_settled_returns_after_resolution() {
        let h = Harness::new(SlowResolver {
            delay: std::time::Duration::from_millis(30),
            roles: teacher(),
        });
        let store = h.store.clone();
        let principal = h.provider.mint(None);
        tokio::spawn(async move { store.apply(ProviderEvent::SignedIn(principal)).await });

        let settled = h.store.wait_until_settled().await;
        assert!(matches!(settled, AuthState::Authenticated(_)));
    }

    #[tokio::test]
    async fn logged_in_observers_see_transitions() {
        let h = Harness::new(FixedResolver(teacher()));
        let mut logged_in = h.store.subscribe_logged_in();

        h.store
            .apply(ProviderEvent::SignedIn(h.provider.mint(None)))
            .await;
        assert!(*logged_in.borrow_and_update());

        h.store.apply(ProviderEvent::SignedOut).await;
        assert!(!*logged_in.borrow_and_update());
    }

    #[tokio::test]
    async fn sign_out_during_slow_persist_leaves_cache_empty() {
        let h = Harness::with_cache(
            FixedResolver(teacher()),
            MemoryCache::with_save_delay(std::time::Duration::from_millis(100)),
        );
        let store = h.store.clone();
        let principal = h.provider.mint(Some("t@school.test"));
        let login = tokio::spawn(async move { store.apply(ProviderEvent::SignedIn(principal)).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        h.store.apply(ProviderEvent::SignedOut).await;
        login.await.expect("join");

        assert_eq!(h.store.state(), AuthState::Unauthenticated);
        assert_eq!(h.cache.entry(), None);

        let restarted = SessionStore::new(
            h.provider.clone(),
            Arc::new(FixedResolver(teacher())),
            h.cache.clone(),
            std::time::Duration::from_millis(200),
        );
        assert_eq!(restarted.restore().await, AuthState::Unauthenticated);
        assert!(!restarted.is_logged_in());
    }

    #[tokio::test]
    async fn logged_in_observers_see_token_expiry() {
        let h = Harness::new(FixedResolver(teacher()));
        h.provider.set_token_lifetime(ChronoDuration::milliseconds(300));
        let mut logged_in = h.store.subscribe_logged_in();

        h.store
            .apply(ProviderEvent::SignedIn(h.provider.mint(None)))
            .await;
        assert!(*logged_in.borrow_and_update());

        tokio::time::timeout(std::time::Duration::from_secs(2), logged_in.changed())
            .await
            .expect("flag drops on expiry")
            .expect("open");
        assert!(!*logged_in.borrow());
        assert!(!h.store.is_logged_in());
    }

    #[tokio::test]
    async fn expiry_of_replaced_token_keeps_flag() {
        let h = Harness::new(FixedResolver(teacher()));
        h.provider.set_token_lifetime(ChronoDuration::milliseconds(100));
        h.store
            .apply(ProviderEvent::SignedIn(h.provider.mint(None)))
            .await;

        h.provider.set_token_lifetime(ChronoDuration::hours(1));
        h.store
            .apply(ProviderEvent::SignedIn(h.provider.mint(None)))
            .await;

        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        assert!(*h.store.subscribe_logged_in().borrow());
        assert!(h.store.is_logged_in());
    }
}
