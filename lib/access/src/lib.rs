//! Session, credential, and authorization handling for school-manager.
//!
//! This crate provides:
//! - The session store (`SessionStore`), the single source of truth for who
//!   is signed in
//! - The credential gateway (`CredentialGateway`): login, signup, logout,
//!   password reset and change
//! - The token provider (`TokenProvider`): bearer tokens, refreshed near expiry
//! - The route guard (`RouteGuard`): authentication then role checks
//! - Ports for the identity provider, role source, session cache, and
//!   profile mirror
//!
//! # Access Control Model
//!
//! Roles come from a custom claim in the identity provider's ID token. A
//! route grants access when the session shares at least one role with the
//! route's allow list; an empty allow list only requires a session.
//!
//! # Example
//!
//! ```
//! use school_manager_access::{BearerToken, Principal, ProtectedRoute, Role, RoleSet, Session};
//! use school_manager_core::UserId;
//! use chrono::Duration;
//!
//! let principal = Principal::new(
//!     UserId::new("uid-42"),
//!     BearerToken::expiring_in("id-token", Duration::hours(1)),
//! )
//! .with_email(Some("teacher@school.test".to_string()));
//!
//! let session = Session::new(principal, RoleSet::from_roles([Role::Teacher]));
//! let grades = ProtectedRoute::for_roles("/teacher/grades", &[Role::Teacher, Role::Admin]);
//!
//! assert!(session.has_any_role(&grades.allowed_roles));
//! assert!(!session.has_any_role(&[Role::Admin]));
//! assert_eq!(session.token(), Some("id-token"));
//! ```

pub mod cache;
pub mod claims;
pub mod config;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod profile;
pub mod provider;
pub mod role;
pub mod session;
pub mod store;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main types at crate root
pub use cache::{FileSessionCache, PersistedSession, SessionCache};
pub use claims::{ClaimsRoleResolver, RoleResolver};
pub use config::AccessConfig;
pub use error::{AuthError, CacheError, ProfileError, ProviderError, RoleResolutionError};
pub use gateway::{CredentialGateway, PasswordUpdateOutcome, SignupOutcome, SignupRequest};
pub use guard::{GuardOutcome, ProtectedRoute, Redirect, RouteGuard};
pub use profile::{PasswordDigest, ProfileStore, UserProfile};
pub use provider::{AccountInfo, IdentityProvider};
pub use role::{Role, RoleSet};
pub use session::{BearerToken, Principal, Session};
pub use store::{AuthState, ProviderEvent, SessionStore};
pub use token::TokenProvider;
