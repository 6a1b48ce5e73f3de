//! Error types for the access crate.
//!
//! - `AuthError`: the user-facing taxonomy every gateway operation returns
//! - `ProviderError`: raw identity-provider failures, mapped once at the gateway
//! - `RoleResolutionError`, `CacheError`, `ProfileError`: port failures
//!
//! Provider codes are mapped through [`PROVIDER_ERROR_CODES`]; anything not in
//! the table becomes [`AuthError::Unknown`] carrying the original code.

use std::fmt;

/// Failure kinds surfaced to the user by the credential gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Email/password combination was rejected.
    InvalidCredentials,
    /// No account exists for the email.
    UserNotFound,
    /// An account already exists for the email.
    EmailAlreadyInUse,
    /// The provider rejected the password as too weak.
    WeakPassword,
    /// The email address is malformed.
    InvalidEmailFormat,
    /// The account has been disabled.
    AccountDisabled,
    /// The account's email address has not been verified.
    EmailNotVerified,
    /// The session token is invalid or has expired.
    InvalidOrExpiredToken,
    /// Password and confirmation differ.
    PasswordMismatch,
    /// No password was entered.
    PasswordRequired,
    /// The operation needs a signed-in session.
    NotAuthenticated,
    /// Unmapped failure; carries the provider code for diagnostics.
    Unknown { code: String },
}

impl AuthError {
    /// Code used when the provider could not be reached.
    pub const NETWORK_ERROR: &'static str = "NETWORK_ERROR";
    /// Code used when the provider answered with an unreadable body.
    pub const INVALID_RESPONSE: &'static str = "INVALID_RESPONSE";
    /// Code used when roles could not be resolved after sign-in.
    pub const ROLE_RESOLUTION_FAILED: &'static str = "ROLE_RESOLUTION_FAILED";

    /// Creates an unknown error for the given code.
    #[must_use]
    pub fn unknown(code: impl Into<String>) -> Self {
        Self::Unknown { code: code.into() }
    }

    /// Maps a provider error code to a user-facing kind.
    ///
    /// Messages of the form `CODE : detail` are classified by `CODE`.
    #[must_use]
    pub fn from_provider_code(raw: &str) -> Self {
        let code = raw.split(" : ").next().unwrap_or(raw).trim();
        PROVIDER_ERROR_CODES
            .iter()
            .find(|(known, _)| *known == code)
            .map(|(_, kind)| kind.to_error())
            .unwrap_or_else(|| Self::unknown(code))
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "Invalid login credentials."),
            Self::UserNotFound => write!(f, "Credentials were not found."),
            Self::EmailAlreadyInUse => write!(f, "This email exists already."),
            Self::WeakPassword => write!(f, "Password should be at least 6 characters."),
            Self::InvalidEmailFormat => write!(f, "Please enter a valid email address."),
            Self::AccountDisabled => write!(f, "This user has been disabled."),
            Self::EmailNotVerified => write!(f, "Please verify your email before logging in."),
            Self::InvalidOrExpiredToken => write!(f, "Invalid session token. Please login again."),
            Self::PasswordMismatch => write!(f, "Passwords do not match."),
            Self::PasswordRequired => write!(f, "Please enter a password."),
            Self::NotAuthenticated => write!(f, "You must be logged in to do that."),
            Self::Unknown { code } => write!(f, "An unknown error occurred ({code})."),
        }
    }
}

impl std::error::Error for AuthError {}

/// Table entry target; `AuthError` itself is not `const`-constructible for `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedKind {
    InvalidCredentials,
    UserNotFound,
    EmailAlreadyInUse,
    WeakPassword,
    InvalidEmailFormat,
    AccountDisabled,
    EmailNotVerified,
    InvalidOrExpiredToken,
}

impl MappedKind {
    fn to_error(self) -> AuthError {
        match self {
            Self::InvalidCredentials => AuthError::InvalidCredentials,
            Self::UserNotFound => AuthError::UserNotFound,
            Self::EmailAlreadyInUse => AuthError::EmailAlreadyInUse,
            Self::WeakPassword => AuthError::WeakPassword,
            Self::InvalidEmailFormat => AuthError::InvalidEmailFormat,
            Self::AccountDisabled => AuthError::AccountDisabled,
            Self::EmailNotVerified => AuthError::EmailNotVerified,
            Self::InvalidOrExpiredToken => AuthError::InvalidOrExpiredToken,
        }
    }
}

/// Identity-provider error codes and the kind each maps to.
pub const PROVIDER_ERROR_CODES: &[(&str, MappedKind)] = &[
    ("INVALID_LOGIN_CREDENTIALS", MappedKind::InvalidCredentials),
    ("INVALID_PASSWORD", MappedKind::InvalidCredentials),
    ("MISSING_PASSWORD", MappedKind::InvalidCredentials),
    ("EMAIL_NOT_FOUND", MappedKind::UserNotFound),
    ("USER_NOT_FOUND", MappedKind::UserNotFound),
    ("USER_DISABLED", MappedKind::AccountDisabled),
    ("EMAIL_EXISTS", MappedKind::EmailAlreadyInUse),
    ("WEAK_PASSWORD", MappedKind::WeakPassword),
    ("INVALID_EMAIL", MappedKind::InvalidEmailFormat),
    ("MISSING_EMAIL", MappedKind::InvalidEmailFormat),
    ("EMAIL_NOT_VERIFIED", MappedKind::EmailNotVerified),
    ("INVALID_ID_TOKEN", MappedKind::InvalidOrExpiredToken),
    ("TOKEN_EXPIRED", MappedKind::InvalidOrExpiredToken),
    ("INVALID_REFRESH_TOKEN", MappedKind::InvalidOrExpiredToken),
    ("CREDENTIAL_TOO_OLD_LOGIN_AGAIN", MappedKind::InvalidOrExpiredToken),
];

/// Failures reported by an identity provider adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// The provider answered and rejected the request with a code.
    Rejected { code: String },
    /// The provider could not be reached.
    Transport { details: String },
    /// The provider's answer could not be understood.
    InvalidResponse { details: String },
}

impl ProviderError {
    /// Returns the provider code, if the provider rejected the request.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Rejected { code } => Some(code.split(" : ").next().unwrap_or(code).trim()),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { code } => write!(f, "identity provider rejected request: {code}"),
            Self::Transport { details } => {
                write!(f, "identity provider unreachable: {details}")
            }
            Self::InvalidResponse { details } => {
                write!(f, "invalid identity provider response: {details}")
            }
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for AuthError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Rejected { code } => AuthError::from_provider_code(&code),
            ProviderError::Transport { .. } => AuthError::unknown(AuthError::NETWORK_ERROR),
            ProviderError::InvalidResponse { .. } => {
                AuthError::unknown(AuthError::INVALID_RESPONSE)
            }
        }
    }
}

/// Failures while deriving roles for a principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleResolutionError {
    /// The token could not be decoded.
    MalformedToken { reason: String },
    /// The role claim has an unexpected shape.
    InvalidClaim { claim: String, reason: String },
    /// The role source did not answer in time.
    TimedOut,
    /// The role source failed.
    SourceFailed { reason: String },
}

impl fmt::Display for RoleResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedToken { reason } => write!(f, "malformed identity token: {reason}"),
            Self::InvalidClaim { claim, reason } => {
                write!(f, "invalid '{claim}' claim: {reason}")
            }
            Self::TimedOut => write!(f, "role resolution timed out"),
            Self::SourceFailed { reason } => write!(f, "role source failed: {reason}"),
        }
    }
}

impl std::error::Error for RoleResolutionError {}

/// Failures of the persisted session cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Reading or writing the backing store failed.
    Io { path: String, details: String },
    /// The cached entry could not be parsed.
    Corrupt { details: String },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, details } => write!(f, "session cache '{path}' I/O error: {details}"),
            Self::Corrupt { details } => write!(f, "session cache entry is corrupt: {details}"),
        }
    }
}

impl std::error::Error for CacheError {}

/// Failures of the profile mirror.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    /// The request was rejected (permissions, validation).
    Rejected { status: u16, details: String },
    /// The profile store could not be reached.
    Transport { details: String },
    /// The stored document could not be understood.
    InvalidDocument { details: String },
    /// A password digest could not be computed.
    Hashing { details: String },
}

impl fmt::Display for ProfileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { status, details } => {
                write!(f, "profile store rejected request ({status}): {details}")
            }
            Self::Transport { details } => write!(f, "profile store unreachable: {details}"),
            Self::InvalidDocument { details } => write!(f, "invalid profile document: {details}"),
            Self::Hashing { details } => write!(f, "password digest failed: {details}"),
        }
    }
}

impl std::error::Error for ProfileError {}
