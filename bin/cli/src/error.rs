//! Domain error types for the command-line client.
//!
//! Command failures are wrapped in a rootcause `Report` at the outermost
//! layer; `main` prints the report and exits non-zero.

use school_manager_access::AuthError;
use std::fmt;

/// Command-line client errors.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// The HTTP client could not be built.
    Http { details: String },
    /// A credential operation failed.
    Auth(AuthError),
    /// The requested view is not declared.
    UnknownView { path: String },
    /// A command argument was missing or malformed.
    InvalidArgument { name: String, reason: String },
    /// Writing command output failed.
    Output { details: String },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "configuration error: {details}"),
            Self::Http { details } => write!(f, "failed to create HTTP client: {details}"),
            Self::Auth(err) => write!(f, "{err}"),
            Self::UnknownView { path } => write!(f, "no such view: {path}"),
            Self::InvalidArgument { name, reason } => {
                write!(f, "invalid argument '{name}': {reason}")
            }
            Self::Output { details } => write!(f, "failed to write output: {details}"),
        }
    }
}

impl std::error::Error for CliError {}

impl From<AuthError> for CliError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::Output {
            details: err.to_string(),
        }
    }
}
