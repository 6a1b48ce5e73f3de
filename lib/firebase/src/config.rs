//! Firebase project configuration.
//!
//! Base URLs default to Google's production endpoints and can be pointed at
//! the local emulator suite or a test server.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the Firebase REST endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirebaseConfig {
    /// Web API key of the Firebase project.
    api_key: String,
    /// Project ID, used to address Firestore documents.
    project_id: String,
    /// Identity Toolkit base URL.
    /// Default: "https://identitytoolkit.googleapis.com"
    #[serde(default = "default_identity_toolkit_url")]
    identity_toolkit_url: String,
    /// Secure Token base URL.
    /// Default: "https://securetoken.googleapis.com"
    #[serde(default = "default_secure_token_url")]
    secure_token_url: String,
    /// Firestore base URL.
    /// Default: "https://firestore.googleapis.com"
    #[serde(default = "default_firestore_url")]
    firestore_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_seconds")]
    request_timeout_seconds: u64,
}

fn default_identity_toolkit_url() -> String {
    "https://identitytoolkit.googleapis.com".to_string()
}

fn default_secure_token_url() -> String {
    "https://securetoken.googleapis.com".to_string()
}

fn default_firestore_url() -> String {
    "https://firestore.googleapis.com".to_string()
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl FirebaseConfig {
    /// Creates a configuration for the production endpoints.
    #[must_use]
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            identity_toolkit_url: default_identity_toolkit_url(),
            secure_token_url: default_secure_token_url(),
            firestore_url: default_firestore_url(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }

    /// Points every endpoint at one base URL, as the emulator and tests do.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.identity_toolkit_url.clone_from(&base_url);
        self.secure_token_url.clone_from(&base_url);
        self.firestore_url = base_url;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_seconds = timeout.as_secs();
        self
    }

    /// Returns the web API key.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// Returns the project ID.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Returns the Identity Toolkit base URL without a trailing slash.
    #[must_use]
    pub fn identity_toolkit_url(&self) -> &str {
        self.identity_toolkit_url.trim_end_matches('/')
    }

    /// Returns the Secure Token base URL without a trailing slash.
    #[must_use]
    pub fn secure_token_url(&self) -> &str {
        self.secure_token_url.trim_end_matches('/')
    }

    /// Returns the Firestore base URL without a trailing slash.
    #[must_use]
    pub fn firestore_url(&self) -> &str {
        self.firestore_url.trim_end_matches('/')
    }

    /// Returns the per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Builds the HTTP client shared by the adapters.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .timeout(self.request_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
    }
}
