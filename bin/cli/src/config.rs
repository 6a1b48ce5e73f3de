//! Centralized client configuration.
//!
//! Loaded via the `config` crate from, in increasing precedence: built-in
//! defaults, an optional TOML file, and `SCHOOL_MANAGER__*` environment
//! variables (e.g. `SCHOOL_MANAGER__FIREBASE__API_KEY`).
//!
//! See [`FirebaseConfig`] and [`AccessConfig`] for the section contents.

use school_manager_access::AccessConfig;
use school_manager_firebase::FirebaseConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "SCHOOL_MANAGER";

/// Client configuration composed from library configs.
#[derive(Debug, Clone, Deserialize)]
pub struct CliConfig {
    /// Firebase project settings.
    pub firebase: FirebaseConfig,

    /// Session and authorization settings.
    #[serde(default)]
    pub access: AccessConfig,

    /// File holding the persisted session.
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
}

fn default_cache_path() -> PathBuf {
    let state_dir = std::env::var_os("XDG_STATE_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".local").join("state"))
        })
        .unwrap_or_else(|| PathBuf::from("."));
    state_dir.join("school-manager").join("session.json")
}

impl CliConfig {
    /// Loads configuration from an optional file and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or required configuration
    /// is missing or invalid.
    pub fn load(file: Option<&Path>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(file) = file {
            builder = builder.add_source(config::File::from(file).required(true));
        }
        builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}
