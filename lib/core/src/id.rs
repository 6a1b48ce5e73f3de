//! Strongly-typed identifiers for domain entities.
//!
//! User identifiers are assigned by the external identity provider and are
//! treated as opaque: they are never generated, parsed, or reinterpreted
//! locally.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Macro to generate a strongly-typed wrapper around a provider-assigned string.
macro_rules! define_opaque_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps an identifier issued by the identity provider.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_opaque_id!(
    /// Stable identifier of a user account, as assigned by the identity provider.
    UserId
);
