//! Firebase adapters for the school-manager access ports.
//!
//! - [`IdentityToolkitClient`]: email/password accounts and token refresh
//!   over the Identity Toolkit and Secure Token REST APIs
//! - [`FirestoreProfileStore`]: the profile mirror in Cloud Firestore
//!
//! Both share one `reqwest::Client` built from [`FirebaseConfig`].

pub mod config;
pub mod firestore;
pub mod identity;

pub use config::FirebaseConfig;
pub use firestore::FirestoreProfileStore;
pub use identity::IdentityToolkitClient;
