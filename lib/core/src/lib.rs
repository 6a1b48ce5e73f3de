//! Core domain types and utilities for school-manager.
//!
//! This crate provides the identifier types and the error-handling alias
//! shared by the access library, the provider adapters, and the client.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::UserId;
