//! school-manager command-line client.
//!
//! Signs users in against Firebase, keeps the session between invocations,
//! and checks whether the current session may open a protected view.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod routes;
