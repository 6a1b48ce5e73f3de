//! Error handling foundation for school-manager.
//!
//! This module provides only the `Result` type alias using rootcause.
//! Library crates define their own domain error enums; binaries wrap them
//! in a `Report` at the outermost layer.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
