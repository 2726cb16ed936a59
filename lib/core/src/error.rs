//! Error handling foundation for flowlab.
//!
//! Only the `Result` alias lives here. Each crate defines its own error enums
//! and reporting boundaries wrap them in a rootcause `Report`, adding layer
//! context with `.context()` as the error travels outward.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;
