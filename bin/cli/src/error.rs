//! Error types for the `flowlab` binary.

use std::fmt;

/// Failures at the binary boundary. The underlying cause is attached as a
/// rootcause child report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config,
    /// The graph variant could not be loaded or a command was rejected.
    Session,
    /// Output could not be written.
    Output,
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config => write!(f, "failed to load configuration"),
            Self::Session => write!(f, "simulation session failed"),
            Self::Output => write!(f, "failed to write output"),
        }
    }
}

impl std::error::Error for CliError {}
