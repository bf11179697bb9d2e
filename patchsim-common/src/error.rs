//! Common error types for patchsim

use std::path::PathBuf;
use thiserror::Error;

/// Common result type for patchsim operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the patchsim crates
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file present but unreadable or malformed
    #[error("Configuration error in {path}: {reason}")]
    ConfigFile { path: PathBuf, reason: String },

    /// Configuration value out of range or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Logging could not be initialised
    #[error("Logging error: {0}")]
    Logging(String),
}
