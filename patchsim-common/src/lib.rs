//! # patchsim common library
//!
//! Shared code for the patchsim crates:
//! - Configuration loading (TOML bootstrap file + built-in defaults)
//! - Logging initialisation
//! - Common error type

pub mod config;
pub mod error;
pub mod logging;

pub use config::{SampleRate, TomlConfig, WaveformSetting};
pub use error::{Error, Result};
