//! Error types for patchsim-audio
//!
//! Defines module-specific error types using thiserror for clear error propagation.
//!
//! Underruns and clipping are deliberately absent: an exhausted source turns
//! into permanent silence and clipping is reported through `WriteReport`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for patchsim-audio
#[derive(Error, Debug)]
pub enum Error {
    /// Audio file could not be opened or probed
    #[error("Could not open {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    /// Decoded format is not 16-bit PCM with one or two channels
    #[error("Unsupported audio format: {0}")]
    Format(String),

    /// Audio decoding failed after the file was opened
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Source already has a file or waveform bound to it
    #[error("Audio source already bound: {0}")]
    SourceBound(String),

    /// Invalid argument to a source, synthesizer or sink operation
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Output device could not be opened at the requested format
    #[error("Unable to open audio output device: {0}")]
    DeviceOpen(String),

    /// Output device failed after it was opened
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// No output buffer became free within the configured write timeout
    #[error("No output buffer became free within {}ms", .0.as_millis())]
    WriteTimeout(Duration),
}

impl Error {
    /// True when no recovery is meaningful and the process should terminate
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::DeviceOpen(_))
    }

    /// True for errors the caller can recover from by choosing another input
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::Open { .. } | Self::Format(_))
    }
}

/// Convenience Result type using patchsim-audio Error
pub type Result<T> = std::result::Result<T, Error>;
