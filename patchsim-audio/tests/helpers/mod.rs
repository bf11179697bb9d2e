//! Shared fixtures for patchsim-audio integration tests
//!
//! - WAV file generation with hound into temporary directories
//! - Sinks over the in-memory capture device

#![allow(dead_code)]

pub mod sinks;
pub mod wav_fixtures;

pub use sinks::{auto_sink, manual_sink};
pub use wav_fixtures::{pcm_ramp, write_pcm16_wav, write_pcm24_wav, WavFixture};
