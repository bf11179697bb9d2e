//! # patchsim audio engine (patchsim-audio)
//!
//! Streams four-channel float blocks from a source (16-bit PCM WAV file or
//! synthesized waveform) through a per-block processor into a multi-buffered
//! stereo output device.
//!
//! **Architecture:** `AudioSource` -> `BlockProcessor` -> `BufferedSink`,
//! driven by `AudioPump`. Decoding uses symphonia, output uses cpal.

pub mod audio;
pub mod error;
pub mod playback;

pub use audio::{AudioSource, SampleBlock, Waveform};
pub use error::{Error, Result};
pub use playback::{AudioPump, BufferedSink, SinkConfig};
