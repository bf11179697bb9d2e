//! WAV test file generation
//!
//! Files are written with hound into a `tempfile` directory that lives as
//! long as the returned `WavFixture`.

use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A WAV file in its own temporary directory
pub struct WavFixture {
    _dir: TempDir,
    path: PathBuf,
    /// Interleaved samples as written (16-bit fixtures only)
    pub samples: Vec<i16>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl WavFixture {
    /// Write a 16-bit PCM file holding `samples`
    pub fn pcm16(name: &str, channels: u16, sample_rate: u32, samples: Vec<i16>) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join(name);
        write_pcm16_wav(&path, channels, sample_rate, &samples).expect("write wav");
        Self {
            _dir: dir,
            path,
            samples,
            channels,
            sample_rate,
        }
    }

    /// Write a 24-bit PCM file of `frames` frames
    pub fn pcm24(name: &str, channels: u16, sample_rate: u32, frames: usize) -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join(name);
        write_pcm24_wav(&path, channels, sample_rate, frames).expect("write wav");
        Self {
            _dir: dir,
            path,
            samples: Vec::new(),
            channels,
            sample_rate,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Sample `frame` of `channel`, scaled the way the source scales it
    pub fn scaled(&self, frame: usize, channel: usize) -> f32 {
        let channel = channel.min(self.channels as usize - 1);
        self.samples[frame * self.channels as usize + channel] as f32 / 32768.0
    }
}

/// Deterministic, non-repeating-looking interleaved test signal
pub fn pcm_ramp(frames: usize, channels: u16) -> Vec<i16> {
    (0..frames * channels as usize)
        .map(|i| (((i * 331) % 60_000) as i32 - 30_000) as i16)
        .collect()
}

pub fn write_pcm16_wav(
    path: &Path,
    channels: u16,
    sample_rate: u32,
    samples: &[i16],
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &s in samples {
        writer.write_sample(s)?;
    }
    writer.finalize()
}

pub fn write_pcm24_wav(
    path: &Path,
    channels: u16,
    sample_rate: u32,
    frames: usize,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 24,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for i in 0..frames * channels as usize {
        writer.write_sample((i as i32 * 1_000) % 8_000_000)?;
    }
    writer.finalize()
}
