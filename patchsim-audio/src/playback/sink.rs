//! Buffered output sink
//!
//! Mixes each four-channel block down to stereo 16-bit, queues it on the
//! output device through a fixed pool of buffers and blocks the producer
//! while every buffer is still playing.
//!
//! Write sequence:
//! 1. Wait until the buffer under the cursor is free (backpressure)
//! 2. Downmix, scale and clamp into it
//! 3. Mark it in flight, then submit it to the device
//! 4. Advance the cursor

use crate::audio::output::{CpalDevice, OutputDevice};
use crate::audio::types::{SampleBlock, OUTPUT_CHANNELS};
use crate::error::{Error, Result};
use crate::playback::buffer_pool::{BufferPool, CompletionHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Float to 16-bit scale applied to each logical channel before summing
pub const DOWNMIX_SCALE: f32 = 16384.0;

/// Largest magnitude written to the device
pub const CLIP_LIMIT: i32 = 32767;

/// Smallest pool that still double-buffers
pub const MIN_BUFFERS: usize = 2;

/// Output engine parameters
#[derive(Debug, Clone, PartialEq)]
pub struct SinkConfig {
    /// Frames per write
    pub block_size: usize,
    /// Device channels (stereo only)
    pub channels: u16,
    pub sample_rate: u32,
    /// Give up on a blocked write after this long; `None` waits forever
    pub write_timeout: Option<Duration>,
}

impl SinkConfig {
    pub fn new(block_size: usize, channels: u16, sample_rate: u32) -> Self {
        Self {
            block_size,
            channels,
            sample_rate,
            write_timeout: None,
        }
    }

    pub fn with_write_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Pool size covering roughly 1/8 s of audio
    pub fn buffer_count(&self) -> usize {
        let n = self.sample_rate as usize / (8 * self.block_size.max(1));
        n.max(MIN_BUFFERS)
    }

    /// Interleaved samples per buffer
    pub fn samples_per_buffer(&self) -> usize {
        self.block_size * self.channels as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::InvalidParameter(
                "block size must be greater than 0".to_string(),
            ));
        }
        if self.channels as usize != OUTPUT_CHANNELS {
            return Err(Error::InvalidParameter(format!(
                "sink only drives {} output channels, got {}",
                OUTPUT_CHANNELS, self.channels
            )));
        }
        if self.sample_rate == 0 {
            return Err(Error::InvalidParameter(
                "sample rate must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scale, sum and clamp one output sample. Returns (value, clipped).
///
/// Infinite or huge inputs saturate rather than wrap. A NaN input
/// contributes 0 and counts as clipped.
#[inline]
fn mix_pair(a: f32, b: f32) -> (i16, bool) {
    let sum = ((a * DOWNMIX_SCALE).round() as i64)
        .saturating_add((b * DOWNMIX_SCALE).round() as i64);
    let clamped = sum.clamp(-(CLIP_LIMIT as i64), CLIP_LIMIT as i64);
    (clamped as i16, clamped != sum || a.is_nan() || b.is_nan())
}

/// Mix channels 0+1 to left and 2+3 to right, interleaved into `out`.
///
/// Writes `count` frames (`2 * count` samples). Returns true if any sample
/// had to be clamped.
pub fn downmix_interleave(block: &SampleBlock, count: usize, out: &mut [i16]) -> bool {
    let (c0, c1) = (block.channel(0), block.channel(1));
    let (c2, c3) = (block.channel(2), block.channel(3));
    let mut clipped = false;

    for (i, frame) in out[..count * OUTPUT_CHANNELS]
        .chunks_exact_mut(OUTPUT_CHANNELS)
        .enumerate()
    {
        let (left, left_clip) = mix_pair(c0[i], c1[i]);
        let (right, right_clip) = mix_pair(c2[i], c3[i]);
        frame[0] = left;
        frame[1] = right;
        clipped |= left_clip | right_clip;
    }

    clipped
}

/// Outcome of one `write`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReport {
    pub frames: usize,
    /// At least one sample was clamped
    pub clipped: bool,
    /// The write had to wait for a buffer to come back from the device
    pub waited: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub buffers_submitted: u64,
    pub completions: u64,
    pub clipped_writes: u64,
    pub backpressure_waits: u64,
}

/// Multi-buffered stereo output
pub struct BufferedSink<D: OutputDevice> {
    config: SinkConfig,
    pool: BufferPool,
    device: Option<D>,
    buffers_submitted: u64,
    clipped_writes: u64,
    backpressure_waits: u64,
}

impl BufferedSink<CpalDevice> {
    /// Open the default cpal output device
    pub fn open_default(config: SinkConfig) -> Result<Self> {
        Self::open(config, |cfg, completion| {
            CpalDevice::open(cfg.channels, cfg.sample_rate, completion)
        })
    }
}

impl<D: OutputDevice> BufferedSink<D> {
    /// Create the buffer pool and open a device on it.
    ///
    /// `open_device` receives the handle the device must use to report
    /// finished buffers.
    pub fn open<F>(config: SinkConfig, open_device: F) -> Result<Self>
    where
        F: FnOnce(&SinkConfig, CompletionHandle) -> Result<D>,
    {
        config.validate()?;

        let pool = BufferPool::new(config.buffer_count(), config.samples_per_buffer());
        let device = open_device(&config, pool.completion_handle())?;

        info!(
            "Output pool: {} buffers of {} bytes ({} Hz, block {})",
            pool.len(),
            config.samples_per_buffer() * std::mem::size_of::<i16>(),
            config.sample_rate,
            config.block_size
        );

        Ok(Self {
            config,
            pool,
            device: Some(device),
            buffers_submitted: 0,
            clipped_writes: 0,
            backpressure_waits: 0,
        })
    }

    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    /// Pool size (N)
    pub fn buffer_count(&self) -> usize {
        self.pool.len()
    }

    pub fn free_buffers(&self) -> usize {
        self.pool.free_count()
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            buffers_submitted: self.buffers_submitted,
            completions: self.pool.counters().completions,
            clipped_writes: self.clipped_writes,
            backpressure_waits: self.backpressure_waits,
        }
    }

    /// Queue the first `count` frames of `block` for playback.
    ///
    /// Blocks while the next buffer is still playing. Clipping is reported
    /// in the returned `WriteReport`, never as an error.
    pub fn write(&mut self, block: &SampleBlock, count: usize) -> Result<WriteReport> {
        if count > self.config.block_size || count > block.len() {
            return Err(Error::InvalidParameter(format!(
                "write of {} frames exceeds block size {}",
                count, self.config.block_size
            )));
        }

        let device = self
            .device
            .as_mut()
            .ok_or_else(|| Error::AudioOutput("sink is closed".to_string()))?;

        let waited = self.pool.wait_for_cursor(self.config.write_timeout)?;
        if waited {
            self.backpressure_waits += 1;
        }

        let clipped = downmix_interleave(block, count, self.pool.cursor_payload_mut());
        if clipped {
            self.clipped_writes += 1;
            warn!("Clipping in output block {}", self.buffers_submitted);
        }

        let (id, samples) = self.pool.begin_submit(count * OUTPUT_CHANNELS);
        if let Err(e) = device.submit(id, samples) {
            self.pool.abort_submit(id);
            return Err(e);
        }
        self.buffers_submitted += 1;
        self.pool.advance();

        Ok(WriteReport {
            frames: count,
            clipped,
            waited,
        })
    }

    /// Wait for all queued audio to play, then close the device
    pub fn close(mut self) -> Result<()> {
        self.drain_and_close()
    }

    fn drain_and_close(&mut self) -> Result<()> {
        let Some(mut device) = self.device.take() else {
            return Ok(());
        };

        let in_flight = self.pool.len() - self.pool.free_count();
        debug!("Draining {} in-flight buffer(s)", in_flight);
        let drained = self.pool.wait_until_drained(self.config.write_timeout);
        let closed = device.close();
        debug!("Output drained and closed");

        drained.and(closed)
    }
}

impl<D: OutputDevice> Drop for BufferedSink<D> {
    fn drop(&mut self) {
        if let Err(e) = self.drain_and_close() {
            warn!("Output sink did not close cleanly: {}", e);
        }
    }
}
