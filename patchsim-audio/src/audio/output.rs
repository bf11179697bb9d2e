//! Audio output devices
//!
//! `OutputDevice` is the seam between `BufferedSink` and real hardware.
//! A device accepts whole interleaved buffers and later reports each one
//! as played through the sink's `CompletionHandle`.
//!
//! `CpalDevice` plays through the default cpal output. cpal pulls samples
//! from a callback rather than taking buffers, so submitted buffers are
//! queued and a buffer's completion fires once the callback has consumed
//! its last sample.
//!
//! `CaptureDevice` keeps everything in memory for offline runs and tests.

use crate::error::{Error, Result};
use crate::playback::buffer_pool::{BufferId, CompletionHandle};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info};

/// Sink of interleaved 16-bit output buffers
pub trait OutputDevice {
    /// Queue one buffer for playback. The device must eventually call
    /// `CompletionHandle::notify(id)` exactly once for it.
    fn submit(&mut self, id: BufferId, samples: &[i16]) -> Result<()>;

    /// Stop playback and release the device
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct QueuedBuffer {
    id: BufferId,
    samples: Vec<i16>,
    position: usize,
}

/// Submitted buffers waiting for the output callback
struct PlaybackQueue {
    buffers: VecDeque<QueuedBuffer>,
    completion: CompletionHandle,
}

impl PlaybackQueue {
    /// Next sample to play, firing completions for finished buffers
    fn next_sample(&mut self) -> Option<i16> {
        loop {
            let front = self.buffers.front_mut()?;
            if front.position < front.samples.len() {
                let sample = front.samples[front.position];
                front.position += 1;
                if front.position == front.samples.len() {
                    let id = front.id;
                    self.buffers.pop_front();
                    self.completion.notify(id);
                }
                return Some(sample);
            }
            // Empty buffer: complete it straight away
            let id = front.id;
            self.buffers.pop_front();
            self.completion.notify(id);
        }
    }
}

/// Default cpal output device driven by submitted buffers
pub struct CpalDevice {
    device_name: String,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
    queue: Arc<Mutex<PlaybackQueue>>,
    error_flag: Arc<AtomicBool>,
    underruns: Arc<AtomicU64>,
}

impl CpalDevice {
    /// Open the default output device at exactly `channels` x `sample_rate`.
    ///
    /// # Errors
    /// `DeviceOpen` if there is no output device, it cannot run at the
    /// requested format, or the stream fails to start.
    pub fn open(channels: u16, sample_rate: u32, completion: CompletionHandle) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::DeviceOpen("no default output device found".to_string()))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let (config, sample_format) = Self::find_config(&device, channels, sample_rate)?;

        let mut output = Self {
            device_name,
            config,
            sample_format,
            stream: None,
            queue: Arc::new(Mutex::new(PlaybackQueue {
                buffers: VecDeque::new(),
                completion,
            })),
            error_flag: Arc::new(AtomicBool::new(false)),
            underruns: Arc::new(AtomicU64::new(0)),
        };

        let stream = match output.sample_format {
            SampleFormat::I16 => output.build_stream::<i16>(&device)?,
            SampleFormat::F32 => output.build_stream::<f32>(&device)?,
            other => {
                return Err(Error::DeviceOpen(format!(
                    "unsupported sample format: {:?}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| Error::DeviceOpen(format!("failed to start stream: {}", e)))?;
        output.stream = Some(stream);

        info!(
            "Audio device opened: {} ({} Hz, {} channels, {:?})",
            output.device_name, sample_rate, channels, output.sample_format
        );
        Ok(output)
    }

    /// Pick a supported config at the exact format, preferring i16
    fn find_config(
        device: &Device,
        channels: u16,
        sample_rate: u32,
    ) -> Result<(StreamConfig, SampleFormat)> {
        let supported: Vec<_> = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceOpen(format!("failed to get device configs: {}", e)))?
            .filter(|c| {
                c.channels() == channels
                    && c.min_sample_rate().0 <= sample_rate
                    && c.max_sample_rate().0 >= sample_rate
            })
            .collect();

        for format in [SampleFormat::I16, SampleFormat::F32] {
            if let Some(range) = supported.iter().find(|c| c.sample_format() == format) {
                let config = range
                    .clone()
                    .with_sample_rate(cpal::SampleRate(sample_rate))
                    .config();
                debug!("Using {:?} output config {:?}", format, config);
                return Ok((config, format));
            }
        }

        Err(Error::DeviceOpen(format!(
            "device does not support {} Hz with {} channels",
            sample_rate, channels
        )))
    }

    fn build_stream<T>(&self, device: &Device) -> Result<Stream>
    where
        T: SizedSample + FromSample<i16> + Send + 'static,
    {
        let queue = Arc::clone(&self.queue);
        let underruns = Arc::clone(&self.underruns);
        let error_flag = Arc::clone(&self.error_flag);

        device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    let mut queue = queue.lock().unwrap_or_else(PoisonError::into_inner);
                    let mut starved = false;
                    for out in data.iter_mut() {
                        *out = match queue.next_sample() {
                            Some(sample) => T::from_sample(sample),
                            None => {
                                starved = true;
                                T::EQUILIBRIUM
                            }
                        };
                    }
                    if starved {
                        underruns.fetch_add(1, Ordering::Relaxed);
                    }
                },
                move |err| {
                    error!("Audio stream error: {}", err);
                    error_flag.store(true, Ordering::SeqCst);
                },
                None,
            )
            .map_err(|e| Error::DeviceOpen(format!("failed to build stream: {}", e)))
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    /// Output callbacks that ran out of queued audio
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

impl OutputDevice for CpalDevice {
    fn submit(&mut self, id: BufferId, samples: &[i16]) -> Result<()> {
        if self.error_flag.load(Ordering::SeqCst) {
            return Err(Error::AudioOutput(format!(
                "stream on {} reported an error",
                self.device_name
            )));
        }
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        queue.buffers.push_back(QueuedBuffer {
            id,
            samples: samples.to_vec(),
            position: 0,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| Error::AudioOutput(format!("failed to stop stream: {}", e)))?;
            debug!("Audio stream on {} stopped", self.device_name);
        }
        Ok(())
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Shared view of a `CaptureDevice`
#[derive(Clone)]
pub struct CaptureHandle {
    completion: CompletionHandle,
    captured: Arc<Mutex<Vec<i16>>>,
    pending: Arc<Mutex<VecDeque<BufferId>>>,
}

impl CaptureHandle {
    /// Report the oldest outstanding buffer as played
    pub fn complete_next(&self) -> Option<BufferId> {
        let id = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()?;
        self.completion.notify(id);
        Some(id)
    }

    /// Report every outstanding buffer as played, oldest first
    pub fn complete_all(&self) -> usize {
        let mut completed = 0;
        while self.complete_next().is_some() {
            completed += 1;
        }
        completed
    }

    /// Buffers submitted but not yet completed
    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Every sample submitted so far, in submission order
    pub fn captured(&self) -> Vec<i16> {
        self.captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// In-memory device that records submitted audio.
///
/// With `auto_complete` every buffer completes as soon as it is submitted;
/// otherwise completions are delivered through the `CaptureHandle`.
pub struct CaptureDevice {
    handle: CaptureHandle,
    auto_complete: bool,
}

impl CaptureDevice {
    pub fn new(completion: CompletionHandle, auto_complete: bool) -> (Self, CaptureHandle) {
        let handle = CaptureHandle {
            completion,
            captured: Arc::new(Mutex::new(Vec::new())),
            pending: Arc::new(Mutex::new(VecDeque::new())),
        };
        (
            Self {
                handle: handle.clone(),
                auto_complete,
            },
            handle,
        )
    }
}

impl OutputDevice for CaptureDevice {
    fn submit(&mut self, id: BufferId, samples: &[i16]) -> Result<()> {
        self.handle
            .captured
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(samples);

        if self.auto_complete {
            self.handle.completion.notify(id);
        } else {
            self.handle
                .pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push_back(id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::buffer_pool::BufferPool;

    #[test]
    fn test_playback_queue_completes_in_order() {
        let mut pool = BufferPool::new(2, 2);
        let mut queue = PlaybackQueue {
            buffers: VecDeque::new(),
            completion: pool.completion_handle(),
        };

        pool.cursor_payload_mut().copy_from_slice(&[1, 2]);
        let (first, samples) = pool.begin_submit(2);
        queue.buffers.push_back(QueuedBuffer {
            id: first,
            samples: samples.to_vec(),
            position: 0,
        });
        pool.advance();
        pool.cursor_payload_mut().copy_from_slice(&[3, 4]);
        let (second, samples) = pool.begin_submit(2);
        queue.buffers.push_back(QueuedBuffer {
            id: second,
            samples: samples.to_vec(),
            position: 0,
        });
        assert_eq!(pool.free_count(), 0);

        assert_eq!(queue.next_sample(), Some(1));
        assert_eq!(pool.free_count(), 0);
        assert_eq!(queue.next_sample(), Some(2));
        assert_eq!(pool.free_count(), 1);
        assert_eq!(queue.next_sample(), Some(3));
        assert_eq!(queue.next_sample(), Some(4));
        assert_eq!(pool.free_count(), 2);
        assert_eq!(queue.next_sample(), None);
    }

    #[test]
    fn test_capture_device_manual_completion() {
        let mut pool = BufferPool::new(2, 2);
        let (mut device, handle) = CaptureDevice::new(pool.completion_handle(), false);

        let (id, samples) = pool.begin_submit(2);
        device.submit(id, samples).unwrap();
        assert_eq!(handle.pending(), 1);
        assert_eq!(pool.free_count(), 1);

        assert_eq!(handle.complete_next(), Some(id));
        assert_eq!(pool.free_count(), 2);
        assert_eq!(handle.complete_next(), None);
        assert_eq!(handle.captured(), vec![0, 0]);
    }

    #[test]
    fn test_capture_device_auto_completion() {
        let mut pool = BufferPool::new(1, 1);
        let (mut device, handle) = CaptureDevice::new(pool.completion_handle(), true);

        pool.cursor_payload_mut()[0] = 42;
        let (id, samples) = pool.begin_submit(1);
        device.submit(id, samples).unwrap();

        assert_eq!(pool.free_count(), 1);
        assert_eq!(handle.pending(), 0);
        assert_eq!(handle.captured(), vec![42]);
    }
}
