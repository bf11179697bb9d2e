//! Streaming 16-bit PCM readers
//!
//! `PcmReader` is the decoder seam used by `AudioSource`. `WavPcmReader`
//! streams a file through symphonia; `MemoryPcmReader` serves frames that
//! are already in memory.
//!
//! Only 16-bit PCM with one or two channels is accepted. Anything else is
//! rejected when the reader is opened, before any caller state changes.

use crate::error::{Error, Result};
use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{
    Decoder, DecoderOptions, CODEC_TYPE_NULL, CODEC_TYPE_PCM_S16BE, CODEC_TYPE_PCM_S16LE,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Maximum channels a PCM input may carry
pub const MAX_INPUT_CHANNELS: usize = 2;

/// Interleaved 16-bit PCM frame reader
pub trait PcmReader: Send {
    /// Interleaved samples per frame (1 or 2)
    fn channels(&self) -> usize;

    /// Native sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Read up to `frames` frames into `out` (at least `frames * channels`
    /// samples long). Returns the number of frames read; 0 means end of stream.
    fn read_frames(&mut self, out: &mut [i16], frames: usize) -> Result<usize>;

    /// Reposition to the first frame
    fn rewind(&mut self) -> Result<()>;
}

/// Check a channel count against the supported range
pub(crate) fn check_channels(channels: usize) -> Result<()> {
    if channels == 0 || channels > MAX_INPUT_CHANNELS {
        return Err(Error::Format(format!(
            "audio must be 16 bit PCM mono or stereo, got {} channels",
            channels
        )));
    }
    Ok(())
}

/// Opened symphonia pipeline for one file
struct Pipeline {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
}

impl Pipeline {
    fn open(path: &Path) -> Result<Self> {
        let open_err = |reason: String| Error::Open {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| open_err(e.to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| open_err(format!("failed to probe format: {}", e)))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| open_err("no audio track found".to_string()))?;

        let track_id = track.id;
        let params = track.codec_params.clone();

        if params.codec != CODEC_TYPE_PCM_S16LE && params.codec != CODEC_TYPE_PCM_S16BE {
            return Err(Error::Format(format!(
                "audio must be 16 bit PCM mono or stereo, got {} bits per sample",
                params
                    .bits_per_sample
                    .map(|b| b.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            )));
        }

        let channels = params
            .channels
            .map(|c| c.count())
            .ok_or_else(|| Error::Format("channel count not found".to_string()))?;
        check_channels(channels)?;

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::Format("sample rate not found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| open_err(format!("failed to create decoder: {}", e)))?;

        Ok(Self {
            format,
            decoder,
            track_id,
            channels,
            sample_rate,
        })
    }
}

/// 16-bit PCM WAV file reader backed by symphonia
pub struct WavPcmReader {
    path: PathBuf,
    pipeline: Pipeline,
    /// Decoded samples not yet handed out, interleaved
    pending: VecDeque<i16>,
    finished: bool,
}

impl WavPcmReader {
    /// Open and validate a file.
    ///
    /// # Errors
    /// `Open` when the file cannot be read or probed, `Format` when it is not
    /// 16-bit PCM with one or two channels.
    pub fn open(path: &Path) -> Result<Self> {
        let pipeline = Pipeline::open(path)?;
        debug!(
            "Opened {}: {} Hz, {} channel(s)",
            path.display(),
            pipeline.sample_rate,
            pipeline.channels
        );

        Ok(Self {
            path: path.to_path_buf(),
            pipeline,
            pending: VecDeque::new(),
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decode the next packet into `pending`. Returns false at end of stream.
    fn decode_next(&mut self) -> Result<bool> {
        loop {
            let packet = match self.pipeline.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => return Err(Error::Decode(format!("error reading packet: {}", e))),
            };

            if packet.track_id() != self.pipeline.track_id {
                continue;
            }

            match self.pipeline.decoder.decode(&packet) {
                Ok(AudioBufferRef::S16(buf)) => {
                    let channels = buf.spec().channels.count();
                    for frame in 0..buf.frames() {
                        for ch in 0..channels {
                            self.pending.push_back(buf.chan(ch)[frame]);
                        }
                    }
                    return Ok(true);
                }
                Ok(_) => {
                    return Err(Error::Decode(
                        "decoder produced non 16-bit samples".to_string(),
                    ))
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet in {}: {}", self.path.display(), e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(e.to_string())),
            }
        }
    }
}

impl PcmReader for WavPcmReader {
    fn channels(&self) -> usize {
        self.pipeline.channels
    }

    fn sample_rate(&self) -> u32 {
        self.pipeline.sample_rate
    }

    fn read_frames(&mut self, out: &mut [i16], frames: usize) -> Result<usize> {
        let channels = self.pipeline.channels;
        let wanted = frames * channels;

        while self.pending.len() < wanted && !self.finished {
            if !self.decode_next()? {
                self.finished = true;
            }
        }

        let available = (self.pending.len() / channels).min(frames);
        for (dst, src) in out[..available * channels]
            .iter_mut()
            .zip(self.pending.drain(..available * channels))
        {
            *dst = src;
        }
        Ok(available)
    }

    fn rewind(&mut self) -> Result<()> {
        // WAV seeking is frame accurate but reopening keeps the decoder state clean
        self.pipeline = Pipeline::open(&self.path)?;
        self.pending.clear();
        self.finished = false;
        Ok(())
    }
}

/// Reader over interleaved PCM already held in memory
#[derive(Debug, Clone)]
pub struct MemoryPcmReader {
    samples: Vec<i16>,
    channels: usize,
    sample_rate: u32,
    position: usize,
}

impl MemoryPcmReader {
    /// Wrap interleaved samples.
    ///
    /// # Errors
    /// `Format` for a channel count other than 1 or 2, or a sample count that
    /// is not a whole number of frames.
    pub fn new(samples: Vec<i16>, channels: usize, sample_rate: u32) -> Result<Self> {
        check_channels(channels)?;
        if samples.len() % channels != 0 {
            return Err(Error::Format(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                channels
            )));
        }
        Ok(Self {
            samples,
            channels,
            sample_rate,
            position: 0,
        })
    }

    /// Total frames held
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels
    }
}

impl PcmReader for MemoryPcmReader {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frames(&mut self, out: &mut [i16], frames: usize) -> Result<usize> {
        let remaining = self.frame_count() - self.position;
        let n = remaining.min(frames);
        let start = self.position * self.channels;
        let end = start + n * self.channels;
        out[..n * self.channels].copy_from_slice(&self.samples[start..end]);
        self.position += n;
        Ok(n)
    }

    fn rewind(&mut self) -> Result<()> {
        self.position = 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_reader_reads_then_ends() {
        let mut reader = MemoryPcmReader::new(vec![1, 2, 3, 4, 5, 6], 2, 8_000).unwrap();
        let mut out = [0i16; 4];

        assert_eq!(reader.read_frames(&mut out, 2).unwrap(), 2);
        assert_eq!(out, [1, 2, 3, 4]);

        assert_eq!(reader.read_frames(&mut out, 2).unwrap(), 1);
        assert_eq!(&out[..2], &[5, 6]);

        assert_eq!(reader.read_frames(&mut out, 2).unwrap(), 0);
    }

    #[test]
    fn test_memory_reader_rewind() {
        let mut reader = MemoryPcmReader::new(vec![7, 8, 9], 1, 8_000).unwrap();
        let mut out = [0i16; 3];
        reader.read_frames(&mut out, 3).unwrap();
        reader.rewind().unwrap();
        assert_eq!(reader.read_frames(&mut out, 1).unwrap(), 1);
        assert_eq!(out[0], 7);
    }

    #[test]
    fn test_memory_reader_rejects_bad_layout() {
        assert!(matches!(
            MemoryPcmReader::new(vec![0; 6], 3, 8_000),
            Err(Error::Format(_))
        ));
        assert!(matches!(
            MemoryPcmReader::new(vec![0; 3], 2, 8_000),
            Err(Error::Format(_))
        ));
    }

    #[test]
    fn test_open_missing_file_is_open_error() {
        let result = WavPcmReader::open(Path::new("/nonexistent/patchsim/missing.wav"));
        assert!(matches!(result, Err(Error::Open { .. })));
    }
}
