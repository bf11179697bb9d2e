//! Block-producing audio source
//!
//! Unifies a PCM file stream and a synthesized waveform behind one `read`
//! call. A source binds to at most one of the two for its whole lifetime;
//! an unbound source produces silence.

use crate::audio::decoder::{check_channels, PcmReader, WavPcmReader};
use crate::audio::synth::{SawShape, Synthesizer, Waveform};
use crate::audio::types::SampleBlock;
use crate::error::{Error, Result};
use std::path::Path;
use tracing::{debug, info, warn};

/// i16 to [-1, 1) scale
const PCM_SCALE: f32 = 1.0 / 32768.0;

/// What a source is currently bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Silence,
    File,
    Synth,
}

struct FileStream {
    reader: Box<dyn PcmReader>,
    looping: bool,
    exhausted: bool,
    /// Interleaved scratch, reused across reads
    pcm: Vec<i16>,
}

impl FileStream {
    /// Read frames until `frames` are in `pcm[start..]` or the reader ends
    fn fill(&mut self, start_frame: usize, frames: usize) -> usize {
        let channels = self.reader.channels();
        let mut done = 0;
        while done < frames {
            let offset = (start_frame + done) * channels;
            match self.reader.read_frames(&mut self.pcm[offset..], frames - done) {
                Ok(0) => break,
                Ok(n) => done += n,
                Err(e) => {
                    warn!("Read failed, treating as end of stream: {}", e);
                    break;
                }
            }
        }
        done
    }

    fn read(&mut self, block: &mut SampleBlock, count: usize) -> usize {
        if self.exhausted {
            block.silence(count);
            return 0;
        }

        let channels = self.reader.channels();
        self.pcm.resize(count * channels, 0);

        let mut frames = self.fill(0, count);
        if frames < count && self.looping {
            match self.reader.rewind() {
                Ok(()) => {
                    debug!("Looping back to first frame");
                    frames += self.fill(frames, count - frames);
                }
                Err(e) => warn!("Rewind failed: {}", e),
            }
        }

        if frames < count {
            self.pcm[frames * channels..].fill(0);
            self.exhausted = true;
            info!("End of audio stream");
        }

        let pcm = &self.pcm;
        let (left, right) = block.first_pair_mut();
        if channels == 1 {
            for (i, &s) in pcm[..count].iter().enumerate() {
                let v = s as f32 * PCM_SCALE;
                left[i] = v;
                right[i] = v;
            }
        } else {
            for (i, frame) in pcm.chunks_exact(2).take(count).enumerate() {
                left[i] = frame[0] as f32 * PCM_SCALE;
                right[i] = frame[1] as f32 * PCM_SCALE;
            }
        }

        count
    }
}

enum Binding {
    Unbound,
    File(FileStream),
    Synth(Synthesizer),
}

/// Source of four-channel sample blocks
pub struct AudioSource {
    binding: Binding,
}

impl Default for AudioSource {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioSource {
    /// Create an unbound source that produces silence
    pub fn new() -> Self {
        Self {
            binding: Binding::Unbound,
        }
    }

    /// Bind a 16-bit PCM WAV file.
    ///
    /// Returns the file's native sample rate; the sink must be opened at
    /// this rate. On failure the source is left exactly as it was.
    pub fn open_file(&mut self, path: &Path, looping: bool) -> Result<u32> {
        self.ensure_unbound("a file")?;
        let reader = WavPcmReader::open(path)?;
        info!(
            "Opened {} ({} Hz, {} channel(s), loop={})",
            path.display(),
            reader.sample_rate(),
            reader.channels(),
            looping
        );
        self.bind_reader(Box::new(reader), looping)
    }

    /// Bind any PCM reader. Same contract as `open_file`.
    pub fn open_reader(&mut self, reader: Box<dyn PcmReader>, looping: bool) -> Result<u32> {
        self.ensure_unbound("a PCM stream")?;
        check_channels(reader.channels())?;
        self.bind_reader(reader, looping)
    }

    fn bind_reader(&mut self, reader: Box<dyn PcmReader>, looping: bool) -> Result<u32> {
        let sample_rate = reader.sample_rate();
        self.binding = Binding::File(FileStream {
            reader,
            looping,
            exhausted: false,
            pcm: Vec::new(),
        });
        Ok(sample_rate)
    }

    /// Bind a synthesized waveform starting at phase 0.
    ///
    /// # Errors
    /// `SourceBound` if a file or waveform is already bound,
    /// `InvalidParameter` for a bad rate or frequency.
    pub fn init_waveform(
        &mut self,
        waveform: Waveform,
        sample_rate: u32,
        frequency: f32,
        saw_shape: SawShape,
    ) -> Result<()> {
        self.ensure_unbound("a waveform")?;
        let synth = Synthesizer::new(waveform, sample_rate, frequency)?.with_saw_shape(saw_shape);
        info!(
            "Synthesizing {} at {} Hz ({} Hz output)",
            waveform, frequency, sample_rate
        );
        self.binding = Binding::Synth(synth);
        Ok(())
    }

    fn ensure_unbound(&self, what: &str) -> Result<()> {
        match self.binding {
            Binding::Unbound => Ok(()),
            Binding::File(_) => Err(Error::SourceBound(format!(
                "cannot bind {} to a source already playing a file",
                what
            ))),
            Binding::Synth(_) => Err(Error::SourceBound(format!(
                "cannot bind {} to a source already synthesizing",
                what
            ))),
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self.binding {
            Binding::Unbound => SourceKind::Silence,
            Binding::File(_) => SourceKind::File,
            Binding::Synth(_) => SourceKind::Synth,
        }
    }

    /// True for a file source opened in loop mode
    pub fn is_looping(&self) -> bool {
        matches!(&self.binding, Binding::File(f) if f.looping)
    }

    /// True once a file source has run out of data for good
    pub fn is_exhausted(&self) -> bool {
        matches!(&self.binding, Binding::File(f) if f.exhausted)
    }

    /// Fill the first `count` samples of every channel of `block`.
    ///
    /// Channels 2/3 always mirror channels 0/1. Returns `count`, or 0 once a
    /// file source is exhausted (the block is then all zeros). `count` is
    /// capped at the block length.
    pub fn read(&mut self, block: &mut SampleBlock, count: usize) -> usize {
        let count = count.min(block.len());

        let produced = match &mut self.binding {
            Binding::Unbound => {
                block.silence(count);
                count
            }
            Binding::Synth(synth) => {
                synth.generate(&mut block.channel_mut(0)[..count]);
                block.duplicate_first_channel(count);
                count
            }
            Binding::File(stream) => stream.read(block, count),
        };

        block.mirror_pair(count);
        produced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::MemoryPcmReader;
    use crate::audio::types::LOGICAL_CHANNELS;

    fn memory_source(samples: Vec<i16>, channels: usize, looping: bool) -> AudioSource {
        let mut source = AudioSource::new();
        let reader = MemoryPcmReader::new(samples, channels, 16_000).unwrap();
        assert_eq!(source.open_reader(Box::new(reader), looping).unwrap(), 16_000);
        source
    }

    #[test]
    fn test_unbound_source_is_silent() {
        let mut source = AudioSource::new();
        let mut block = SampleBlock::new(8);
        block.channel_mut(0).fill(0.3);

        assert_eq!(source.read(&mut block, 8), 8);
        for c in 0..LOGICAL_CHANNELS {
            assert!(block.channel(c).iter().all(|&s| s == 0.0));
        }
        assert_eq!(source.kind(), SourceKind::Silence);
    }

    #[test]
    fn test_synth_source_duplicates_and_mirrors() {
        let mut source = AudioSource::new();
        source
            .init_waveform(Waveform::Sine, 1024, 16.0, SawShape::Reference)
            .unwrap();

        let mut block = SampleBlock::new(16);
        assert_eq!(source.read(&mut block, 16), 16);
        assert_eq!(block.channel(0), block.channel(1));
        assert_eq!(block.channel(2), block.channel(0));
        assert_eq!(block.channel(3), block.channel(1));
        assert!(block.channel(0)[4] > 0.5);
    }

    #[test]
    fn test_stereo_deinterleave_and_scale() {
        let mut source = memory_source(vec![16384, -16384, -32768, 32767], 2, false);
        let mut block = SampleBlock::new(2);

        assert_eq!(source.read(&mut block, 2), 2);
        assert_eq!(block.channel(0), &[0.5, -1.0]);
        assert_eq!(block.channel(1), &[-0.5, 32767.0 / 32768.0]);
        assert_eq!(block.channel(3), block.channel(1));
    }

    #[test]
    fn test_mono_file_fills_both_channels() {
        let mut source = memory_source(vec![100, -200, 300], 1, false);
        let mut block = SampleBlock::new(3);
        source.read(&mut block, 3);
        assert_eq!(block.channel(0), block.channel(1));
        assert_eq!(block.channel(0)[1], -200.0 / 32768.0);
    }

    #[test]
    fn test_non_looping_exhaustion() {
        let mut source = memory_source(vec![1000; 5], 1, false);
        let mut block = SampleBlock::new(4);

        assert_eq!(source.read(&mut block, 4), 4);
        assert!(!source.is_exhausted());

        // One frame left: data then zero fill, still a full block
        assert_eq!(source.read(&mut block, 4), 4);
        assert!(source.is_exhausted());
        assert_eq!(block.channel(0), &[1000.0 / 32768.0, 0.0, 0.0, 0.0]);

        for _ in 0..3 {
            block.channel_mut(0).fill(0.7);
            assert_eq!(source.read(&mut block, 4), 0);
            for c in 0..LOGICAL_CHANNELS {
                assert!(block.channel(c).iter().all(|&s| s == 0.0));
            }
        }
    }

    #[test]
    fn test_looping_wraps_within_one_read() {
        let mut source = memory_source(vec![1, 2, 3], 1, true);
        let mut block = SampleBlock::new(5);

        assert_eq!(source.read(&mut block, 5), 5);
        let expected: Vec<f32> = [1, 2, 3, 1, 2].iter().map(|&s| s as f32 / 32768.0).collect();
        assert_eq!(block.channel(0), expected.as_slice());
        assert!(source.is_looping());
        assert!(!source.is_exhausted());
    }

    #[test]
    fn test_empty_looping_stream_goes_silent() {
        let mut source = memory_source(Vec::new(), 2, true);
        let mut block = SampleBlock::new(4);
        assert_eq!(source.read(&mut block, 4), 4);
        assert!(source.is_exhausted());
        assert_eq!(source.read(&mut block, 4), 0);
    }

    #[test]
    fn test_bindings_are_exclusive() {
        let mut source = memory_source(vec![0; 4], 1, false);
        let err = source
            .init_waveform(Waveform::Square, 48_000, 440.0, SawShape::Reference)
            .unwrap_err();
        assert!(matches!(err, Error::SourceBound(_)));
        assert_eq!(source.kind(), SourceKind::File);

        let mut synth = AudioSource::new();
        synth
            .init_waveform(Waveform::Square, 48_000, 440.0, SawShape::Reference)
            .unwrap();
        let reader = MemoryPcmReader::new(vec![0; 4], 1, 8_000).unwrap();
        assert!(matches!(
            synth.open_reader(Box::new(reader), false),
            Err(Error::SourceBound(_))
        ));
        assert_eq!(synth.kind(), SourceKind::Synth);
    }

    #[test]
    fn test_failed_open_leaves_source_unbound() {
        let mut source = AudioSource::new();
        assert!(source
            .open_file(Path::new("/nonexistent/patchsim/missing.wav"), true)
            .is_err());
        assert_eq!(source.kind(), SourceKind::Silence);

        let reader = MemoryPcmReader::new(vec![5; 4], 1, 8_000).unwrap();
        assert_eq!(source.open_reader(Box::new(reader), false).unwrap(), 8_000);
    }

    #[test]
    fn test_invalid_waveform_parameters_leave_source_unbound() {
        let mut source = AudioSource::new();
        assert!(source
            .init_waveform(Waveform::Sine, 48_000, 0.0, SawShape::Reference)
            .is_err());
        assert_eq!(source.kind(), SourceKind::Silence);
    }
}
