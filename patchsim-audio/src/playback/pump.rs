//! Block pump: source -> processor -> sink
//!
//! Runs on one thread and paces itself on the sink's backpressure. Stops
//! when a non-looping source reports end of stream or when the stop flag
//! is raised.

use crate::audio::output::OutputDevice;
use crate::audio::source::AudioSource;
use crate::audio::types::SampleBlock;
use crate::error::Result;
use crate::playback::sink::{BufferedSink, WriteReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Per-block transform between source and sink.
///
/// Called once per block with the input block, a reusable output block and
/// the number of valid frames. Implementations must not keep references to
/// either block past the call.
pub trait BlockProcessor {
    fn process(&mut self, input: &SampleBlock, output: &mut SampleBlock, size: usize);
}

impl<F> BlockProcessor for F
where
    F: FnMut(&SampleBlock, &mut SampleBlock, usize),
{
    fn process(&mut self, input: &SampleBlock, output: &mut SampleBlock, size: usize) {
        self(input, output, size)
    }
}

/// Copies all four channels through unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl BlockProcessor for Passthrough {
    fn process(&mut self, input: &SampleBlock, output: &mut SampleBlock, size: usize) {
        output.copy_from(input, size);
    }
}

/// Why a pump run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// The source ran out and is not looping
    EndOfStream,
    /// The stop flag was raised
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PumpSummary {
    pub blocks: u64,
    pub clipped_blocks: u64,
    pub end: EndReason,
}

/// Drives blocks from an `AudioSource` through a processor into a sink
pub struct AudioPump<'a, D: OutputDevice, P: BlockProcessor> {
    source: &'a mut AudioSource,
    sink: &'a mut BufferedSink<D>,
    processor: P,
    input: SampleBlock,
    output: SampleBlock,
    block_size: usize,
    stop: Option<Arc<AtomicBool>>,
    blocks: u64,
    clipped_blocks: u64,
}

impl<'a, D: OutputDevice, P: BlockProcessor> AudioPump<'a, D, P> {
    /// Pump using the sink's block size
    pub fn new(source: &'a mut AudioSource, sink: &'a mut BufferedSink<D>, processor: P) -> Self {
        let block_size = sink.config().block_size;
        Self {
            source,
            sink,
            processor,
            input: SampleBlock::new(block_size),
            output: SampleBlock::new(block_size),
            block_size,
            stop: None,
            blocks: 0,
            clipped_blocks: 0,
        }
    }

    /// Finish the current block and return once `flag` is set
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    /// Pump one block. Returns `None` at end of stream.
    pub fn step(&mut self) -> Result<Option<WriteReport>> {
        let produced = self.source.read(&mut self.input, self.block_size);
        if produced == 0 && !self.source.is_looping() {
            return Ok(None);
        }

        self.processor
            .process(&self.input, &mut self.output, self.block_size);
        let report = self.sink.write(&self.output, self.block_size)?;

        self.blocks += 1;
        if report.clipped {
            self.clipped_blocks += 1;
        }
        Ok(Some(report))
    }

    /// Pump until end of stream or stop
    pub fn run(&mut self) -> Result<PumpSummary> {
        debug!("Pump started with block size {}", self.block_size);

        let end = loop {
            if self.stop_requested() {
                break EndReason::Stopped;
            }
            if self.step()?.is_none() {
                break EndReason::EndOfStream;
            }
        };

        let summary = PumpSummary {
            blocks: self.blocks,
            clipped_blocks: self.clipped_blocks,
            end,
        };
        info!(
            "Pump finished after {} blocks ({} clipped): {:?}",
            summary.blocks, summary.clipped_blocks, summary.end
        );
        Ok(summary)
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::MemoryPcmReader;
    use crate::audio::output::{CaptureDevice, CaptureHandle};
    use crate::playback::sink::SinkConfig;

    fn capture_sink(block_size: usize) -> (BufferedSink<CaptureDevice>, CaptureHandle) {
        let mut handle = None;
        let sink = BufferedSink::open(SinkConfig::new(block_size, 2, 256), |_, completion| {
            let (device, h) = CaptureDevice::new(completion, true);
            handle = Some(h);
            Ok(device)
        })
        .unwrap();
        (sink, handle.unwrap())
    }

    fn file_source(frames: usize, looping: bool) -> AudioSource {
        let mut source = AudioSource::new();
        let reader = MemoryPcmReader::new(vec![8192; frames], 1, 256).unwrap();
        source.open_reader(Box::new(reader), looping).unwrap();
        source
    }

    #[test]
    fn test_runs_until_end_of_stream() {
        let mut source = file_source(10, false);
        let (mut sink, handle) = capture_sink(4);

        let summary = AudioPump::new(&mut source, &mut sink, Passthrough)
            .run()
            .unwrap();

        // 4 + 4 + (2 data + 2 zero fill), then the empty read ends the run
        assert_eq!(summary.blocks, 3);
        assert_eq!(summary.end, EndReason::EndOfStream);

        let captured = handle.captured();
        assert_eq!(captured.len(), 3 * 4 * 2);
        // 0.25 on each of the four channels -> 8192 per output channel
        assert!(captured[..20].iter().all(|&s| s == 8192));
        assert!(captured[20..].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_stop_flag_ends_looping_run() {
        let mut source = file_source(3, true);
        let (mut sink, _handle) = capture_sink(4);
        let stop = Arc::new(AtomicBool::new(false));

        let mut count = 0;
        let flag = Arc::clone(&stop);
        let processor = move |input: &SampleBlock, output: &mut SampleBlock, size: usize| {
            output.copy_from(input, size);
            count += 1;
            if count == 5 {
                flag.store(true, Ordering::SeqCst);
            }
        };

        let summary = AudioPump::new(&mut source, &mut sink, processor)
            .with_stop_flag(stop)
            .run()
            .unwrap();

        assert_eq!(summary.blocks, 5);
        assert_eq!(summary.end, EndReason::Stopped);
    }

    #[test]
    fn test_processor_output_reaches_sink() {
        let mut source = AudioSource::new();
        let (mut sink, handle) = capture_sink(2);

        let invert = |_: &SampleBlock, output: &mut SampleBlock, size: usize| {
            for c in 0..4 {
                output.channel_mut(c)[..size].fill(-0.5);
            }
        };
        let mut pump = AudioPump::new(&mut source, &mut sink, invert);
        let report = pump.step().unwrap().unwrap();

        assert_eq!(report.frames, 2);
        assert!(!report.clipped);
        assert_eq!(handle.captured(), vec![-16384; 4]);
    }

    #[test]
    fn test_silent_source_never_ends_on_its_own() {
        let mut source = AudioSource::new();
        let (mut sink, _handle) = capture_sink(4);
        let mut pump = AudioPump::new(&mut source, &mut sink, Passthrough);
        for _ in 0..10 {
            assert!(pump.step().unwrap().is_some());
        }
    }
}
