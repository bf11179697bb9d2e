//! Audio inputs and outputs: block type, synthesis, PCM decoding, source
//! and output devices

pub mod decoder;
pub mod output;
pub mod source;
pub mod synth;
pub mod types;

pub use decoder::{MemoryPcmReader, PcmReader, WavPcmReader};
pub use output::{CaptureDevice, CaptureHandle, CpalDevice, OutputDevice};
pub use source::{AudioSource, SourceKind};
pub use synth::{SawShape, Synthesizer, Waveform};
pub use types::SampleBlock;
