//! Output buffering and the block pump

pub mod buffer_pool;
pub mod pump;
pub mod sink;

pub use buffer_pool::{BufferId, BufferPool, BufferState, CompletionHandle};
pub use pump::{AudioPump, BlockProcessor, EndReason, Passthrough, PumpSummary};
pub use sink::{BufferedSink, SinkConfig, SinkStats, WriteReport};
