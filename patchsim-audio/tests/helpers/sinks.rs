//! Sinks over the in-memory capture device

use patchsim_audio::audio::{CaptureDevice, CaptureHandle};
use patchsim_audio::playback::{BufferedSink, SinkConfig};

fn capture_sink(config: SinkConfig, auto_complete: bool) -> (BufferedSink<CaptureDevice>, CaptureHandle) {
    let mut handle = None;
    let sink = BufferedSink::open(config, |_, completion| {
        let (device, h) = CaptureDevice::new(completion, auto_complete);
        handle = Some(h);
        Ok(device)
    })
    .expect("open capture sink");
    (sink, handle.expect("device opened"))
}

/// Sink whose buffers complete as soon as they are submitted
pub fn auto_sink(config: SinkConfig) -> (BufferedSink<CaptureDevice>, CaptureHandle) {
    capture_sink(config, true)
}

/// Sink whose buffers complete only through the returned handle
pub fn manual_sink(config: SinkConfig) -> (BufferedSink<CaptureDevice>, CaptureHandle) {
    capture_sink(config, false)
}
