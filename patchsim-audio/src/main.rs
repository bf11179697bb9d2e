//! patchsim-audio - plays a WAV file or a synthesized waveform through the
//! block pump to the default audio output
//!
//! Ctrl+C stops the pump after the current block; queued audio is then
//! drained before the device is closed.

use anyhow::{Context, Result};
use clap::Parser;
use patchsim_audio::audio::{AudioSource, SawShape, Waveform};
use patchsim_audio::playback::{AudioPump, BufferedSink, Passthrough, PumpSummary, SinkConfig};
use patchsim_common::config::{load_config, TomlConfig, WaveformSetting};
use patchsim_common::logging::init_tracing;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Output channels driven by the sink
const OUTPUT_CHANNELS: u16 = 2;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "patchsim-audio", version, about = "Block-based audio pump")]
struct Args {
    /// Enable debug logging for the patchsim crates
    #[arg(short, long)]
    debug: bool,

    /// Synthesize a waveform: sin, square, triangle or saw
    #[arg(short, long, value_name = "WAVEFORM", conflicts_with = "file")]
    waveform: Option<WaveformSetting>,

    /// 16-bit PCM WAV file to play
    #[arg(short, long, value_name = "WAV")]
    file: Option<PathBuf>,

    /// Loop the file
    #[arg(short = 'l', long = "loop")]
    loop_audio: bool,

    /// Samples per channel per block
    #[arg(long)]
    block_size: Option<usize>,

    /// Output rate for synthesis or silence (8000, 16000, 32000, 48000, 96000)
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Waveform frequency in Hz
    #[arg(long)]
    frequency: Option<f32>,

    /// Configuration file (overrides PATCHSIM_CONFIG)
    #[arg(long, value_name = "TOML")]
    config: Option<PathBuf>,
}

impl Args {
    /// Layer command-line values over the loaded configuration
    fn apply(&self, config: &mut TomlConfig) {
        if let Some(waveform) = self.waveform {
            config.waveform = waveform;
            config.file = None;
        }
        if let Some(file) = &self.file {
            config.file = Some(file.clone());
            config.waveform = WaveformSetting::None;
        }
        if self.loop_audio {
            config.loop_audio = true;
        }
        if let Some(block_size) = self.block_size {
            config.block_size = block_size;
        }
        if let Some(sample_rate) = self.sample_rate {
            config.sample_rate = sample_rate;
        }
        if let Some(frequency) = self.frequency {
            config.frequency = frequency;
        }
    }
}

fn synth_waveform(setting: WaveformSetting) -> Option<Waveform> {
    match setting {
        WaveformSetting::None => None,
        WaveformSetting::Square => Some(Waveform::Square),
        WaveformSetting::Triangle => Some(Waveform::Triangle),
        WaveformSetting::Saw => Some(Waveform::Saw),
        WaveformSetting::Sin => Some(Waveform::Sine),
    }
}

/// Bind the source described by `config`. Returns the output sample rate.
fn prepare_source(config: &TomlConfig) -> Result<(AudioSource, u32)> {
    let mut source = AudioSource::new();
    let mut sample_rate = config.sample_rate;

    if let Some(file) = &config.file {
        sample_rate = source
            .open_file(file, config.loop_audio)
            .with_context(|| format!("Could not open {}", file.display()))?;
    } else if let Some(waveform) = synth_waveform(config.waveform) {
        let saw_shape = if config.corrected_saw {
            SawShape::Corrected
        } else {
            SawShape::Reference
        };
        source
            .init_waveform(waveform, sample_rate, config.frequency, saw_shape)
            .context("Could not initialise waveform")?;
    } else {
        info!("No file or waveform selected, playing silence");
    }

    Ok((source, sample_rate))
}

/// Open the device and pump until the source ends or `stop` is set.
///
/// Runs on a blocking thread: the cpal stream must stay on the thread that
/// created it.
fn run_audio(
    mut source: AudioSource,
    sink_config: SinkConfig,
    stop: Arc<AtomicBool>,
) -> patchsim_audio::Result<PumpSummary> {
    let mut sink = BufferedSink::open_default(sink_config)?;
    let summary = AudioPump::new(&mut source, &mut sink, Passthrough)
        .with_stop_flag(stop)
        .run()?;
    sink.close()?;
    Ok(summary)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (mut config, config_source) =
        load_config(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging.level, args.debug).context("Failed to initialise logging")?;

    info!("Starting patchsim-audio v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration source: {:?}", config_source);

    let (source, sample_rate) = prepare_source(&config)?;
    let sink_config = SinkConfig::new(config.block_size, OUTPUT_CHANNELS, sample_rate)
        .with_write_timeout(config.write_timeout());

    let stop = Arc::new(AtomicBool::new(false));
    let pump_stop = Arc::clone(&stop);
    let mut audio = tokio::task::spawn_blocking(move || run_audio(source, sink_config, pump_stop));

    let joined = tokio::select! {
        joined = &mut audio => joined,
        _ = shutdown_signal() => {
            stop.store(true, Ordering::SeqCst);
            audio.await
        }
    };

    match joined.context("Audio thread panicked")? {
        Ok(summary) => {
            info!("Stopped after {} blocks ({:?})", summary.blocks, summary.end);
            Ok(())
        }
        Err(e) if e.is_fatal() => {
            error!("{}", e);
            std::process::exit(1);
        }
        Err(e) => Err(e).context("Audio pump failed"),
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
