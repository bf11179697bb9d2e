//! Configuration loading for patchsim
//!
//! Bootstrap settings come from an optional TOML file. Every field has a
//! built-in default, so a missing file is never fatal. Command-line values
//! are layered on top by the binaries.
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (applied by the caller)
//! 2. `PATCHSIM_CONFIG` environment variable naming a TOML file
//! 3. `<config_dir>/patchsim/config.toml`
//! 4. Built-in defaults (code constants)

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "PATCHSIM_CONFIG";

/// Default samples per channel per block
pub const DEFAULT_BLOCK_SIZE: usize = 48;

/// Default synthesis/silence sample rate
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default synthesized waveform frequency (Hz)
pub const DEFAULT_FREQUENCY: f32 = 880.0;

/// Source waveform selection as written in the TOML file and on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaveformSetting {
    /// No synthesis: play a file, or silence when no file is given
    #[default]
    None,
    Square,
    Triangle,
    Saw,
    Sin,
}

impl FromStr for WaveformSetting {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "square" => Ok(Self::Square),
            "triangle" => Ok(Self::Triangle),
            "saw" => Ok(Self::Saw),
            "sin" | "sine" => Ok(Self::Sin),
            other => Err(Error::Config(format!(
                "Unknown waveform '{}' (expected sin, square, triangle or saw)",
                other
            ))),
        }
    }
}

impl fmt::Display for WaveformSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Square => "square",
            Self::Triangle => "triangle",
            Self::Saw => "saw",
            Self::Sin => "sin",
        };
        f.write_str(name)
    }
}

/// Sample rates the simulated codec can be configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleRate {
    Hz8000,
    Hz16000,
    Hz32000,
    Hz48000,
    Hz96000,
}

impl SampleRate {
    /// Every supported rate, ascending
    pub const ALL: [SampleRate; 5] = [
        Self::Hz8000,
        Self::Hz16000,
        Self::Hz32000,
        Self::Hz48000,
        Self::Hz96000,
    ];

    /// Rate in Hz
    pub const fn hz(self) -> u32 {
        match self {
            Self::Hz8000 => 8_000,
            Self::Hz16000 => 16_000,
            Self::Hz32000 => 32_000,
            Self::Hz48000 => 48_000,
            Self::Hz96000 => 96_000,
        }
    }

    /// Look up a supported rate
    pub fn from_hz(hz: u32) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|rate| rate.hz() == hz)
            .ok_or_else(|| {
                Error::Config(format!(
                    "Unsupported sample rate {} Hz (expected 8000, 16000, 32000, 48000 or 96000)",
                    hz
                ))
            })
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Samples per channel in every pumped block
    pub block_size: usize,

    /// Output rate used for synthesis or silence.
    /// Replaced by the file's native rate when a file is played.
    pub sample_rate: u32,

    pub waveform: WaveformSetting,

    /// Synthesized waveform frequency (Hz)
    pub frequency: f32,

    /// 16-bit PCM WAV file to play
    pub file: Option<PathBuf>,

    /// Restart the file from its first frame when it runs out
    pub loop_audio: bool,

    /// Use the symmetric saw ramp instead of the reference one
    pub corrected_saw: bool,

    /// Give up on a blocked write after this long (absent = wait forever)
    pub write_timeout_ms: Option<u64>,

    pub logging: LoggingConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            waveform: WaveformSetting::None,
            frequency: DEFAULT_FREQUENCY,
            file: None,
            loop_audio: false,
            corrected_saw: false,
            write_timeout_ms: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl TomlConfig {
    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file.
    ///
    /// Values are not validated here; callers layer CLI overrides first and
    /// then call [`TomlConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| Error::ConfigFile {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Reject values the audio engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(Error::Config("block_size must be greater than 0".to_string()));
        }
        SampleRate::from_hz(self.sample_rate)?;
        if !self.frequency.is_finite() || self.frequency <= 0.0 {
            return Err(Error::Config(format!(
                "frequency must be a positive number of Hz, got {}",
                self.frequency
            )));
        }
        if self.waveform != WaveformSetting::None && self.file.is_some() {
            return Err(Error::Config(
                "waveform and file are mutually exclusive".to_string(),
            ));
        }
        if self.write_timeout_ms == Some(0) {
            return Err(Error::Config(
                "write_timeout_ms must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// Write timeout as a Duration
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_ms.map(Duration::from_millis)
    }
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` on the command line
    CommandLine(PathBuf),
    /// `PATCHSIM_CONFIG` environment variable
    Environment(PathBuf),
    /// Per-user configuration directory
    UserConfigDir(PathBuf),
    /// No file: built-in defaults only
    CompiledDefaults,
}

/// Pick the configuration file following the priority order above
pub fn resolve_config_source(cli_path: Option<&Path>) -> ConfigSource {
    if let Some(path) = cli_path {
        return ConfigSource::CommandLine(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.is_empty() {
            return ConfigSource::Environment(PathBuf::from(path));
        }
    }

    if let Some(path) = dirs::config_dir().map(|d| d.join("patchsim").join("config.toml")) {
        if path.exists() {
            return ConfigSource::UserConfigDir(path);
        }
    }

    ConfigSource::CompiledDefaults
}

/// Load the effective configuration.
///
/// A file named explicitly on the command line must exist. A file named
/// by the environment that does not exist is skipped with a warning.
pub fn load_config(cli_path: Option<&Path>) -> Result<(TomlConfig, ConfigSource)> {
    let source = resolve_config_source(cli_path);

    let config = match &source {
        ConfigSource::CommandLine(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            TomlConfig::load(path)?
        }
        ConfigSource::Environment(path) => {
            if path.exists() {
                TomlConfig::load(path)?
            } else {
                warn!(
                    "{} points at missing file {}, using built-in defaults",
                    CONFIG_ENV_VAR,
                    path.display()
                );
                TomlConfig::default()
            }
        }
        ConfigSource::UserConfigDir(path) => TomlConfig::load(path)?,
        ConfigSource::CompiledDefaults => {
            info!("No configuration file found, using built-in defaults");
            TomlConfig::default()
        }
    };

    Ok((config, source))
}
