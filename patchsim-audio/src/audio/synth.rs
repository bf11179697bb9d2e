//! Periodic waveform synthesis
//!
//! A phase accumulator in seconds: every sample advances the phase by
//! `1 / sample_rate` and wraps it modulo the period `1 / frequency`.
//! Phase persists across `generate` calls so consecutive blocks join
//! without discontinuity.

use crate::error::{Error, Result};
use std::f64::consts::PI;
use std::fmt;

/// Fixed output amplitude as a fraction of full scale
pub const SYNTH_AMPLITUDE: f32 = 0.6;

/// Periodic waveform shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Square,
    /// Ramps with slope 4A per period: reaches -A at phase 0 and +A at half
    /// a period, and `f(p + P/2) == -f(p)`.
    Triangle,
    Saw,
    Sine,
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Square => "square",
            Self::Triangle => "triangle",
            Self::Saw => "saw",
            Self::Sine => "sine",
        };
        f.write_str(name)
    }
}

/// Saw ramp variant.
///
/// `Reference` keeps the historical ramp, which spans `[-2A, 0)` and jumps
/// to `-A` on the wrapping sample. `Corrected` ramps `2A·p/P − A` over
/// `[-A, A)` like the other shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SawShape {
    #[default]
    Reference,
    Corrected,
}

/// Phase-accumulating oscillator
#[derive(Debug, Clone)]
pub struct Synthesizer {
    waveform: Waveform,
    saw_shape: SawShape,
    amplitude: f32,
    /// Current position within the period (seconds)
    phase: f32,
    /// Seconds per sample
    phase_step: f32,
    /// Seconds per period
    period_len: f32,
}

impl Synthesizer {
    /// Create an oscillator at phase 0.
    ///
    /// # Errors
    /// Returns `InvalidParameter` for a zero sample rate or a frequency that
    /// is not a positive finite number.
    pub fn new(waveform: Waveform, sample_rate: u32, frequency: f32) -> Result<Self> {
        if sample_rate == 0 {
            return Err(Error::InvalidParameter(
                "sample rate must be greater than 0".to_string(),
            ));
        }
        if !frequency.is_finite() || frequency <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "frequency must be positive and finite, got {}",
                frequency
            )));
        }

        let phase_step = 1.0 / sample_rate as f32;
        // Same rounding as rate/freq samples of phase_step each
        let period_len = (sample_rate as f32 / frequency) * phase_step;

        Ok(Self {
            waveform,
            saw_shape: SawShape::default(),
            amplitude: SYNTH_AMPLITUDE,
            phase: 0.0,
            phase_step,
            period_len,
        })
    }

    /// Select the saw ramp variant
    pub fn with_saw_shape(mut self, shape: SawShape) -> Self {
        self.saw_shape = shape;
        self
    }

    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    pub fn saw_shape(&self) -> SawShape {
        self.saw_shape
    }

    pub fn phase(&self) -> f32 {
        self.phase
    }

    pub fn phase_step(&self) -> f32 {
        self.phase_step
    }

    pub fn period_len(&self) -> f32 {
        self.period_len
    }

    /// Fill `out` with the next `out.len()` samples, advancing the phase
    pub fn generate(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            let next = (self.phase + self.phase_step) % self.period_len;
            *sample = self.sample_at(self.phase, next);
            self.phase = next;
        }
    }

    /// Waveform value at phase `p`; `next` is the phase after this sample
    fn sample_at(&self, p: f32, next: f32) -> f32 {
        let a = self.amplitude;
        let period = self.period_len;

        match self.waveform {
            Waveform::Square => {
                if p < period / 2.0 {
                    a
                } else {
                    -a
                }
            }
            // Slope 4A/P so each half spans the full [-A, A] swing
            Waveform::Triangle => {
                if p < period / 2.0 {
                    4.0 * a * (p / period) - a
                } else {
                    4.0 * a * (1.0 - p / period) - a
                }
            }
            Waveform::Sine => {
                a * (2.0 * PI * p as f64 / period as f64).sin() as f32
            }
            Waveform::Saw => match self.saw_shape {
                SawShape::Reference => {
                    if next < p {
                        -a
                    } else {
                        2.0 * a * (p / period - 1.0)
                    }
                }
                SawShape::Corrected => 2.0 * a * (p / period) - a,
            },
        }
    }
}
