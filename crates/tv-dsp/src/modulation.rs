//! Delay-time modulation
//!
//! A sine LFO per FDN line, added to the smoothed delay as an unsmoothed
//! per-sample offset. Depth is ramped so enabling or disabling modulation
//! fades in and out instead of jumping.

use std::f64::consts::TAU;

use tv_core::{TvError, TvResult};

use crate::smoothing::{DEFAULT_SAMPLE_RATE, SmoothedValue};

/// Maximum modulation depth in samples (the delay lines' headroom)
pub const MAX_MODULATION_DEPTH: f32 = 100.0;

/// Maximum modulation rate in Hz
pub const MAX_MODULATION_RATE: f32 = 20.0;

/// Depth fade length (100 ms at 48 kHz)
pub const DEFAULT_DEPTH_SMOOTHING_SAMPLES: u32 = 4800;

/// Check depth and rate against their permitted ranges
pub fn validate_modulation(depth_samples: f32, rate_hz: f32) -> TvResult<()> {
    if !(0.0..=MAX_MODULATION_DEPTH).contains(&depth_samples) {
        return Err(TvError::InvalidParam(format!(
            "modulation depth {depth_samples} outside [0, {MAX_MODULATION_DEPTH}] samples"
        )));
    }
    if !(0.0..=MAX_MODULATION_RATE).contains(&rate_hz) {
        return Err(TvError::InvalidParam(format!(
            "modulation rate {rate_hz} outside [0, {MAX_MODULATION_RATE}] Hz"
        )));
    }
    Ok(())
}

/// Sine oscillator with smoothed depth
#[derive(Debug, Clone)]
pub struct Lfo {
    /// Phase in cycles, [0, 1)
    phase: f64,
    initial_phase: f64,
    increment: f64,
    rate_hz: f64,
    sample_rate: f64,
    depth: SmoothedValue,
}

impl Lfo {
    /// Create a silent oscillator starting at `initial_phase` cycles
    pub fn new(initial_phase: f64) -> Self {
        let initial_phase = initial_phase.rem_euclid(1.0);
        Self {
            phase: initial_phase,
            initial_phase,
            increment: 0.0,
            rate_hz: 0.0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            depth: SmoothedValue::new(0.0, DEFAULT_DEPTH_SMOOTHING_SAMPLES),
        }
    }

    pub fn set_rate(&mut self, rate_hz: f64) {
        self.rate_hz = rate_hz.max(0.0);
        self.increment = self.rate_hz / self.sample_rate;
    }

    /// Fade toward a new depth in samples
    pub fn set_depth(&mut self, depth_samples: f64) {
        self.depth.set_target(depth_samples.max(0.0), false);
    }

    #[inline]
    pub fn rate(&self) -> f64 {
        self.rate_hz
    }

    #[inline]
    pub fn depth(&self) -> f64 {
        self.depth.current()
    }

    #[inline]
    pub fn target_depth(&self) -> f64 {
        self.depth.target()
    }

    #[inline]
    pub fn phase(&self) -> f64 {
        self.phase
    }

    pub fn prepare(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
        self.increment = self.rate_hz / sample_rate;
        self.depth.prepare(sample_rate);
    }

    /// Return to the initial phase. Rate and depth are kept.
    pub fn reset_phase(&mut self) {
        self.phase = self.initial_phase;
    }

    /// Next offset in samples
    #[inline]
    pub fn next_offset(&mut self) -> f32 {
        let depth = self.depth.advance();
        let value = depth * (TAU * self.phase).sin();
        self.phase += self.increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        value as f32
    }
}
