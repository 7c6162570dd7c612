//! Linear Parameter Smoothing
//!
//! Click-free parameter changes for the reverberator:
//! - Linear ramp toward a target over a fixed number of samples
//! - Exact arrival at the target (no residual error, no overshoot)
//! - Ramp length floor of ~1 ms at the configured sample rate
//! - Zero allocation on the audio thread
//!
//! Values are kept in `f64` so that slow ramps on large values (delay lengths of
//! thousands of samples) keep advancing where an `f32` step would round away.

use tv_core::Sample;

/// Sample rate assumed until `prepare` is called
pub const DEFAULT_SAMPLE_RATE: f64 = 48000.0;

/// Minimum absolute difference between target and current value
pub const MIN_DELTA: f64 = 1e-9;

/// Smallest permitted ramp length at `sample_rate` (1 ms, at least one sample)
#[inline]
pub fn min_smoothing_samples(sample_rate: f64) -> u32 {
    ((sample_rate / 1000.0).round() as u32).max(1)
}

/// Scalar that ramps linearly toward a target
#[derive(Debug, Clone)]
pub struct SmoothedValue {
    current: f64,
    target: f64,
    step: f64,
    smoothing_samples: u32,
    sample_rate: f64,
}

impl SmoothedValue {
    /// Create at `initial` with a ramp of `smoothing_samples` at 48 kHz
    pub fn new(initial: f64, smoothing_samples: u32) -> Self {
        Self {
            current: initial,
            target: initial,
            step: 0.0,
            smoothing_samples: smoothing_samples.max(min_smoothing_samples(DEFAULT_SAMPLE_RATE)),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }

    /// Set ramp length in samples (clamped to the 1 ms floor)
    pub fn set_smoothing_samples(&mut self, samples: u32) {
        self.smoothing_samples = samples.max(min_smoothing_samples(self.sample_rate));
    }

    /// Set ramp length in milliseconds at the current sample rate
    pub fn set_smoothing_time_ms(&mut self, time_ms: f64) {
        let samples = (time_ms.max(0.0) * 0.001 * self.sample_rate).round() as u32;
        self.set_smoothing_samples(samples);
    }

    #[inline]
    pub fn smoothing_samples(&self) -> u32 {
        self.smoothing_samples
    }

    /// Rescale the ramp length to a new sample rate, keeping its duration
    pub fn prepare(&mut self, sample_rate: f64) {
        debug_assert!(sample_rate > 0.0);
        let ratio = sample_rate / self.sample_rate;
        self.sample_rate = sample_rate;
        let samples = (self.smoothing_samples as f64 * ratio).round() as u32;
        self.set_smoothing_samples(samples);

        // Keep an in-flight ramp continuous at the new rate
        if self.step != 0.0 {
            self.step = (self.target - self.current) / self.smoothing_samples as f64;
        }
    }

    /// Set a new target. With `skip` the value jumps there immediately.
    #[inline]
    pub fn set_target(&mut self, value: f64, skip: bool) {
        self.target = value;
        let delta = value - self.current;
        self.step = if delta.abs() > MIN_DELTA {
            delta / self.smoothing_samples as f64
        } else {
            0.0
        };

        if skip {
            self.current = value;
            self.step = 0.0;
        }
    }

    /// Jump to `value` with no ramp
    #[inline]
    pub fn reset(&mut self, value: f64) {
        self.set_target(value, true);
    }

    #[inline]
    pub fn current(&self) -> f64 {
        self.current
    }

    #[inline]
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Per-sample increment of the active ramp (0 when idle)
    #[inline]
    pub fn step(&self) -> f64 {
        self.step
    }

    /// True while another `advance` would add a step rather than snap
    #[inline]
    pub fn is_smoothing(&self) -> bool {
        (self.target - self.current).abs() > (2.0 * self.step).abs() && self.step.abs() > MIN_DELTA
    }

    /// Move one sample toward the target and return the new value.
    ///
    /// Snaps once the remaining distance is within two steps, so the ramp never
    /// overshoots and lands exactly on the target.
    #[inline]
    pub fn advance(&mut self) -> f64 {
        if self.is_smoothing() {
            self.current += self.step;
        } else {
            self.current = self.target;
            self.step = 0.0;
        }
        self.current
    }

    /// Fill buffer with smoothed values
    pub fn fill_buffer(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.advance() as Sample;
        }
    }

    /// Process block, applying smoothed gain to audio
    pub fn apply_gain(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample *= self.advance() as Sample;
        }
    }
}

// ============ Tests ============
