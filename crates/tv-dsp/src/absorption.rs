//! Absorption filters
//!
//! One-pole shelving filter parameterised by its gain at DC and at Nyquist.
//! Inside an FDN each line gets one, so a round trip through a line of length
//! `L` loses a frequency-dependent amount of energy and the decay time follows
//! the DC/Nyquist targets.
//!
//! ```text
//! H(z) = b0 / (1 + a1·z⁻¹)
//! r  = |H(1)| / |H(-1)| = magDC / magNY
//! a1 = (1 - r) / (1 + r)
//! b0 = (1 - a1) · magNY
//! ```

use log::warn;
use tv_core::{Sample, TvError, TvResult};

use crate::smoothing::SmoothedValue;
use crate::{FrameProcessor, MonoProcessor, Processor, ProcessorConfig};

/// Default ramp for coefficient changes (10 ms at 48 kHz)
pub const DEFAULT_COEFF_SMOOTHING_SAMPLES: u32 = 480;

/// Smallest magnitude used for coefficient derivation (-120 dB).
///
/// Keeps `magDC / magNY` finite; a NaN in the feedback loop never clears.
pub const MIN_MAGNITUDE: f64 = 1e-6;

/// Target gains of an absorption filter at DC and at Nyquist
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsorptionMagnitudes {
    pub dc: f64,
    pub nyquist: f64,
}

impl AbsorptionMagnitudes {
    pub const UNITY: Self = Self { dc: 1.0, nyquist: 1.0 };

    pub fn new(dc: f64, nyquist: f64) -> Self {
        Self { dc, nyquist }
    }

    fn validate(&self) -> TvResult<()> {
        for mag in [self.dc, self.nyquist] {
            if !(0.0..=1.0).contains(&mag) {
                return Err(TvError::InvalidMagnitude(mag as f32));
            }
        }
        Ok(())
    }

    /// True if either magnitude sits below [`MIN_MAGNITUDE`]
    #[inline]
    pub fn needs_floor(&self) -> bool {
        self.dc < MIN_MAGNITUDE || self.nyquist < MIN_MAGNITUDE
    }

    /// Clamp both magnitudes up to [`MIN_MAGNITUDE`]
    fn floored(self) -> Self {
        Self {
            dc: self.dc.max(MIN_MAGNITUDE),
            nyquist: self.nyquist.max(MIN_MAGNITUDE),
        }
    }

    /// `(b0, a1)` realising these magnitudes
    pub fn coefficients(&self) -> (f64, f64) {
        let r = self.dc / self.nyquist;
        let a1 = (1.0 - r) / (1.0 + r);
        let b0 = (1.0 - a1) * self.nyquist;
        (b0, a1)
    }
}

/// Magnitude of `b0 / (1 + a1·z⁻¹)` at normalised angular frequency `omega` (rad/sample)
pub fn one_pole_magnitude(b0: f64, a1: f64, omega: f64) -> f64 {
    // |1 + a1·e^{-jω}|² = 1 + 2·a1·cos ω + a1²
    let denom = (1.0 + 2.0 * a1 * omega.cos() + a1 * a1).sqrt();
    (b0 / denom).abs()
}

/// One-pole absorption filter with smoothed coefficients
#[derive(Debug, Clone)]
pub struct AbsorptionFilter {
    magnitudes: AbsorptionMagnitudes,
    floored: bool,
    b0: SmoothedValue,
    a1: SmoothedValue,
    state: f32,
}

impl AbsorptionFilter {
    pub fn new(magnitudes: AbsorptionMagnitudes) -> TvResult<Self> {
        magnitudes.validate()?;
        let floored = magnitudes.needs_floor();
        if floored {
            warn!(
                "absorption magnitudes ({:e}, {:e}) floored to {:e}",
                magnitudes.dc, magnitudes.nyquist, MIN_MAGNITUDE
            );
        }
        let magnitudes = magnitudes.floored();
        let (b0, a1) = magnitudes.coefficients();

        let mut b0_ramp = SmoothedValue::new(0.0, DEFAULT_COEFF_SMOOTHING_SAMPLES);
        let mut a1_ramp = SmoothedValue::new(0.0, DEFAULT_COEFF_SMOOTHING_SAMPLES);
        b0_ramp.reset(b0);
        a1_ramp.reset(a1);

        Ok(Self {
            magnitudes,
            floored,
            b0: b0_ramp,
            a1: a1_ramp,
            state: 0.0,
        })
    }

    /// Re-target the coefficients. The filter state is untouched.
    ///
    /// Runs on the audio thread: flooring is recorded in [`Self::is_floored`]
    /// instead of being logged.
    pub fn set_magnitudes(&mut self, magnitudes: AbsorptionMagnitudes) -> TvResult<()> {
        magnitudes.validate()?;
        self.floored = magnitudes.needs_floor();
        self.magnitudes = magnitudes.floored();
        let (b0, a1) = self.magnitudes.coefficients();
        self.b0.set_target(b0, false);
        self.a1.set_target(a1, false);
        Ok(())
    }

    /// Magnitudes currently targeted (after flooring)
    #[inline]
    pub fn magnitudes(&self) -> AbsorptionMagnitudes {
        self.magnitudes
    }

    /// Whether the last requested magnitudes were clamped to [`MIN_MAGNITUDE`]
    #[inline]
    pub fn is_floored(&self) -> bool {
        self.floored
    }

    /// Smoothed `(b0, a1)` in use this sample
    #[inline]
    pub fn coefficients(&self) -> (f64, f64) {
        (self.b0.current(), self.a1.current())
    }

    /// `(b0, a1)` the ramps are heading to
    #[inline]
    pub fn target_coefficients(&self) -> (f64, f64) {
        (self.b0.target(), self.a1.target())
    }

    /// Largest per-sample coefficient move of the active ramps
    #[inline]
    pub fn coefficient_steps(&self) -> (f64, f64) {
        (self.b0.step().abs(), self.a1.step().abs())
    }

    pub fn set_smoothing_samples(&mut self, samples: u32) {
        self.b0.set_smoothing_samples(samples);
        self.a1.set_smoothing_samples(samples);
    }
}

impl Processor for AbsorptionFilter {
    fn reset(&mut self) {
        self.state = 0.0;
    }
}

impl MonoProcessor for AbsorptionFilter {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let b0 = self.b0.advance() as f32;
        let a1 = self.a1.advance() as f32;
        let output = b0 * input - a1 * self.state;
        self.state = output;
        output
    }
}

impl ProcessorConfig for AbsorptionFilter {
    fn prepare(&mut self, sample_rate: f64, _max_block_size: usize) -> TvResult<()> {
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(TvError::InvalidSampleRate(sample_rate));
        }
        self.b0.prepare(sample_rate);
        self.a1.prepare(sample_rate);
        Ok(())
    }
}

// ============ Absorption Bank ============

/// One absorption filter per channel
#[derive(Debug, Clone)]
pub struct AbsorptionBank {
    filters: Vec<AbsorptionFilter>,
}

impl AbsorptionBank {
    pub fn new(magnitudes: &[AbsorptionMagnitudes]) -> TvResult<Self> {
        if magnitudes.is_empty() {
            return Err(TvError::InvalidParam("absorption bank needs at least one filter".into()));
        }
        let filters = magnitudes
            .iter()
            .map(|&m| AbsorptionFilter::new(m))
            .collect::<TvResult<Vec<_>>>()?;
        Ok(Self { filters })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.filters.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn filter(&self, index: usize) -> &AbsorptionFilter {
        &self.filters[index]
    }

    /// Re-target every filter. Validates all entries before applying any.
    pub fn set_magnitudes(&mut self, magnitudes: &[AbsorptionMagnitudes]) -> TvResult<()> {
        if magnitudes.len() != self.filters.len() {
            return Err(TvError::ChannelMismatch {
                expected: self.filters.len(),
                got: magnitudes.len(),
            });
        }
        for m in magnitudes {
            m.validate()?;
        }
        for (filter, &m) in self.filters.iter_mut().zip(magnitudes) {
            filter.set_magnitudes(m)?;
        }
        Ok(())
    }

    /// Number of filters whose current magnitudes were clamped
    pub fn floored_count(&self) -> usize {
        self.filters.iter().filter(|f| f.is_floored()).count()
    }

    pub fn set_smoothing_samples(&mut self, samples: u32) {
        for filter in &mut self.filters {
            filter.set_smoothing_samples(samples);
        }
    }

    /// Filter a frame in place
    #[inline]
    pub fn process_in_place(&mut self, frame: &mut [Sample]) {
        debug_assert_eq!(frame.len(), self.filters.len());
        for (filter, sample) in self.filters.iter_mut().zip(frame.iter_mut()) {
            *sample = filter.process_sample(*sample);
        }
    }
}

impl Processor for AbsorptionBank {
    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }
}

impl FrameProcessor for AbsorptionBank {
    #[inline]
    fn channels(&self) -> usize {
        self.filters.len()
    }

    #[inline]
    fn process_frame(&mut self, output: &mut [Sample], input: &[Sample]) {
        debug_assert_eq!(output.len(), self.filters.len());
        debug_assert_eq!(input.len(), self.filters.len());
        for ((filter, out), &inp) in self.filters.iter_mut().zip(output.iter_mut()).zip(input) {
            *out = filter.process_sample(inp);
        }
    }
}

impl ProcessorConfig for AbsorptionBank {
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> TvResult<()> {
        for filter in &mut self.filters {
            filter.prepare(sample_rate, max_block_size)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_response_at_dc_and_nyquist() {
        let grid = [1e-3, 0.05, 0.2, 0.5, 0.8, 0.99, 1.0];
        for &dc in &grid {
            for &ny in &grid {
                let (b0, a1) = AbsorptionMagnitudes::new(dc, ny).coefficients();
                // z = 1 and z = -1, evaluated directly from the transfer function
                assert_relative_eq!(b0 / (1.0 + a1), dc, max_relative = 1e-9);
                assert_relative_eq!(b0 / (1.0 - a1), ny, max_relative = 1e-9);
                assert_relative_eq!(one_pole_magnitude(b0, a1, 0.0), dc, max_relative = 1e-9);
                assert_relative_eq!(one_pole_magnitude(b0, a1, PI), ny, max_relative = 1e-9);
            }
        }
    }

    #[test]
    fn test_response_is_monotonic_between_edges() {
        let (b0, a1) = AbsorptionMagnitudes::new(0.9, 0.3).coefficients();
        let mut previous = one_pole_magnitude(b0, a1, 0.0);
        for k in 1..=64 {
            let mag = one_pole_magnitude(b0, a1, PI * k as f64 / 64.0);
            assert!(mag <= previous + 1e-12);
            previous = mag;
        }
    }

    #[test]
    fn test_equal_magnitudes_is_plain_gain() {
        let mut filter = AbsorptionFilter::new(AbsorptionMagnitudes::new(0.5, 0.5)).unwrap();
        assert_relative_eq!(filter.coefficients().1, 0.0);
        for &x in &[1.0, -0.25, 0.75] {
            assert_relative_eq!(filter.process_sample(x), 0.5 * x, epsilon = 1e-7);
        }
    }

    #[test]
    fn test_dc_gain_converges() {
        let mut filter = AbsorptionFilter::new(AbsorptionMagnitudes::new(0.8, 0.2)).unwrap();
        let mut y = 0.0;
        for _ in 0..2000 {
            y = filter.process_sample(1.0);
        }
        assert_relative_eq!(y, 0.8, epsilon = 1e-4);
    }

    #[test]
    fn test_zero_nyquist_is_floored() {
        let mut filter = AbsorptionFilter::new(AbsorptionMagnitudes::new(0.9, 0.0)).unwrap();
        assert!(filter.is_floored());
        assert_eq!(filter.magnitudes().nyquist, MIN_MAGNITUDE);
        let (b0, a1) = filter.coefficients();
        assert!(b0.is_finite() && a1.is_finite());
        assert!(a1.abs() < 1.0);

        filter.set_magnitudes(AbsorptionMagnitudes::new(0.9, 0.5)).unwrap();
        assert!(!filter.is_floored());
        filter.set_magnitudes(AbsorptionMagnitudes::new(0.0, 0.5)).unwrap();
        assert!(filter.is_floored());
        assert_eq!(filter.magnitudes().dc, MIN_MAGNITUDE);
    }

    #[test]
    fn test_bank_counts_floored_filters() {
        let mut bank = AbsorptionBank::new(&[AbsorptionMagnitudes::UNITY; 3]).unwrap();
        assert_eq!(bank.floored_count(), 0);
        let dark = AbsorptionMagnitudes::new(0.9, 0.0);
        bank.set_magnitudes(&[dark, AbsorptionMagnitudes::UNITY, dark]).unwrap();
        assert_eq!(bank.floored_count(), 2);
    }

    #[test]
    fn test_out_of_range_magnitudes_rejected() {
        assert!(AbsorptionFilter::new(AbsorptionMagnitudes::new(1.2, 0.5)).is_err());
        assert!(AbsorptionFilter::new(AbsorptionMagnitudes::new(0.5, -0.1)).is_err());
        assert!(AbsorptionFilter::new(AbsorptionMagnitudes::new(f64::NAN, 0.5)).is_err());
    }

    #[test]
    fn test_retarget_smooths_coefficients() {
        let mut filter = AbsorptionFilter::new(AbsorptionMagnitudes::new(0.9, 0.9)).unwrap();
        filter.set_magnitudes(AbsorptionMagnitudes::new(0.9, 0.1)).unwrap();
        let start = filter.coefficients();
        filter.process_sample(0.0);
        let next = filter.coefficients();
        assert!(next != start);
        assert!(next != filter.target_coefficients());
        for _ in 0..DEFAULT_COEFF_SMOOTHING_SAMPLES {
            filter.process_sample(0.0);
        }
        assert_eq!(filter.coefficients(), filter.target_coefficients());
    }

    #[test]
    fn test_bank_validates_before_applying() {
        let mut bank = AbsorptionBank::new(&[AbsorptionMagnitudes::UNITY; 3]).unwrap();
        let bad = [
            AbsorptionMagnitudes::new(0.5, 0.5),
            AbsorptionMagnitudes::new(0.5, 0.5),
            AbsorptionMagnitudes::new(2.0, 0.5),
        ];
        assert!(bank.set_magnitudes(&bad).is_err());
        assert_eq!(bank.filter(0).magnitudes(), AbsorptionMagnitudes::UNITY);
        assert!(bank.set_magnitudes(&bad[..2]).is_err());
    }
}
