//! Time-varying feedback delay network
//!
//! ```text
//!            ┌───────────────────────────────────────────┐
//!            ▼                                           │
//! in ──► (+) state ──► delay bank ──► absorption ──┬──► A ┘
//!                        ▲ (LFO offsets)           │
//!                                                  └──► out
//! ```
//!
//! `A` is a random orthogonal matrix, so all loss comes from the absorption
//! filters. Each filter is tuned to its line's length so that a round trip
//! loses exactly the energy the target decay time implies.

use log::debug;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tv_core::{Decibels, Sample, TvError, TvResult};

use crate::absorption::{AbsorptionBank, AbsorptionMagnitudes};
use crate::config::FdnConfig;
use crate::delay::DelayBank;
use crate::matrix::MixingMatrix;
use crate::modulation::{Lfo, MAX_MODULATION_DEPTH, validate_modulation};
use crate::smoothing::DEFAULT_SAMPLE_RATE;
use crate::{FrameProcessor, Processor, ProcessorConfig};

/// Shortest line drawn at construction
pub const MIN_LINE_LENGTH: usize = 300;
/// Longest line drawn at construction
pub const MAX_LINE_LENGTH: usize = 2600;
/// Extra buffer per line reserved for modulation
pub const MODULATION_HEADROOM: usize = MAX_MODULATION_DEPTH as usize;

/// Number of delay lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FdnOrder {
    Two = 2,
    Four = 4,
    Eight = 8,
    Sixteen = 16,
    ThirtyTwo = 32,
    SixtyFour = 64,
}

impl FdnOrder {
    pub const ALL: [FdnOrder; 6] = [
        FdnOrder::Two,
        FdnOrder::Four,
        FdnOrder::Eight,
        FdnOrder::Sixteen,
        FdnOrder::ThirtyTwo,
        FdnOrder::SixtyFour,
    ];

    #[inline]
    pub fn size(self) -> usize {
        self as usize
    }
}

impl TryFrom<u32> for FdnOrder {
    type Error = TvError;

    fn try_from(value: u32) -> TvResult<Self> {
        match value {
            2 => Ok(FdnOrder::Two),
            4 => Ok(FdnOrder::Four),
            8 => Ok(FdnOrder::Eight),
            16 => Ok(FdnOrder::Sixteen),
            32 => Ok(FdnOrder::ThirtyTwo),
            64 => Ok(FdnOrder::SixtyFour),
            other => Err(TvError::InvalidOrder(other)),
        }
    }
}

pub fn validate_t60(t60: f32) -> TvResult<()> {
    if t60.is_finite() && t60 > 0.0 {
        Ok(())
    } else {
        Err(TvError::InvalidT60(t60))
    }
}

pub fn validate_brightness(brightness: f32) -> TvResult<()> {
    if (0.0..=1.0).contains(&brightness) {
        Ok(())
    } else {
        Err(TvError::InvalidBrightness(brightness))
    }
}

/// Per-pass gains for a line of `length` samples.
///
/// A pass through the line must lose `60 · length / (T60 · sampleRate)` dB, at
/// DC for `t60` and at Nyquist for `t60 · brightness`.
pub fn line_magnitudes(length: usize, t60: f32, brightness: f32, sample_rate: f64) -> AbsorptionMagnitudes {
    let length = length as f64;
    let t60_dc = t60 as f64;
    let t60_nyquist = t60_dc * brightness as f64;

    let dc_db = length * (-60.0 / (t60_dc * sample_rate));
    let nyquist_db = length * (-60.0 / (t60_nyquist * sample_rate));

    AbsorptionMagnitudes::new(Decibels(dc_db).to_gain(), Decibels(nyquist_db).to_gain())
}

/// Closed-loop FDN of fixed order
#[derive(Debug, Clone)]
pub struct ReverbEngine {
    order: FdnOrder,
    delay_lengths: Vec<usize>,
    max_delay_lengths: Vec<usize>,
    delays: DelayBank,
    absorption: AbsorptionBank,
    magnitudes: Vec<AbsorptionMagnitudes>,
    feedback: MixingMatrix,
    feedback_state: Vec<Sample>,
    scratch: Vec<Sample>,
    lfos: Vec<Lfo>,
    offsets: Vec<Sample>,
    modulating: bool,
    modulation_depth: f32,
    modulation_rate: f32,
    t60: f32,
    brightness: f32,
    sample_rate: f64,
    max_block_size: usize,
    prepared: bool,
}

impl ReverbEngine {
    /// Build an engine drawing delay lengths and the feedback matrix from `rng`
    pub fn new<R: Rng>(order: u32, t60: f32, brightness: f32, rng: &mut R) -> TvResult<Self> {
        let order = FdnOrder::try_from(order)?;
        validate_t60(t60)?;
        validate_brightness(brightness)?;

        let n = order.size();
        let delay_lengths: Vec<usize> = (0..n)
            .map(|_| rng.random_range(MIN_LINE_LENGTH..=MAX_LINE_LENGTH))
            .collect();
        let max_delay_lengths: Vec<usize> = delay_lengths.iter().map(|&l| l + MODULATION_HEADROOM).collect();
        let initial_delays: Vec<f32> = delay_lengths.iter().map(|&l| l as f32).collect();

        let delays = DelayBank::new(&max_delay_lengths, &initial_delays)?;
        let magnitudes: Vec<AbsorptionMagnitudes> = delay_lengths
            .iter()
            .map(|&l| line_magnitudes(l, t60, brightness, DEFAULT_SAMPLE_RATE))
            .collect();
        let absorption = AbsorptionBank::new(&magnitudes)?;
        let feedback = MixingMatrix::orthogonal(n, rng)?;

        let lfos = (0..n).map(|i| Lfo::new(i as f64 / n as f64)).collect();

        debug!("ReverbEngine order {n}, T60 {t60} s, brightness {brightness}, delays {delay_lengths:?}");

        Ok(Self {
            order,
            delay_lengths,
            max_delay_lengths,
            delays,
            absorption,
            magnitudes,
            feedback,
            feedback_state: vec![0.0; n],
            scratch: vec![0.0; n],
            lfos,
            offsets: vec![0.0; n],
            modulating: false,
            modulation_depth: 0.0,
            modulation_rate: 0.0,
            t60,
            brightness,
            sample_rate: DEFAULT_SAMPLE_RATE,
            max_block_size: 0,
            prepared: false,
        })
    }

    /// Deterministic construction from a seed
    pub fn with_seed(order: u32, t60: f32, brightness: f32, seed: u64) -> TvResult<Self> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        Self::new(order, t60, brightness, &mut rng)
    }

    /// Build from a validated configuration (mix is handled by the block processor)
    pub fn from_config(config: &FdnConfig) -> TvResult<Self> {
        Self::from_config_with_rng(config, &mut ChaCha8Rng::seed_from_u64(config.seed))
    }

    /// As [`from_config`](Self::from_config), drawing from `rng` instead of the config seed
    pub fn from_config_with_rng<R: Rng>(config: &FdnConfig, rng: &mut R) -> TvResult<Self> {
        config.validate()?;
        let mut engine = Self::new(config.order, config.t60, config.brightness, rng)?;
        engine.set_smoothing_samples(config.delay_smoothing_samples, config.coefficient_smoothing_samples);
        engine.set_modulation(config.modulation_depth, config.modulation_rate)?;
        Ok(engine)
    }

    // ─── Retuning ────────────────────────────────────────────────────────

    pub fn set_t60(&mut self, t60: f32) -> TvResult<()> {
        validate_t60(t60)?;
        self.t60 = t60;
        self.update_absorption()
    }

    pub fn set_brightness(&mut self, brightness: f32) -> TvResult<()> {
        validate_brightness(brightness)?;
        self.brightness = brightness;
        self.update_absorption()
    }

    /// LFO depth in samples and rate in Hz; depth 0 fades modulation out
    pub fn set_modulation(&mut self, depth_samples: f32, rate_hz: f32) -> TvResult<()> {
        validate_modulation(depth_samples, rate_hz)?;
        self.modulation_depth = depth_samples;
        self.modulation_rate = rate_hz;
        for lfo in &mut self.lfos {
            lfo.set_rate(rate_hz as f64);
            lfo.set_depth(depth_samples as f64);
        }
        if depth_samples > 0.0 {
            self.modulating = true;
        }
        Ok(())
    }

    /// Ramp lengths for delay and absorption coefficient changes
    pub fn set_smoothing_samples(&mut self, delay_samples: u32, coefficient_samples: u32) {
        self.delays.set_smoothing_samples(delay_samples);
        self.absorption.set_smoothing_samples(coefficient_samples);
    }

    /// Recompute per-line targets into the preallocated `magnitudes`
    fn update_absorption(&mut self) -> TvResult<()> {
        for (mag, &length) in self.magnitudes.iter_mut().zip(&self.delay_lengths) {
            *mag = line_magnitudes(length, self.t60, self.brightness, self.sample_rate);
        }
        self.absorption.set_magnitudes(&self.magnitudes)
    }

    // ─── Processing ──────────────────────────────────────────────────────

    /// Process one frame of `order` samples, with validation
    pub fn process(&mut self, output: &mut [Sample], input: &[Sample]) -> TvResult<()> {
        if !self.prepared {
            return Err(TvError::NotPrepared);
        }
        let n = self.order.size();
        if input.len() != n {
            return Err(TvError::ChannelMismatch { expected: n, got: input.len() });
        }
        if output.len() != n {
            return Err(TvError::ChannelMismatch { expected: n, got: output.len() });
        }
        if input.iter().any(|x| !x.is_finite()) {
            output.fill(0.0);
            return Err(TvError::NonFiniteInput);
        }
        self.process_frame(output, input);
        Ok(())
    }

    fn advance_modulation(&mut self) {
        if !self.modulating {
            return;
        }
        for (offset, lfo) in self.offsets.iter_mut().zip(self.lfos.iter_mut()) {
            *offset = lfo.next_offset();
        }
        // Faded out completely: stop evaluating the oscillators
        if self.modulation_depth == 0.0 && self.lfos.iter().all(|lfo| lfo.depth() == 0.0) {
            self.modulating = false;
            self.offsets.fill(0.0);
        }
    }

    // ─── Accessors ───────────────────────────────────────────────────────

    #[inline]
    pub fn order(&self) -> FdnOrder {
        self.order
    }

    pub fn delay_lengths(&self) -> &[usize] {
        &self.delay_lengths
    }

    pub fn max_delay_lengths(&self) -> &[usize] {
        &self.max_delay_lengths
    }

    pub fn delays(&self) -> &DelayBank {
        &self.delays
    }

    pub fn absorption(&self) -> &AbsorptionBank {
        &self.absorption
    }

    pub fn feedback_matrix(&self) -> &MixingMatrix {
        &self.feedback
    }

    /// Signal currently recirculating into the delay lines
    pub fn feedback_state(&self) -> &[Sample] {
        &self.feedback_state
    }

    #[inline]
    pub fn t60(&self) -> f32 {
        self.t60
    }

    #[inline]
    pub fn brightness(&self) -> f32 {
        self.brightness
    }

    /// `(depth_samples, rate_hz)` last requested
    pub fn modulation(&self) -> (f32, f32) {
        (self.modulation_depth, self.modulation_rate)
    }

    #[inline]
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    #[inline]
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    #[inline]
    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    /// Zero all signal state; tuning, coefficients and matrix are kept
    pub fn clear(&mut self) {
        self.delays.reset();
        self.absorption.reset();
        self.feedback_state.fill(0.0);
        self.scratch.fill(0.0);
        for lfo in &mut self.lfos {
            lfo.reset_phase();
        }
    }
}

impl Processor for ReverbEngine {
    fn reset(&mut self) {
        self.clear();
    }
}

impl FrameProcessor for ReverbEngine {
    #[inline]
    fn channels(&self) -> usize {
        self.order.size()
    }

    /// Hot path: one sample per line, dimensions checked in debug builds
    #[inline]
    fn process_frame(&mut self, output: &mut [Sample], input: &[Sample]) {
        debug_assert_eq!(input.len(), self.feedback_state.len());
        debug_assert_eq!(output.len(), self.feedback_state.len());

        for (state, &x) in self.feedback_state.iter_mut().zip(input) {
            *state += x;
        }

        self.advance_modulation();
        self.delays
            .process_frame_modulated(&mut self.scratch, &self.feedback_state, &self.offsets);
        self.absorption.process_in_place(&mut self.scratch);

        output.copy_from_slice(&self.scratch);
        self.feedback.process_frame(&mut self.feedback_state, &self.scratch);
    }
}

impl ProcessorConfig for ReverbEngine {
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> TvResult<()> {
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(TvError::InvalidSampleRate(sample_rate));
        }
        if max_block_size == 0 {
            return Err(TvError::InvalidBlockSize(max_block_size));
        }

        self.delays.prepare(sample_rate, max_block_size)?;
        self.absorption.prepare(sample_rate, max_block_size)?;
        for lfo in &mut self.lfos {
            lfo.prepare(sample_rate);
        }

        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.update_absorption()?;
        self.prepared = true;

        debug!(
            "ReverbEngine prepared: {} Hz, block {}, order {}, {} lines floored",
            sample_rate,
            max_block_size,
            self.order.size(),
            self.absorption.floored_count()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn prepared(order: u32, t60: f32, brightness: f32) -> ReverbEngine {
        let mut engine = ReverbEngine::with_seed(order, t60, brightness, 1234).unwrap();
        engine.prepare(48000.0, 512).unwrap();
        engine
    }

    #[test]
    fn test_order_validation() {
        for order in FdnOrder::ALL {
            assert!(ReverbEngine::with_seed(order.size() as u32, 1.0, 0.5, 0).is_ok());
        }
        for bad in [0, 1, 3, 12, 128] {
            assert_eq!(
                ReverbEngine::with_seed(bad, 1.0, 0.5, 0).unwrap_err(),
                TvError::InvalidOrder(bad)
            );
        }
    }

    #[test]
    fn test_parameter_validation() {
        assert!(ReverbEngine::with_seed(4, 0.0, 0.5, 0).is_err());
        assert!(ReverbEngine::with_seed(4, -1.0, 0.5, 0).is_err());
        assert!(ReverbEngine::with_seed(4, f32::INFINITY, 0.5, 0).is_err());
        assert!(ReverbEngine::with_seed(4, 1.0, 1.5, 0).is_err());

        let mut engine = prepared(4, 1.0, 0.5);
        assert!(engine.set_t60(f32::NAN).is_err());
        assert!(engine.set_brightness(-0.1).is_err());
        assert_eq!(engine.t60(), 1.0);
        assert_eq!(engine.brightness(), 0.5);
    }

    #[test]
    fn test_delay_lengths_in_range() {
        let engine = ReverbEngine::with_seed(64, 1.0, 0.5, 99).unwrap();
        for (&len, &max) in engine.delay_lengths().iter().zip(engine.max_delay_lengths()) {
            assert!((MIN_LINE_LENGTH..=MAX_LINE_LENGTH).contains(&len));
            assert_eq!(max, len + MODULATION_HEADROOM);
        }
    }

    #[test]
    fn test_seed_determines_network() {
        let a = ReverbEngine::with_seed(16, 2.0, 0.5, 5).unwrap();
        let b = ReverbEngine::with_seed(16, 2.0, 0.5, 5).unwrap();
        let c = ReverbEngine::with_seed(16, 2.0, 0.5, 6).unwrap();
        assert_eq!(a.delay_lengths(), b.delay_lengths());
        assert_eq!(a.feedback_matrix(), b.feedback_matrix());
        assert_ne!(a.delay_lengths(), c.delay_lengths());
    }

    #[test]
    fn test_line_magnitudes() {
        // 480 samples at 48 kHz with a 1 s T60: 10 ms → -0.6 dB per pass
        let mags = line_magnitudes(480, 1.0, 1.0, 48000.0);
        assert_relative_eq!(Decibels::from_gain(mags.dc).0, -0.6, epsilon = 1e-9);
        assert_relative_eq!(mags.dc, mags.nyquist);

        let dark = line_magnitudes(480, 1.0, 0.5, 48000.0);
        assert_relative_eq!(Decibels::from_gain(dark.nyquist).0, -1.2, epsilon = 1e-9);

        let none = line_magnitudes(480, 1.0, 0.0, 48000.0);
        assert_eq!(none.nyquist, 0.0);
    }

    #[test]
    fn test_process_requires_prepare() {
        let mut engine = ReverbEngine::with_seed(4, 1.0, 0.5, 0).unwrap();
        let mut out = [0.0; 4];
        assert_eq!(engine.process(&mut out, &[0.0; 4]), Err(TvError::NotPrepared));
        engine.prepare(48000.0, 64).unwrap();
        assert!(engine.process(&mut out, &[0.0; 4]).is_ok());
    }

    #[test]
    fn test_prepare_validation() {
        let mut engine = ReverbEngine::with_seed(4, 1.0, 0.5, 0).unwrap();
        assert!(engine.prepare(0.0, 64).is_err());
        assert!(engine.prepare(f64::NAN, 64).is_err());
        assert!(engine.prepare(48000.0, 0).is_err());
        assert!(!engine.is_prepared());
    }

    #[test]
    fn test_channel_mismatch() {
        let mut engine = prepared(8, 1.0, 0.5);
        let mut out = [0.0; 8];
        assert_eq!(
            engine.process(&mut out, &[0.0; 4]),
            Err(TvError::ChannelMismatch { expected: 8, got: 4 })
        );
        assert!(engine.process(&mut out[..7], &[0.0; 8]).is_err());
    }

    #[test]
    fn test_non_finite_input_rejected() {
        let mut engine = prepared(4, 1.0, 0.5);
        let mut out = [1.0; 4];
        assert_eq!(
            engine.process(&mut out, &[0.0, f32::NAN, 0.0, 0.0]),
            Err(TvError::NonFiniteInput)
        );
        assert_eq!(out, [0.0; 4]);
        assert!(engine.feedback_state().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_impulse_emerges_after_shortest_line() {
        let mut engine = prepared(4, 2.0, 1.0);
        let shortest = *engine.delay_lengths().iter().min().unwrap();
        let mut out = [0.0; 4];

        engine.process(&mut out, &[1.0; 4]).unwrap();
        let mut first_nonzero = None;
        for n in 1..=MAX_LINE_LENGTH {
            engine.process(&mut out, &[0.0; 4]).unwrap();
            if out.iter().any(|&s| s != 0.0) {
                first_nonzero = Some(n);
                break;
            }
        }
        assert_eq!(first_nonzero, Some(shortest));
    }

    #[test]
    fn test_clear_silences_but_keeps_tuning() {
        let mut engine = prepared(8, 3.0, 0.5);
        let mut out = [0.0; 8];
        engine.process(&mut out, &[1.0; 8]).unwrap();
        for _ in 0..3000 {
            engine.process(&mut out, &[0.0; 8]).unwrap();
        }
        let lengths = engine.delay_lengths().to_vec();
        let coefficients = engine.absorption().filter(0).coefficients();

        engine.clear();
        for _ in 0..3000 {
            engine.process(&mut out, &[0.0; 8]).unwrap();
            assert!(out.iter().all(|&s| s == 0.0));
        }
        assert_eq!(engine.delay_lengths(), &lengths[..]);
        assert_eq!(engine.absorption().filter(0).coefficients(), coefficients);
    }

    #[test]
    fn test_zero_depth_modulation_is_exact() {
        let mut plain = prepared(4, 1.5, 0.6);
        let mut modulated = prepared(4, 1.5, 0.6);
        modulated.set_modulation(0.0, 3.0).unwrap();

        let mut a = [0.0; 4];
        let mut b = [0.0; 4];
        for n in 0..6000 {
            let x = if n == 0 { 1.0 } else { 0.0 };
            plain.process(&mut a, &[x; 4]).unwrap();
            modulated.process(&mut b, &[x; 4]).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_modulation_changes_output_and_stays_finite() {
        let mut plain = prepared(8, 1.5, 0.6);
        let mut modulated = prepared(8, 1.5, 0.6);
        modulated.set_modulation(20.0, 2.0).unwrap();
        assert!(modulated.set_modulation(150.0, 2.0).is_err());

        let mut a = [0.0; 8];
        let mut b = [0.0; 8];
        let mut differs = false;
        for n in 0..20000 {
            let x = if n == 0 { 1.0 } else { 0.0 };
            plain.process(&mut a, &[x; 8]).unwrap();
            modulated.process(&mut b, &[x; 8]).unwrap();
            assert!(b.iter().all(|s| s.is_finite()));
            differs |= a != b;
        }
        assert!(differs);
    }

    #[test]
    fn test_from_config() {
        let config = FdnConfig::hall();
        let engine = ReverbEngine::from_config(&config).unwrap();
        assert_eq!(engine.order(), FdnOrder::ThirtyTwo);
        assert_eq!(engine.modulation(), (8.0, 0.5));

        let bad = FdnConfig { order: 5, ..FdnConfig::default() };
        assert!(ReverbEngine::from_config(&bad).is_err());
    }
}
