//! Host-facing block processor
//!
//! Couples `C` host channels to an FDN of any order, adds a smoothed dry/wet
//! mix and a smoothed bypass crossfade, and receives parameter changes from a
//! control thread through [`FdnControls`].

use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tv_core::{
    ParamRange, ParamReceiver, ParamSender, Sample, TvError, TvResult, param_channel,
};

use crate::config::{BRIGHTNESS_RANGE, FdnConfig, MIX_RANGE, T60_RANGE};
use crate::fdn::ReverbEngine;
use crate::matrix::MixingMatrix;
use crate::smoothing::SmoothedValue;
use crate::{FrameProcessor, Processor, ProcessorConfig};

/// Parameters exposed to a control surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FdnParam {
    T60,
    Brightness,
    Mix,
    Enabled,
}

impl FdnParam {
    pub const ALL: [FdnParam; 4] = [FdnParam::T60, FdnParam::Brightness, FdnParam::Mix, FdnParam::Enabled];

    pub fn range(self) -> ParamRange {
        match self {
            FdnParam::T60 => T60_RANGE,
            FdnParam::Brightness => BRIGHTNESS_RANGE,
            FdnParam::Mix => MIX_RANGE,
            FdnParam::Enabled => ParamRange::linear(0.0, 1.0, 1.0),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FdnParam::T60 => "t60",
            FdnParam::Brightness => "brightness",
            FdnParam::Mix => "mix",
            FdnParam::Enabled => "enabled",
        }
    }
}

/// Control-thread handle of an [`FdnProcessor`]
#[derive(Debug)]
pub struct FdnControls {
    t60: ParamSender,
    brightness: ParamSender,
    mix: ParamSender,
    enabled: ParamSender,
}

impl FdnControls {
    pub fn set_t60(&mut self, seconds: f32) -> TvResult<()> {
        if !T60_RANGE.contains(seconds) {
            return Err(TvError::InvalidT60(seconds));
        }
        self.t60.send(seconds);
        Ok(())
    }

    pub fn set_brightness(&mut self, brightness: f32) -> TvResult<()> {
        if !BRIGHTNESS_RANGE.contains(brightness) {
            return Err(TvError::InvalidBrightness(brightness));
        }
        self.brightness.send(brightness);
        Ok(())
    }

    pub fn set_mix(&mut self, mix: f32) -> TvResult<()> {
        if !MIX_RANGE.contains(mix) {
            return Err(TvError::InvalidParam(format!("mix {mix} outside [0, 1]")));
        }
        self.mix.send(mix);
        Ok(())
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled.send(if enabled { 1.0 } else { 0.0 });
    }

    /// Set a parameter from a 0-1 knob position
    pub fn set_normalized(&mut self, param: FdnParam, normalized: f32) -> TvResult<()> {
        if !normalized.is_finite() {
            return Err(TvError::InvalidParam(format!("{} normalized value {normalized}", param.name())));
        }
        let value = param.range().denormalize(normalized);
        match param {
            FdnParam::T60 => self.set_t60(value),
            FdnParam::Brightness => self.set_brightness(value),
            FdnParam::Mix => self.set_mix(value),
            FdnParam::Enabled => {
                self.set_enabled(value >= 0.5);
                Ok(())
            }
        }
    }

    /// Last value sent for `param`
    pub fn value(&self, param: FdnParam) -> f32 {
        match param {
            FdnParam::T60 => self.t60.value(),
            FdnParam::Brightness => self.brightness.value(),
            FdnParam::Mix => self.mix.value(),
            FdnParam::Enabled => self.enabled.value(),
        }
    }
}

#[derive(Debug)]
struct ParamInputs {
    t60: ParamReceiver,
    brightness: ParamReceiver,
    mix: ParamReceiver,
    enabled: ParamReceiver,
}

/// FDN reverberator over `C` host channels
#[derive(Debug)]
pub struct FdnProcessor {
    channels: usize,
    engine: ReverbEngine,
    input_coupling: MixingMatrix,
    output_coupling: MixingMatrix,
    mix: SmoothedValue,
    enabled: SmoothedValue,
    inputs: ParamInputs,
    rng: ChaCha8Rng,
    host_frame: Vec<Sample>,
    line_in: Vec<Sample>,
    line_out: Vec<Sample>,
    wet_frame: Vec<Sample>,
    wet_gains: Vec<Sample>,
    rejected_updates: u64,
    max_block_size: usize,
    prepared: bool,
}

impl FdnProcessor {
    /// Build a processor and the control handle that drives it
    pub fn new(config: &FdnConfig, channels: usize) -> TvResult<(Self, FdnControls)> {
        if channels == 0 {
            return Err(TvError::ChannelMismatch { expected: 1, got: 0 });
        }
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let engine = ReverbEngine::from_config_with_rng(config, &mut rng)?;
        let order = engine.order().size();
        let input_coupling = MixingMatrix::coupling(order, channels, &mut rng)?;
        let output_coupling = MixingMatrix::coupling(channels, order, &mut rng)?;

        let mix = SmoothedValue::new(config.mix as f64, config.mix_smoothing_samples);
        let enabled = SmoothedValue::new(1.0, config.mix_smoothing_samples);

        let (t60_tx, t60_rx) = param_channel(config.t60);
        let (brightness_tx, brightness_rx) = param_channel(config.brightness);
        let (mix_tx, mix_rx) = param_channel(config.mix);
        let (enabled_tx, enabled_rx) = param_channel(1.0);

        debug!("FdnProcessor: {channels} host channels, order {order}");

        let processor = Self {
            channels,
            engine,
            input_coupling,
            output_coupling,
            mix,
            enabled,
            inputs: ParamInputs {
                t60: t60_rx,
                brightness: brightness_rx,
                mix: mix_rx,
                enabled: enabled_rx,
            },
            rng,
            host_frame: Vec::new(),
            line_in: Vec::new(),
            line_out: Vec::new(),
            wet_frame: Vec::new(),
            wet_gains: Vec::new(),
            rejected_updates: 0,
            max_block_size: 0,
            prepared: false,
        };
        let controls = FdnControls {
            t60: t60_tx,
            brightness: brightness_tx,
            mix: mix_tx,
            enabled: enabled_tx,
        };
        Ok((processor, controls))
    }

    /// Change the host channel count. Coupling matrices are redrawn only if it differs.
    /// Requires a new `prepare` before processing.
    pub fn set_channels(&mut self, channels: usize) -> TvResult<()> {
        if channels == 0 {
            return Err(TvError::ChannelMismatch { expected: 1, got: 0 });
        }
        let order = self.engine.order().size();
        let changed = self.input_coupling.prepare_dimensions(order, channels, &mut self.rng)?;
        self.output_coupling.prepare_dimensions(channels, order, &mut self.rng)?;
        if changed {
            self.channels = channels;
            self.prepared = false;
        }
        Ok(())
    }

    #[inline]
    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn engine(&self) -> &ReverbEngine {
        &self.engine
    }

    /// Engine access for settings not carried by the control channels
    pub fn engine_mut(&mut self) -> &mut ReverbEngine {
        &mut self.engine
    }

    /// Current `(mix, enabled)` ramp values
    pub fn crossfade(&self) -> (f64, f64) {
        (self.mix.current(), self.enabled.current())
    }

    /// Control updates the engine refused since construction
    pub fn rejected_updates(&self) -> u64 {
        self.rejected_updates
    }

    // Runs on the audio thread: failures are counted, not logged.
    fn poll_params(&mut self) {
        if let Some(t60) = self.inputs.t60.poll() {
            if self.engine.set_t60(t60).is_err() {
                self.rejected_updates += 1;
            }
        }
        if let Some(brightness) = self.inputs.brightness.poll() {
            if self.engine.set_brightness(brightness).is_err() {
                self.rejected_updates += 1;
            }
        }
        if let Some(mix) = self.inputs.mix.poll() {
            self.mix.set_target(mix.clamp(0.0, 1.0) as f64, false);
        }
        if let Some(enabled) = self.inputs.enabled.poll() {
            self.enabled.set_target(if enabled >= 0.5 { 1.0 } else { 0.0 }, false);
        }
    }

    fn validate_block(&self, channels: &[&mut [Sample]]) -> TvResult<usize> {
        if !self.prepared {
            return Err(TvError::NotPrepared);
        }
        if channels.len() != self.channels {
            return Err(TvError::ChannelMismatch {
                expected: self.channels,
                got: channels.len(),
            });
        }
        let len = channels.first().map_or(0, |c| c.len());
        if let Some(bad) = channels.iter().find(|c| c.len() != len) {
            return Err(TvError::InvalidBlockSize(bad.len()));
        }
        if len > self.max_block_size {
            return Err(TvError::BlockTooLarge {
                max: self.max_block_size,
                got: len,
            });
        }
        Ok(len)
    }

    /// Process one block in place, one slice per host channel.
    ///
    /// A block containing NaN or infinity is zeroed and rejected without
    /// touching the network.
    pub fn process_block(&mut self, channels: &mut [&mut [Sample]]) -> TvResult<()> {
        let len = self.validate_block(channels)?;

        if channels.iter().any(|c| c.iter().any(|x| !x.is_finite())) {
            for channel in channels.iter_mut() {
                channel.fill(0.0);
            }
            return Err(TvError::NonFiniteInput);
        }

        self.poll_params();

        let wet_gains = &mut self.wet_gains[..len];
        self.mix.fill_buffer(wet_gains);
        self.enabled.apply_gain(wet_gains);

        for (n, &wet_gain) in wet_gains.iter().enumerate() {
            for (slot, channel) in self.host_frame.iter_mut().zip(channels.iter()) {
                *slot = channel[n];
            }

            self.input_coupling.process_frame(&mut self.line_in, &self.host_frame);
            self.engine.process_frame(&mut self.line_out, &self.line_in);
            self.output_coupling.process_frame(&mut self.wet_frame, &self.line_out);

            for ((channel, &dry), &wet) in channels.iter_mut().zip(&self.host_frame).zip(&self.wet_frame) {
                channel[n] = dry + wet_gain * (wet - dry);
            }
        }
        Ok(())
    }
}

impl Processor for FdnProcessor {
    fn reset(&mut self) {
        self.engine.clear();
        self.mix.reset(self.mix.target());
        self.enabled.reset(self.enabled.target());
    }
}

impl ProcessorConfig for FdnProcessor {
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> TvResult<()> {
        self.engine.prepare(sample_rate, max_block_size)?;
        self.mix.prepare(sample_rate);
        self.enabled.prepare(sample_rate);

        let order = self.engine.order().size();
        self.host_frame = vec![0.0; self.channels];
        self.wet_frame = vec![0.0; self.channels];
        self.line_in = vec![0.0; order];
        self.line_out = vec![0.0; order];
        self.wet_gains = vec![0.0; max_block_size];
        self.max_block_size = max_block_size;
        self.prepared = true;
        Ok(())
    }
}
