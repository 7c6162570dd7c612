//! tv-dsp: time-varying feedback delay network reverberator
//!
//! Real-time safe: nothing allocates or locks after `prepare`.
//!
//! ## Modules
//! - `smoothing` - Linear parameter ramps
//! - `delay` - Fractional, modulatable delay lines and delay banks
//! - `absorption` - One-pole DC/Nyquist absorption filters
//! - `matrix` - Orthogonal feedback and coupling matrices
//! - `modulation` - Delay-time LFOs
//! - `fdn` - The recirculating network
//! - `processor` - Host-channel block processor with mix, bypass and control channels
//! - `config` - Serializable configuration and presets
//! - `analysis` - RMS envelopes and T60 estimation

pub mod absorption;
pub mod analysis;
pub mod config;
pub mod delay;
pub mod fdn;
pub mod matrix;
pub mod modulation;
pub mod processor;
pub mod smoothing;

pub use config::FdnConfig;
pub use fdn::{FdnOrder, ReverbEngine};
pub use processor::{FdnControls, FdnParam, FdnProcessor};

use tv_core::{Sample, TvResult};

/// Trait for all DSP processors
pub trait Processor: Send + Sync {
    /// Reset processor state
    fn reset(&mut self);

    /// Get latency in samples
    fn latency(&self) -> usize {
        0
    }
}

/// Mono processor trait
pub trait MonoProcessor: Processor {
    /// Process a single sample
    fn process_sample(&mut self, input: Sample) -> Sample;

    /// Process a block of samples
    fn process_block(&mut self, buffer: &mut [Sample]) {
        for sample in buffer.iter_mut() {
            *sample = self.process_sample(*sample);
        }
    }
}

/// One sample per channel at a time, channel count fixed at construction
pub trait FrameProcessor: Processor {
    fn channels(&self) -> usize;

    /// `output` and `input` both hold `channels()` samples
    fn process_frame(&mut self, output: &mut [Sample], input: &[Sample]);
}

/// Sample-rate and block-size preparation. May allocate.
pub trait ProcessorConfig {
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> TvResult<()>;
}
