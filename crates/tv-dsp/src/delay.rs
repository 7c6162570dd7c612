//! Delay processors
//!
//! Includes:
//! - Fractional delay line (smoothed length, per-sample modulation, linear interpolation)
//! - Delay bank (one line per FDN channel)

use log::debug;
use tv_core::{Sample, TvError, TvResult};

use crate::smoothing::SmoothedValue;
use crate::{FrameProcessor, MonoProcessor, Processor, ProcessorConfig};

/// Default ramp for delay-length changes (25 ms at 48 kHz)
pub const DEFAULT_DELAY_SMOOTHING_SAMPLES: u32 = 1200;

/// Circular buffer read at a smoothed, optionally modulated, fractional offset
#[derive(Debug, Clone)]
pub struct FractionalDelayLine {
    buffer: Vec<Sample>,
    write_pos: usize,
    max_delay_samples: usize,
    delay: SmoothedValue,
}

impl FractionalDelayLine {
    /// Create a line holding up to `max_delay_samples`, starting at `initial_delay_samples`
    pub fn new(max_delay_samples: usize, initial_delay_samples: f32) -> TvResult<Self> {
        if max_delay_samples == 0 {
            return Err(TvError::ZeroMaxDelay);
        }
        Self::check_delay(initial_delay_samples, max_delay_samples)?;

        let mut delay = SmoothedValue::new(0.0, DEFAULT_DELAY_SMOOTHING_SAMPLES);
        delay.reset(initial_delay_samples as f64);

        Ok(Self {
            // One extra slot so the full requested maximum is reachable
            buffer: vec![0.0; max_delay_samples + 1],
            write_pos: 0,
            max_delay_samples,
            delay,
        })
    }

    fn check_delay(delay_samples: f32, max_delay_samples: usize) -> TvResult<()> {
        if !(delay_samples > 0.0 && delay_samples <= max_delay_samples as f32) {
            return Err(TvError::DelayOutOfRange {
                requested: delay_samples,
                max: max_delay_samples,
            });
        }
        Ok(())
    }

    /// Ramp toward a new delay length
    pub fn set_delay(&mut self, delay_samples: f32) -> TvResult<()> {
        Self::check_delay(delay_samples, self.max_delay_samples)?;
        self.delay.set_target(delay_samples as f64, false);
        Ok(())
    }

    /// Jump to a new delay length without ramping
    pub fn set_delay_immediate(&mut self, delay_samples: f32) -> TvResult<()> {
        Self::check_delay(delay_samples, self.max_delay_samples)?;
        self.delay.reset(delay_samples as f64);
        Ok(())
    }

    pub fn set_smoothing_samples(&mut self, samples: u32) {
        self.delay.set_smoothing_samples(samples);
    }

    /// Current (smoothed) delay in samples
    #[inline]
    pub fn delay(&self) -> f64 {
        self.delay.current()
    }

    /// Delay the line is ramping toward
    #[inline]
    pub fn target_delay(&self) -> f64 {
        self.delay.target()
    }

    #[inline]
    pub fn max_delay(&self) -> usize {
        self.max_delay_samples
    }

    /// Process one sample with an additional per-sample delay offset.
    ///
    /// `modulation` bypasses the smoother; it is meant for fast LFO motion.
    #[inline]
    pub fn process_modulated(&mut self, input: Sample, modulation: f32) -> Sample {
        let buf_len = self.buffer.len();
        let write_pos = self.write_pos;

        let delay = (self.delay.advance() + modulation as f64).clamp(0.0, self.max_delay_samples as f64);
        let delay_ceil = delay.ceil();
        let frac1 = (delay_ceil - delay) as Sample;
        let frac0 = 1.0 - frac1;

        let pos0 = (write_pos + buf_len - delay_ceil as usize) % buf_len;
        let pos1 = (pos0 + 1) % buf_len;

        self.buffer[write_pos] = input;
        let output = self.buffer[pos0] * frac0 + self.buffer[pos1] * frac1;

        self.write_pos = (write_pos + 1) % buf_len;
        output
    }
}

impl Processor for FractionalDelayLine {
    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

impl MonoProcessor for FractionalDelayLine {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        self.process_modulated(input, 0.0)
    }
}

impl ProcessorConfig for FractionalDelayLine {
    fn prepare(&mut self, sample_rate: f64, _max_block_size: usize) -> TvResult<()> {
        if !(sample_rate > 0.0 && sample_rate.is_finite()) {
            return Err(TvError::InvalidSampleRate(sample_rate));
        }
        self.delay.prepare(sample_rate);
        Ok(())
    }
}

// ============ Delay Bank ============

/// One fractional delay line per channel, driven uniformly
#[derive(Debug, Clone)]
pub struct DelayBank {
    lines: Vec<FractionalDelayLine>,
}

impl DelayBank {
    pub fn new(max_delays: &[usize], delays: &[f32]) -> TvResult<Self> {
        if max_delays.len() != delays.len() {
            return Err(TvError::ChannelMismatch {
                expected: max_delays.len(),
                got: delays.len(),
            });
        }
        if delays.is_empty() {
            return Err(TvError::InvalidParam("delay bank needs at least one line".into()));
        }

        let lines = max_delays
            .iter()
            .zip(delays)
            .map(|(&max, &delay)| FractionalDelayLine::new(max, delay))
            .collect::<TvResult<Vec<_>>>()?;

        debug!("delay bank: {} lines, max buffer {} samples", lines.len(), max_delays.iter().max().copied().unwrap_or(0));
        Ok(Self { lines })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn line(&self, index: usize) -> &FractionalDelayLine {
        &self.lines[index]
    }

    /// Ramp every line toward a new length. Validates all lengths before applying any.
    pub fn set_delays(&mut self, delays: &[f32]) -> TvResult<()> {
        if delays.len() != self.lines.len() {
            return Err(TvError::ChannelMismatch {
                expected: self.lines.len(),
                got: delays.len(),
            });
        }
        for (line, &delay) in self.lines.iter().zip(delays) {
            FractionalDelayLine::check_delay(delay, line.max_delay())?;
        }
        for (line, &delay) in self.lines.iter_mut().zip(delays) {
            line.set_delay(delay)?;
        }
        Ok(())
    }

    pub fn set_smoothing_samples(&mut self, samples: u32) {
        for line in &mut self.lines {
            line.set_smoothing_samples(samples);
        }
    }

    /// Process one frame with per-line modulation offsets
    #[inline]
    pub fn process_frame_modulated(&mut self, output: &mut [Sample], input: &[Sample], modulation: &[f32]) {
        debug_assert_eq!(output.len(), self.lines.len());
        debug_assert_eq!(input.len(), self.lines.len());
        debug_assert_eq!(modulation.len(), self.lines.len());
        for (((line, out), &inp), &m) in self.lines.iter_mut().zip(output.iter_mut()).zip(input).zip(modulation) {
            *out = line.process_modulated(inp, m);
        }
    }
}

impl Processor for DelayBank {
    fn reset(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
    }
}

impl FrameProcessor for DelayBank {
    #[inline]
    fn channels(&self) -> usize {
        self.lines.len()
    }

    #[inline]
    fn process_frame(&mut self, output: &mut [Sample], input: &[Sample]) {
        debug_assert_eq!(output.len(), self.lines.len());
        debug_assert_eq!(input.len(), self.lines.len());
        for ((line, out), &inp) in self.lines.iter_mut().zip(output.iter_mut()).zip(input) {
            *out = line.process_sample(inp);
        }
    }
}

impl ProcessorConfig for DelayBank {
    fn prepare(&mut self, sample_rate: f64, max_block_size: usize) -> TvResult<()> {
        for line in &mut self.lines {
            line.prepare(sample_rate, max_block_size)?;
        }
        Ok(())
    }
}
