//! Serializable reverberator configuration and presets

use serde::{Deserialize, Serialize};
use tv_core::{ParamRange, TvError, TvResult};

use crate::absorption::DEFAULT_COEFF_SMOOTHING_SAMPLES;
use crate::delay::DEFAULT_DELAY_SMOOTHING_SAMPLES;
use crate::fdn::{FdnOrder, validate_brightness};
use crate::modulation::validate_modulation;

/// Decay time at DC, seconds. Knob midpoint sits near the short end.
pub const T60_RANGE: ParamRange = ParamRange::exponential(0.1, 10.0, 4.0, 2.0);

/// Ratio of Nyquist decay time to DC decay time
pub const BRIGHTNESS_RANGE: ParamRange = ParamRange::linear(0.0, 1.0, 0.5);

/// Dry/wet balance (0 = dry only)
pub const MIX_RANGE: ParamRange = ParamRange::linear(0.0, 1.0, 0.5);

/// Default ramp for the mix and enable crossfades
pub const DEFAULT_MIX_SMOOTHING_SAMPLES: u32 = 480;

/// Complete description of a reverberator instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FdnConfig {
    /// Number of delay lines (2, 4, 8, 16, 32 or 64)
    pub order: u32,
    /// Decay time at DC in seconds
    pub t60: f32,
    pub brightness: f32,
    /// Dry/wet crossfade: each channel outputs `dry + enabled·mix·(wet − dry)`.
    /// 0 passes the input untouched, 1 is wet only with no dry path.
    pub mix: f32,
    /// Seed for delay lengths and matrices
    pub seed: u64,
    pub delay_smoothing_samples: u32,
    pub coefficient_smoothing_samples: u32,
    pub mix_smoothing_samples: u32,
    /// LFO depth in samples, 0 disables modulation
    pub modulation_depth: f32,
    pub modulation_rate: f32,
}

impl Default for FdnConfig {
    fn default() -> Self {
        Self {
            order: 16,
            t60: T60_RANGE.default,
            brightness: BRIGHTNESS_RANGE.default,
            mix: MIX_RANGE.default,
            seed: 0,
            delay_smoothing_samples: DEFAULT_DELAY_SMOOTHING_SAMPLES,
            coefficient_smoothing_samples: DEFAULT_COEFF_SMOOTHING_SAMPLES,
            mix_smoothing_samples: DEFAULT_MIX_SMOOTHING_SAMPLES,
            modulation_depth: 0.0,
            modulation_rate: 0.0,
        }
    }
}

impl FdnConfig {
    /// Short, bright, mostly dry
    pub fn small_room() -> Self {
        Self {
            order: 8,
            t60: 0.6,
            brightness: 0.7,
            mix: 0.25,
            ..Self::default()
        }
    }

    /// Long, darker tail with slow modulation
    pub fn hall() -> Self {
        Self {
            order: 32,
            t60: 3.2,
            brightness: 0.4,
            mix: 0.35,
            modulation_depth: 8.0,
            modulation_rate: 0.5,
            ..Self::default()
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::default()),
            "small_room" | "small-room" => Some(Self::small_room()),
            "hall" => Some(Self::hall()),
            _ => None,
        }
    }

    pub fn validate(&self) -> TvResult<()> {
        FdnOrder::try_from(self.order)?;
        if !T60_RANGE.contains(self.t60) {
            return Err(TvError::InvalidT60(self.t60));
        }
        validate_brightness(self.brightness)?;
        if !MIX_RANGE.contains(self.mix) {
            return Err(TvError::InvalidParam(format!("mix {} outside [0, 1]", self.mix)));
        }
        validate_modulation(self.modulation_depth, self.modulation_rate)?;
        Ok(())
    }

    /// Parse and validate
    pub fn from_json(json: &str) -> TvResult<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| TvError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> TvResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| TvError::Config(e.to_string()))
    }
}
