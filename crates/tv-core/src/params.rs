//! Parameter ranges and the control-thread → render-thread scalar handoff

use portable_atomic::AtomicF32;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Bounds, default and knob curve of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
    pub skew: ParamSkew,
}

impl ParamRange {
    pub const fn linear(min: f32, max: f32, default: f32) -> Self {
        Self {
            min,
            max,
            default,
            skew: ParamSkew::Linear,
        }
    }

    pub const fn exponential(min: f32, max: f32, default: f32, exponent: f32) -> Self {
        Self {
            min,
            max,
            default,
            skew: ParamSkew::Exponential(exponent),
        }
    }

    #[inline]
    pub fn contains(&self, value: f32) -> bool {
        value.is_finite() && value >= self.min && value <= self.max
    }

    /// Denormalize a 0-1 value to actual value
    pub fn denormalize(&self, normalized: f32) -> f32 {
        let normalized = normalized.clamp(0.0, 1.0);
        match self.skew {
            ParamSkew::Linear => self.min + normalized * (self.max - self.min),
            ParamSkew::Exponential(exp) => self.min + normalized.powf(exp) * (self.max - self.min),
        }
    }

    /// Normalize an actual value to 0-1
    pub fn normalize(&self, value: f32) -> f32 {
        let clamped = value.clamp(self.min, self.max);
        let linear = (clamped - self.min) / (self.max - self.min);
        match self.skew {
            ParamSkew::Linear => linear,
            ParamSkew::Exponential(exp) => linear.powf(1.0 / exp),
        }
    }
}

/// Parameter skew type
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParamSkew {
    Linear,
    /// `value = min + n^exp * (max - min)`; exp 2 gives finer control near `min`
    Exponential(f32),
}

// ============ Scalar channel ============

#[derive(Debug)]
struct ParamSlot {
    value: AtomicF32,
    generation: AtomicU32,
}

/// Create a single-writer, single-reader scalar channel.
///
/// The sender lives on the control thread, the receiver on the render thread.
/// Neither end is `Clone`, so each parameter has exactly one writer and one
/// reader. Intermediate values may be skipped; the reader always observes the
/// most recent one.
pub fn param_channel(initial: f32) -> (ParamSender, ParamReceiver) {
    let slot = Arc::new(ParamSlot {
        value: AtomicF32::new(initial),
        generation: AtomicU32::new(0),
    });
    (
        ParamSender { slot: slot.clone() },
        ParamReceiver {
            slot,
            seen_generation: 0,
        },
    )
}

/// Writing end of a [`param_channel`]
#[derive(Debug)]
pub struct ParamSender {
    slot: Arc<ParamSlot>,
}

impl ParamSender {
    /// Publish a new value
    #[inline]
    pub fn send(&mut self, value: f32) {
        self.slot.value.store(value, Ordering::Relaxed);
        self.slot.generation.fetch_add(1, Ordering::Release);
    }

    /// Last published value
    #[inline]
    pub fn value(&self) -> f32 {
        self.slot.value.load(Ordering::Relaxed)
    }
}

/// Reading end of a [`param_channel`]
#[derive(Debug)]
pub struct ParamReceiver {
    slot: Arc<ParamSlot>,
    seen_generation: u32,
}

impl ParamReceiver {
    /// Returns the latest value if it was published since the previous poll
    #[inline]
    pub fn poll(&mut self) -> Option<f32> {
        let generation = self.slot.generation.load(Ordering::Acquire);
        if generation == self.seen_generation {
            return None;
        }
        self.seen_generation = generation;
        Some(self.slot.value.load(Ordering::Relaxed))
    }

    /// Latest value, regardless of whether it was already polled
    #[inline]
    pub fn value(&self) -> f32 {
        self.slot.value.load(Ordering::Relaxed)
    }
}
