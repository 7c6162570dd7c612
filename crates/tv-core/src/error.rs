//! Error types for tvfdn

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TvError {
    #[error("Invalid FDN order: {0} (expected one of 2, 4, 8, 16, 32, 64)")]
    InvalidOrder(u32),

    #[error("Invalid T60: {0} s (must be finite and greater than zero)")]
    InvalidT60(f32),

    #[error("Invalid brightness: {0} (must be in [0, 1])")]
    InvalidBrightness(f32),

    #[error("Invalid magnitude: {0} (must be in [0, 1])")]
    InvalidMagnitude(f32),

    #[error("Maximum delay must be greater than zero")]
    ZeroMaxDelay,

    #[error("Delay of {requested} samples outside (0, {max}]")]
    DelayOutOfRange { requested: f32, max: usize },

    #[error("Channel mismatch: expected {expected}, got {got}")]
    ChannelMismatch { expected: usize, got: usize },

    #[error("Block of {got} samples exceeds prepared block size {max}")]
    BlockTooLarge { max: usize, got: usize },

    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(f64),

    #[error("Invalid block size: {0}")]
    InvalidBlockSize(usize),

    #[error("Processor used before prepare()")]
    NotPrepared,

    #[error("Non-finite sample in input block")]
    NonFiniteInput,

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type TvResult<T> = Result<T, TvError>;
