//! Impulse-response analysis
//!
//! Level envelopes and decay-time estimation for rendered reverb tails.

use tv_core::{Decibels, Sample};

/// Level reported for silent windows
pub const SILENCE_DB: f64 = -300.0;

/// Portion of the energy decay curve used for the T60 fit, dB below the total
pub const FIT_START_DB: f64 = -5.0;
pub const FIT_END_DB: f64 = -35.0;

fn to_db(power: f64) -> f64 {
    if power > 0.0 {
        // power → amplitude dB
        0.5 * Decibels::from_gain(power).0
    } else {
        SILENCE_DB
    }
}

/// RMS level per non-overlapping window of `window` samples, in dBFS.
///
/// A trailing partial window is measured over the samples it has.
pub fn rms_envelope_db(signal: &[Sample], window: usize) -> Vec<f64> {
    let window = window.max(1);
    signal
        .chunks(window)
        .map(|chunk| {
            let power = chunk.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>() / chunk.len() as f64;
            to_db(power)
        })
        .collect()
}

/// Schroeder backward-integrated energy, in dB relative to the total energy
pub fn energy_decay_curve_db(signal: &[Sample]) -> Vec<f64> {
    let mut remaining: Vec<f64> = Vec::with_capacity(signal.len());
    let mut acc = 0.0_f64;
    for &x in signal.iter().rev() {
        acc += (x as f64) * (x as f64);
        remaining.push(acc);
    }
    remaining.reverse();

    let total = acc;
    remaining
        .into_iter()
        .map(|e| if total > 0.0 { to_db(e / total) } else { SILENCE_DB })
        .collect()
}

/// Least-squares line through `(x, y)` points, returns `(slope, intercept)`
fn linear_fit(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for &(x, y) in points {
        sxx += (x - mean_x) * (x - mean_x);
        sxy += (x - mean_x) * (y - mean_y);
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

/// Estimate the 60 dB decay time of an impulse response in seconds.
///
/// Fits a line to the energy decay curve between [`FIT_START_DB`] and
/// [`FIT_END_DB`] and extrapolates it to -60 dB. Returns `None` for silent
/// signals or when the response does not decay far enough to fit.
pub fn estimate_t60(signal: &[Sample], sample_rate: f64) -> Option<f64> {
    let edc = energy_decay_curve_db(signal);
    if edc.last().is_none_or(|&last| last > FIT_END_DB) {
        return None;
    }

    let points: Vec<(f64, f64)> = edc
        .iter()
        .enumerate()
        .filter(|&(_, &level)| level <= FIT_START_DB && level >= FIT_END_DB)
        .map(|(n, &level)| (n as f64 / sample_rate, level))
        .collect();

    let (slope, _) = linear_fit(&points)?;
    if slope >= 0.0 {
        return None;
    }
    Some(-60.0 / slope)
}

/// Sum several channels into one signal (per-sample addition)
pub fn mix_down(channels: &[&[Sample]]) -> Vec<Sample> {
    let len = channels.iter().map(|c| c.len()).max().unwrap_or(0);
    let mut mono = vec![0.0; len];
    for channel in channels {
        for (acc, &x) in mono.iter_mut().zip(channel.iter()) {
            *acc += x;
        }
    }
    mono
}
