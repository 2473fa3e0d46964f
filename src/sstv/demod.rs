// file: src/sstv/demod.rs
// description: quadrature FM demodulation into an instantaneous frequency track
// reference: complex baseband mixing, windowed-sinc low-pass, phase differencing

use crate::sstv::FREQ_VIS_START;
use std::f64::consts::{PI, TAU};

/// Baseband low-pass cutoff. Only the phase of the filtered signal is used,
/// so the cutoff only has to sit below the mixing image near 2x center.
const LOWPASS_CUTOFF_HZ: f64 = 900.0;
const LOWPASS_SPAN_SECS: f64 = 0.0013;
/// Below this baseband power the frequency estimate is meaningless.
const MIN_POWER: f32 = 1e-8;

/// Instantaneous frequency in Hz for every sample; silent samples read 0.
pub fn frequency_track(samples: &[f32], sample_rate: u32) -> Vec<f32> {
    if samples.len() < 2 || sample_rate == 0 {
        return vec![0.0; samples.len()];
    }

    let sr = sample_rate as f64;
    let center = FREQ_VIS_START as f64;
    let step = TAU * center / sr;

    let mut in_phase = Vec::with_capacity(samples.len());
    let mut quadrature = Vec::with_capacity(samples.len());
    let mut phase = 0.0f64;
    for &x in samples {
        in_phase.push(x * phase.cos() as f32);
        quadrature.push(-x * phase.sin() as f32);
        phase = (phase + step) % TAU;
    }

    let taps = lowpass_taps(sr);
    let in_phase = convolve_centered(&in_phase, &taps);
    let quadrature = convolve_centered(&quadrature, &taps);

    let scale = (sr / TAU) as f32;
    let mut track = Vec::with_capacity(samples.len());
    track.push(0.0);
    for n in 1..samples.len() {
        let (i0, q0) = (in_phase[n - 1], quadrature[n - 1]);
        let (i1, q1) = (in_phase[n], quadrature[n]);
        let power = i1 * i1 + q1 * q1;
        if power < MIN_POWER || i0 * i0 + q0 * q0 < MIN_POWER {
            track.push(0.0);
            continue;
        }
        let delta = (q1 * i0 - i1 * q0).atan2(i1 * i0 + q1 * q0);
        track.push(center as f32 + delta * scale);
    }
    track[0] = track[1];
    track
}

/// Centered moving average over `window` samples.
pub fn smooth(track: &[f32], window: usize) -> Vec<f32> {
    if window <= 1 || track.is_empty() {
        return track.to_vec();
    }
    let prefix = prefix_sums(track);
    let half = window / 2;
    (0..track.len())
        .map(|n| {
            let start = n.saturating_sub(half);
            let end = (n + half + 1).min(track.len());
            ((prefix[end] - prefix[start]) / (end - start) as f64) as f32
        })
        .collect()
}

pub fn prefix_sums(track: &[f32]) -> Vec<f64> {
    let mut prefix = Vec::with_capacity(track.len() + 1);
    prefix.push(0.0);
    let mut acc = 0.0f64;
    for &v in track {
        acc += v as f64;
        prefix.push(acc);
    }
    prefix
}

fn lowpass_taps(sample_rate: f64) -> Vec<f32> {
    let mut len = ((sample_rate * LOWPASS_SPAN_SECS).round() as usize).max(5);
    if len % 2 == 0 {
        len += 1;
    }
    let mid = (len / 2) as f64;
    let fc = LOWPASS_CUTOFF_HZ / sample_rate;

    let mut taps: Vec<f64> = (0..len)
        .map(|k| {
            let t = k as f64 - mid;
            let sinc = if t == 0.0 {
                2.0 * fc
            } else {
                (TAU * fc * t).sin() / (PI * t)
            };
            let window = 0.5 - 0.5 * (TAU * k as f64 / (len - 1) as f64).cos();
            sinc * window
        })
        .collect();

    let sum: f64 = taps.iter().sum();
    if sum.abs() > f64::EPSILON {
        for tap in &mut taps {
            *tap /= sum;
        }
    }
    taps.into_iter().map(|t| t as f32).collect()
}

fn convolve_centered(signal: &[f32], taps: &[f32]) -> Vec<f32> {
    let half = taps.len() / 2;
    let n = signal.len();
    (0..n)
        .map(|i| {
            let mut acc = 0.0f32;
            for (k, &tap) in taps.iter().enumerate() {
                let j = i + k;
                if j < half || j - half >= n {
                    continue;
                }
                acc += tap * signal[j - half];
            }
            acc
        })
        .collect()
}
