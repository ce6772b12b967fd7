//! Default timing-analysis routine.
//!
//! Spectral-flux onset envelope, autocorrelation tempo estimate and a simple
//! grid-following beat picker. Treated as a black box by
//! [`TimingExtractor`](crate::core::timing::TimingExtractor); any
//! [`BeatAnalyzer`] can replace it.

use crate::{
    core::timing::{BeatAnalyzer, RawAnalysis},
    error::Result,
};
use num_complex::Complex32;
use once_cell::sync::Lazy;
use rustfft::{num_traits::Zero, Fft, FftPlanner};
use std::sync::Arc;

pub const N_FFT: usize = 2048;
pub const HOP: usize = 512;

const MIN_BPM: f64 = 60.0;
const MAX_BPM: f64 = 200.0;
/// Centre of the log-normal tempo prior.
const PRIOR_BPM: f64 = 120.0;
const PEAK_RADIUS: usize = 3;

struct FftCache {
    fft_forward: Arc<dyn Fft<f32>>,
    hann_window: Vec<f32>,
}

static FFT_CACHE_2048: Lazy<FftCache> = Lazy::new(|| {
    let mut planner = FftPlanner::new();
    FftCache {
        fft_forward: planner.plan_fft_forward(N_FFT),
        hann_window: compute_hann(N_FFT),
    }
});

fn compute_hann(n_fft: usize) -> Vec<f32> {
    if n_fft <= 1 {
        return vec![1.0];
    }
    let denom = (n_fft - 1) as f32;
    (0..n_fft)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * (i as f32) / denom).cos())
        .collect()
}

/// Half-wave rectified spectral flux of log magnitudes, one value per hop.
/// Frames are centred (signal padded by `N_FFT / 2` on both sides).
pub fn onset_envelope(signal: &[f32]) -> Vec<f32> {
    if signal.is_empty() {
        return Vec::new();
    }

    let pad = N_FFT / 2;
    let t = signal.len();
    let mut padded = vec![0.0f32; pad + t + pad];
    padded[pad..pad + t].copy_from_slice(signal);

    let frames = 1 + t / HOP;
    let bins = N_FFT / 2 + 1;

    let cache = &*FFT_CACHE_2048;
    let fft = &cache.fft_forward;
    let window = &cache.hann_window;

    let mut buf = vec![Complex32::zero(); N_FFT];
    let mut prev = vec![0.0f32; bins];
    let mut cur = vec![0.0f32; bins];
    let mut env = Vec::with_capacity(frames);

    for fr in 0..frames {
        let start = fr * HOP;
        let chunk = &padded[start..start + N_FFT];
        for i in 0..N_FFT {
            buf[i] = Complex32::new(chunk[i] * window[i], 0.0);
        }
        fft.process(&mut buf);

        for (fi, c) in cur.iter_mut().enumerate() {
            *c = (1.0 + buf[fi].norm()).ln();
        }

        let flux = if fr == 0 {
            0.0
        } else {
            cur.iter()
                .zip(prev.iter())
                .map(|(c, p)| (c - p).max(0.0))
                .sum::<f32>()
        };
        env.push(flux);
        std::mem::swap(&mut prev, &mut cur);
    }

    env
}

/// Local maxima within `PEAK_RADIUS` frames that rise above mean + std/2.
pub fn pick_peaks(env: &[f32]) -> Vec<usize> {
    if env.is_empty() {
        return Vec::new();
    }
    let n = env.len() as f32;
    let mean = env.iter().sum::<f32>() / n;
    let var = env.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
    let threshold = mean + 0.5 * var.sqrt();

    let mut peaks = Vec::new();
    for i in 0..env.len() {
        if env[i] <= threshold {
            continue;
        }
        let lo = i.saturating_sub(PEAK_RADIUS);
        let hi = (i + PEAK_RADIUS + 1).min(env.len());
        // Ties go to the earliest frame.
        let is_max = (lo..hi).all(|j| env[j] < env[i] || (env[j] == env[i] && j >= i));
        if is_max {
            peaks.push(i);
        }
    }
    peaks
}

fn bpm_for_lag(lag: usize, sample_rate: u32) -> f64 {
    60.0 * sample_rate as f64 / (HOP as f64 * lag as f64)
}

/// Autocorrelation period (in frames) weighted by a tempo prior.
pub fn estimate_period(env: &[f32], sample_rate: u32) -> Option<usize> {
    let frames_per_sec = sample_rate as f64 / HOP as f64;
    let min_lag = ((60.0 / MAX_BPM) * frames_per_sec).floor().max(1.0) as usize;
    let max_lag = ((60.0 / MIN_BPM) * frames_per_sec).ceil() as usize;
    if env.len() <= max_lag + 1 {
        return None;
    }

    let mean = env.iter().sum::<f32>() / env.len() as f32;
    let centred: Vec<f32> = env.iter().map(|v| v - mean).collect();

    let mut best: Option<(usize, f64)> = None;
    for lag in min_lag..=max_lag {
        let ac: f64 = centred[lag..]
            .iter()
            .zip(centred.iter())
            .map(|(a, b)| (*a as f64) * (*b as f64))
            .sum();
        if ac <= 0.0 {
            continue;
        }
        let octaves = (bpm_for_lag(lag, sample_rate) / PRIOR_BPM).log2();
        let score = ac * (-0.5 * octaves * octaves).exp();
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((lag, score));
        }
    }
    best.map(|(lag, _)| lag)
}

/// Follow the tempo grid from the strongest early onset, snapping each beat
/// to the envelope maximum within a quarter period of its expected frame.
pub fn track_beats(env: &[f32], period: usize) -> Vec<usize> {
    if env.is_empty() || period == 0 {
        return Vec::new();
    }
    let slack = (period / 4).max(1);
    let argmax = |lo: usize, hi: usize| -> usize {
        (lo..hi.min(env.len()))
            .fold(lo, |best, i| if env[i] > env[best] { i } else { best })
    };

    let mut beats = vec![argmax(0, period)];
    loop {
        let last = beats[beats.len() - 1];
        let expected = last + period;
        if expected >= env.len() {
            break;
        }
        let lo = expected.saturating_sub(slack).max(last + 1);
        let hi = expected + slack + 1;
        beats.push(argmax(lo, hi));
    }
    beats
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SpectralFluxAnalyzer;

impl BeatAnalyzer for SpectralFluxAnalyzer {
    fn analyze(&self, signal: &[f32], sample_rate: u32) -> Result<RawAnalysis> {
        let env = onset_envelope(signal);
        let onsets = pick_peaks(&env)
            .into_iter()
            .map(|f| f as f64 * HOP as f64 / sample_rate as f64)
            .collect();

        let (tempo, beat_frames) = match estimate_period(&env, sample_rate) {
            Some(period) => (bpm_for_lag(period, sample_rate), track_beats(&env, period)),
            None => (0.0, Vec::new()),
        };

        Ok(RawAnalysis {
            tempo: vec![tempo],
            beat_frames,
            hop_length: HOP,
            onsets,
        })
    }
}
