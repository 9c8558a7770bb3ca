use rayon::prelude::*;

use super::TempoEstimate;

/// Only the opening of a track is analyzed.
pub const MAX_ANALYSIS_SECS: f64 = 30.0;
const WINDOW_SECS: f64 = 0.02;
const MIN_BPM: f64 = 60.0;
const MAX_BPM: f64 = 200.0;
/// An onset this many times the mean strength anchors the beat phase.
const ANCHOR_RATIO: f32 = 2.0;

/// Estimate tempo and first-beat offset from mono samples.
/// Returns `None` for silent or too-short input. Only 60..200 BPM is searched,
/// so faster or slower tempos come back as a multiple inside that range.
pub fn estimate_tempo(samples: &[f32], sample_rate: u32) -> Option<TempoEstimate> {
    if sample_rate == 0 {
        return None;
    }
    let sr = sample_rate as f64;
    let samples = &samples[..samples.len().min((MAX_ANALYSIS_SECS * sr) as usize)];

    let window = ((WINDOW_SECS * sr).round() as usize).max(2);
    let hop = window / 2;
    if samples.len() < window {
        return None;
    }

    let onsets = onset_strength(samples, window, hop);
    let frame_rate = sr / hop as f64;

    let min_lag = ((frame_rate * 60.0 / MAX_BPM).floor() as usize).max(1);
    let max_lag = ((frame_rate * 60.0 / MIN_BPM).ceil() as usize).min(onsets.len().saturating_sub(1));
    if min_lag > max_lag {
        log::debug!("Too little audio for tempo estimation ({} frames)", onsets.len());
        return None;
    }

    let (best_lag, best_corr) = (min_lag..=max_lag)
        .into_par_iter()
        .map(|lag| (lag, autocorrelation(&onsets, lag)))
        .reduce(|| (usize::MAX, f32::NEG_INFINITY), stronger_lag);

    if best_corr <= 0.0 || best_lag == usize::MAX {
        return None;
    }

    let bpm = (frame_rate * 60.0 / best_lag as f64).round() as f32;
    let beat_offset = first_strong_onset(&onsets)
        .map(|i| (i * hop + window / 2) as f64 / sr)
        .unwrap_or(0.0);

    log::info!(
        "Offline tempo: {:.0} BPM (lag {} frames), first beat at {:.3}s",
        bpm,
        best_lag,
        beat_offset
    );

    Some(TempoEstimate { bpm, beat_offset })
}

/// Positive frame-to-frame energy increase; silence before the first frame
/// counts as zero energy.
fn onset_strength(samples: &[f32], window: usize, hop: usize) -> Vec<f32> {
    let frames = (samples.len() - window) / hop + 1;
    let mut prev = 0.0f32;
    (0..frames)
        .map(|i| {
            let start = i * hop;
            let energy: f32 = samples[start..start + window].iter().map(|s| s * s).sum();
            let rise = (energy - prev).max(0.0);
            prev = energy;
            rise
        })
        .collect()
}

fn autocorrelation(signal: &[f32], lag: usize) -> f32 {
    signal
        .iter()
        .zip(signal[lag..].iter())
        .map(|(a, b)| a * b)
        .sum()
}

/// Higher correlation wins; ties go to the shorter lag (faster tempo).
fn stronger_lag(a: (usize, f32), b: (usize, f32)) -> (usize, f32) {
    if b.1 > a.1 || (b.1 == a.1 && b.0 < a.0) {
        b
    } else {
        a
    }
}

fn first_strong_onset(onsets: &[f32]) -> Option<usize> {
    let mean = onsets.iter().sum::<f32>() / onsets.len() as f32;
    if mean <= 0.0 {
        return None;
    }
    onsets.iter().position(|&o| o > ANCHOR_RATIO * mean)
}
