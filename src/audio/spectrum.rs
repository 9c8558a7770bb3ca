use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use super::decode::AudioData;

/// Floor for reported levels; keeps silence finite.
pub const MIN_DB: f32 = -200.0;

/// Temporal smoothing between successive analyses (analyser-node default).
pub const DEFAULT_SMOOTHING: f32 = 0.8;

/// A read-only dB spectrum valid for the current frame.
#[derive(Clone, Copy, Debug)]
pub struct Spectrum<'a> {
    pub db: &'a [f32],
    pub sample_rate: f32,
}

impl<'a> Spectrum<'a> {
    pub fn new(db: &'a [f32], sample_rate: f32) -> Self {
        Self { db, sample_rate }
    }

    pub fn bins(&self) -> usize {
        self.db.len()
    }

    /// Width of one bin in Hz (`sampleRate / (2 * bins)`).
    pub fn bin_hz(&self) -> f32 {
        if self.db.is_empty() {
            return 0.0;
        }
        self.sample_rate / (2 * self.db.len()) as f32
    }
}

/// Anything that can hand out the current spectrum for a playback position.
pub trait SpectrumSource {
    fn sample_rate(&self) -> f32;
    fn spectrum_at(&mut self, position: f64) -> Spectrum<'_>;
}

/// Behaves like a browser analyser node: Blackman-windowed FFT over the most
/// recent `fft_size` samples, magnitudes scaled by `1/N`, blended over time
/// and reported in dB.
pub struct FftAnalyzer {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    db: Vec<f32>,
    smoothing: f32,
}

impl FftAnalyzer {
    pub fn new(fft_size: usize) -> Self {
        Self::with_smoothing(fft_size, DEFAULT_SMOOTHING)
    }

    pub fn with_smoothing(fft_size: usize, smoothing: f32) -> Self {
        let fft_size = fft_size.max(2);
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch_len = fft.get_inplace_scratch_len();
        let bins = fft_size / 2;

        Self {
            fft,
            window: blackman_window(fft_size),
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch: vec![Complex::new(0.0, 0.0); scratch_len],
            magnitudes: vec![0.0; bins],
            db: vec![MIN_DB; bins],
            smoothing: smoothing.clamp(0.0, 0.999),
        }
    }

    pub fn fft_size(&self) -> usize {
        self.buffer.len()
    }

    pub fn bins(&self) -> usize {
        self.db.len()
    }

    /// Analyze the `fft_size` samples ending at `end` and return the updated
    /// dB spectrum. Positions before the start or past the end of the signal
    /// read as silence.
    pub fn analyze(&mut self, samples: &[f32], end: usize) -> &[f32] {
        let n = self.buffer.len();
        let start = end.saturating_sub(n);
        let pad = n - (end - start);

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = if i < pad {
                0.0
            } else {
                samples.get(start + i - pad).copied().unwrap_or(0.0)
            };
            *slot = Complex::new(s * self.window[i], 0.0);
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        let scale = 1.0 / n as f32;
        let tau = self.smoothing;
        for ((mag, db), c) in self
            .magnitudes
            .iter_mut()
            .zip(self.db.iter_mut())
            .zip(self.buffer.iter())
        {
            *mag = tau * *mag + (1.0 - tau) * c.norm() * scale;
            *db = if *mag > 0.0 {
                (20.0 * mag.log10()).max(MIN_DB)
            } else {
                MIN_DB
            };
        }

        &self.db
    }

    /// Forget the smoothing history (track change).
    pub fn reset(&mut self) {
        self.magnitudes.fill(0.0);
        self.db.fill(MIN_DB);
    }
}

/// A decoded track or stem paired with its own analyzer.
pub struct DecodedSource {
    audio: AudioData,
    analyzer: FftAnalyzer,
}

impl DecodedSource {
    pub fn new(audio: AudioData, fft_size: usize) -> Self {
        Self {
            audio,
            analyzer: FftAnalyzer::new(fft_size),
        }
    }

    pub fn audio(&self) -> &AudioData {
        &self.audio
    }

    pub fn reset(&mut self) {
        self.analyzer.reset();
    }
}

impl SpectrumSource for DecodedSource {
    fn sample_rate(&self) -> f32 {
        self.audio.sample_rate as f32
    }

    fn spectrum_at(&mut self, position: f64) -> Spectrum<'_> {
        let end = (position.max(0.0) * self.audio.sample_rate as f64) as usize;
        let sample_rate = self.audio.sample_rate as f32;
        let db = self.analyzer.analyze(&self.audio.samples, end);
        Spectrum::new(db, sample_rate)
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let n = size as f32;
    (0..size)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / n;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}
