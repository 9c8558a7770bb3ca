use crate::audio::spectrum::Spectrum;

/// Static description of one frequency band.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub name: &'static str,
    pub low_hz: f32,
    pub high_hz: f32,
    /// Fixed gain bringing the band's typical level into 0..1.
    pub scale: f32,
    /// Envelope attack rate per 60 fps frame.
    pub attack: f32,
    /// Envelope release rate per 60 fps frame.
    pub release: f32,
    pub sensitivity: f32,
}

pub const BAND_COUNT: usize = 7;

pub const BANDS: [Band; BAND_COUNT] = [
    Band { name: "sub", low_hz: 20.0, high_hz: 60.0, scale: 1.2, attack: 0.50, release: 0.08, sensitivity: 1.0 },
    Band { name: "bass", low_hz: 60.0, high_hz: 250.0, scale: 1.0, attack: 0.55, release: 0.10, sensitivity: 1.0 },
    Band { name: "low_mid", low_hz: 250.0, high_hz: 500.0, scale: 1.2, attack: 0.60, release: 0.12, sensitivity: 1.0 },
    Band { name: "mid", low_hz: 500.0, high_hz: 2000.0, scale: 1.5, attack: 0.65, release: 0.14, sensitivity: 1.0 },
    Band { name: "upper_mid", low_hz: 2000.0, high_hz: 4000.0, scale: 2.0, attack: 0.70, release: 0.16, sensitivity: 1.0 },
    Band { name: "presence", low_hz: 4000.0, high_hz: 6000.0, scale: 2.5, attack: 0.75, release: 0.18, sensitivity: 1.0 },
    Band { name: "brilliance", low_hz: 6000.0, high_hz: 20000.0, scale: 3.0, attack: 0.80, release: 0.20, sensitivity: 1.2 },
];

/// One octave bucket of the ring/tunnel layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Octave {
    pub low_hz: f32,
    pub high_hz: f32,
    pub scale: f32,
}

pub const OCTAVE_COUNT: usize = 10;

/// 27.5 Hz doublings; low and high octaves hold few bins or little energy
/// and get the larger scale.
pub const OCTAVES: [Octave; OCTAVE_COUNT] = [
    Octave { low_hz: 27.5, high_hz: 55.0, scale: 6.0 },
    Octave { low_hz: 55.0, high_hz: 110.0, scale: 5.0 },
    Octave { low_hz: 110.0, high_hz: 220.0, scale: 4.0 },
    Octave { low_hz: 220.0, high_hz: 440.0, scale: 3.5 },
    Octave { low_hz: 440.0, high_hz: 880.0, scale: 3.0 },
    Octave { low_hz: 880.0, high_hz: 1760.0, scale: 3.0 },
    Octave { low_hz: 1760.0, high_hz: 3520.0, scale: 3.5 },
    Octave { low_hz: 3520.0, high_hz: 7040.0, scale: 4.0 },
    Octave { low_hz: 7040.0, high_hz: 14080.0, scale: 5.0 },
    Octave { low_hz: 14080.0, high_hz: 20000.0, scale: 6.0 },
];

/// Weight of the bin average against the bin peak in a slot.
const AVG_WEIGHT: f32 = 0.3;
const PEAK_WEIGHT: f32 = 0.7;

/// Below this total linear energy the centroid is undefined.
pub const CENTROID_ENERGY_FLOOR: f32 = 1e-10;
/// Centroid reported for silent spectra.
pub const DEFAULT_CENTROID_HZ: f32 = 200.0;

#[inline]
pub fn db_to_linear(db: f32) -> f32 {
    if db.is_nan() || db == f32::NEG_INFINITY {
        return 0.0;
    }
    10f32.powf(db.min(60.0) / 20.0)
}

/// Fill `out` with the band's sub-bin amplitudes, each in 0..1.
pub fn map_band(spectrum: &Spectrum<'_>, band: &Band, out: &mut [f32]) {
    if out.is_empty() {
        return;
    }
    let Some((lo, hi)) = bin_range(spectrum, band.low_hz, band.high_hz) else {
        out.fill(0.0);
        return;
    };

    if hi <= lo {
        let value = nearest_bin_value(spectrum, band.low_hz, band.high_hz, band.scale);
        out.fill(value);
        return;
    }

    let range = hi - lo;
    let slots = out.len();
    for (i, slot) in out.iter_mut().enumerate() {
        let start = lo + i * range / slots;
        let end = (lo + (i + 1) * range / slots).max(start + 1);
        *slot = blend(&spectrum.db[start..end], band.scale);
    }
}

/// Single blended amplitude for one octave bucket, in 0..1.
pub fn octave_energy(spectrum: &Spectrum<'_>, octave: &Octave) -> f32 {
    let Some((lo, hi)) = bin_range(spectrum, octave.low_hz, octave.high_hz) else {
        return 0.0;
    };
    if hi <= lo {
        return nearest_bin_value(spectrum, octave.low_hz, octave.high_hz, octave.scale);
    }
    blend(&spectrum.db[lo..hi], octave.scale)
}

/// `(Σ f·a, Σ a)` over every bin above DC, with `a` the linear amplitude.
/// Kept separate so several stems can be pooled into one centroid.
pub fn centroid_moments(spectrum: &Spectrum<'_>) -> (f64, f64) {
    let bin_hz = spectrum.bin_hz() as f64;
    spectrum
        .db
        .iter()
        .enumerate()
        .skip(1)
        .fold((0.0, 0.0), |(weighted, total), (i, &db)| {
            let a = db_to_linear(db) as f64;
            (weighted + i as f64 * bin_hz * a, total + a)
        })
}

pub fn centroid_from_moments(weighted: f64, total: f64) -> f32 {
    if total < CENTROID_ENERGY_FLOOR as f64 {
        return DEFAULT_CENTROID_HZ;
    }
    (weighted / total) as f32
}

/// Energy-weighted mean frequency in Hz.
pub fn spectral_centroid_hz(spectrum: &Spectrum<'_>) -> f32 {
    let (weighted, total) = centroid_moments(spectrum);
    centroid_from_moments(weighted, total)
}

/// Half-open bin range for a frequency span, clamped into `[1, bins-1]`.
fn bin_range(spectrum: &Spectrum<'_>, low_hz: f32, high_hz: f32) -> Option<(usize, usize)> {
    let bins = spectrum.bins();
    if bins < 2 || spectrum.sample_rate <= 0.0 {
        return None;
    }
    let bin_hz = spectrum.bin_hz();
    let last = bins - 1;
    let lo = ((low_hz / bin_hz).floor() as usize).clamp(1, last);
    let hi = ((high_hz / bin_hz).ceil() as usize).clamp(1, last);
    Some((lo, hi))
}

fn nearest_bin_value(spectrum: &Spectrum<'_>, low_hz: f32, high_hz: f32, scale: f32) -> f32 {
    let center = 0.5 * (low_hz + high_hz);
    let bin = ((center / spectrum.bin_hz()).round() as usize).clamp(1, spectrum.bins() - 1);
    (db_to_linear(spectrum.db[bin]) * scale).clamp(0.0, 1.0)
}

fn blend(db: &[f32], scale: f32) -> f32 {
    let (sum, peak) = db.iter().fold((0.0f32, 0.0f32), |(sum, peak), &v| {
        let a = db_to_linear(v);
        (sum + a, peak.max(a))
    });
    let avg = sum / db.len() as f32;
    ((AVG_WEIGHT * avg + PEAK_WEIGHT * peak) * scale).clamp(0.0, 1.0)
}
