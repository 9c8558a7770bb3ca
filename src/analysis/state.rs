use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

use super::bands::{BAND_COUNT, OCTAVE_COUNT};
use super::delta::DeltaDetector;
use super::envelope::{smooth_envelope, EnvelopeParams};
use super::gain::AutoGain;
use super::transient::TransientDetector;

/// Resolution and history sizes per hardware class. Mobile halves the FFT,
/// the sub-bin count and the frame rate to stay inside its frame budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DeviceProfile {
    #[default]
    Desktop,
    Mobile,
}

impl DeviceProfile {
    pub fn fft_size(self) -> usize {
        match self {
            Self::Desktop => 4096,
            Self::Mobile => 2048,
        }
    }

    /// Sub-bins per band in the smoothed output.
    pub fn resolution(self) -> usize {
        match self {
            Self::Desktop => 60,
            Self::Mobile => 30,
        }
    }

    /// Auto-gain history length in frames (about 5 s at the target rate).
    pub fn gain_window(self) -> usize {
        match self {
            Self::Desktop => 300,
            Self::Mobile => 150,
        }
    }

    pub fn target_fps(self) -> u32 {
        match self {
            Self::Desktop => 60,
            Self::Mobile => 30,
        }
    }
}

/// Everything tracked for one band (or octave) of one source.
#[derive(Debug, Clone)]
pub struct BandState {
    smoothed: Vec<f32>,
    gain: AutoGain,
    transient: TransientDetector,
    delta: DeltaDetector,
}

impl BandState {
    pub fn new(resolution: usize, gain_window: usize) -> Self {
        Self {
            smoothed: vec![0.0; resolution.max(1)],
            gain: AutoGain::new(gain_window),
            transient: TransientDetector::new(),
            delta: DeltaDetector::new(),
        }
    }

    pub fn smoothed(&self) -> &[f32] {
        &self.smoothed
    }

    pub fn transient(&self) -> f32 {
        self.transient.multiplier()
    }

    pub fn delta(&self) -> f32 {
        self.delta.value()
    }

    pub fn resolution(&self) -> usize {
        self.smoothed.len()
    }

    /// Run one frame: normalize `raw` in place, update both detectors from
    /// the normalized values, then blend into the envelope.
    pub fn process(&mut self, raw: &mut [f32], params: &EnvelopeParams, dt: f32) {
        debug_assert_eq!(raw.len(), self.smoothed.len());
        self.gain.normalize(raw);
        self.transient.update(raw, dt);
        self.delta.update(raw, dt);
        smooth_envelope(&mut self.smoothed, raw, params, dt);
    }

    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
        self.gain.reset();
        self.transient.reset();
        self.delta.reset();
    }
}

/// Seven-band state for the mixed track or one stem.
#[derive(Debug, Clone)]
pub struct SourceState {
    pub(crate) bands: [BandState; BAND_COUNT],
}

impl SourceState {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            bands: std::array::from_fn(|_| {
                BandState::new(profile.resolution(), profile.gain_window())
            }),
        }
    }

    pub fn band(&self, index: usize) -> Option<&BandState> {
        self.bands.get(index)
    }

    pub fn reset(&mut self) {
        self.bands.iter_mut().for_each(BandState::reset);
    }
}

/// Ten single-value octave buckets for the ring/tunnel visual.
#[derive(Debug, Clone)]
pub struct OctaveState {
    pub(crate) octaves: [BandState; OCTAVE_COUNT],
}

impl OctaveState {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            octaves: std::array::from_fn(|_| BandState::new(1, profile.gain_window())),
        }
    }

    pub fn octave(&self, index: usize) -> Option<&BandState> {
        self.octaves.get(index)
    }

    pub fn reset(&mut self) {
        self.octaves.iter_mut().for_each(BandState::reset);
    }
}

/// The five separated instrument stems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Kick,
    Drums,
    Bass,
    Vocals,
    Other,
}

impl Stem {
    pub const COUNT: usize = 5;
    pub const ALL: [Stem; Stem::COUNT] = [
        Stem::Kick,
        Stem::Drums,
        Stem::Bass,
        Stem::Vocals,
        Stem::Other,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stem::Kick => "kick",
            Stem::Drums => "drums",
            Stem::Bass => "bass",
            Stem::Vocals => "vocals",
            Stem::Other => "other",
        }
    }
}

/// One value per stem, indexed by [`Stem`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StemSet<T>([T; Stem::COUNT]);

impl<T> StemSet<T> {
    pub fn from_fn(mut f: impl FnMut(Stem) -> T) -> Self {
        Self(std::array::from_fn(|i| f(Stem::ALL[i])))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stem, &T)> {
        Stem::ALL.into_iter().zip(self.0.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Stem, &mut T)> {
        Stem::ALL.into_iter().zip(self.0.iter_mut())
    }
}

impl<T> Index<Stem> for StemSet<T> {
    type Output = T;

    fn index(&self, stem: Stem) -> &T {
        &self.0[stem as usize]
    }
}

impl<T> IndexMut<Stem> for StemSet<T> {
    fn index_mut(&mut self, stem: Stem) -> &mut T {
        &mut self.0[stem as usize]
    }
}
