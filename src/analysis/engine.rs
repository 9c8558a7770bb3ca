use serde::Serialize;

use crate::audio::spectrum::Spectrum;
use crate::config::Tuning;

use super::bands::{
    centroid_from_moments, centroid_moments, map_band, octave_energy, BANDS, BAND_COUNT,
    OCTAVES, OCTAVE_COUNT,
};
use super::centroid::CentroidTracker;
use super::envelope::EnvelopeParams;
use super::state::{BandState, DeviceProfile, OctaveState, SourceState, Stem, StemSet};

const OCTAVE_ATTACK: f32 = 0.6;
const OCTAVE_RELEASE: f32 = 0.12;

/// Which audio source a band belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceId {
    Mix,
    Stem(Stem),
}

/// Read-only view of one band's output for the current frame.
#[derive(Debug, Clone, Copy)]
pub struct BandView<'a> {
    pub name: &'static str,
    pub smoothed: &'a [f32],
    pub transient: f32,
    pub delta: f32,
}

impl<'a> BandView<'a> {
    fn of(name: &'static str, state: &'a BandState) -> Self {
        BandView {
            name,
            smoothed: state.smoothed(),
            transient: state.transient(),
            delta: state.delta(),
        }
    }

    pub fn level(&self) -> f32 {
        if self.smoothed.is_empty() {
            return 0.0;
        }
        self.smoothed.iter().sum::<f32>() / self.smoothed.len() as f32
    }

    pub fn peak(&self) -> f32 {
        self.smoothed.iter().copied().fold(0.0, f32::max)
    }

    pub fn summary(&self) -> BandSummary {
        BandSummary {
            name: self.name,
            level: self.level(),
            peak: self.peak(),
            transient: self.transient,
            delta: self.delta,
        }
    }
}

/// Owned per-band scalars, for logging and serialization.
#[derive(Debug, Clone, Serialize)]
pub struct BandSummary {
    pub name: &'static str,
    pub level: f32,
    pub peak: f32,
    pub transient: f32,
    pub delta: f32,
}

/// Owns all per-source state; spectra, tuning and `dt` are passed in each frame.
pub struct FeatureEngine {
    profile: DeviceProfile,
    mix: SourceState,
    stems: StemSet<SourceState>,
    octaves: OctaveState,
    octaves_enabled: bool,
    centroid: CentroidTracker,
    scratch: Vec<f32>,
    octave_energy: [f32; OCTAVE_COUNT],
}

impl FeatureEngine {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile,
            mix: SourceState::new(profile),
            stems: StemSet::from_fn(|_| SourceState::new(profile)),
            octaves: OctaveState::new(profile),
            octaves_enabled: false,
            centroid: CentroidTracker::new(),
            scratch: vec![0.0; profile.resolution()],
            octave_energy: [0.0; OCTAVE_COUNT],
        }
    }

    pub fn profile(&self) -> DeviceProfile {
        self.profile
    }

    /// Octave buckets are only computed while the ring visual needs them.
    pub fn set_octaves(&mut self, enabled: bool) {
        if self.octaves_enabled && !enabled {
            self.octaves.reset();
        }
        self.octaves_enabled = enabled;
    }

    pub fn octaves_enabled(&self) -> bool {
        self.octaves_enabled
    }

    /// One frame of the single mixed track.
    pub fn process_mix(&mut self, spectrum: &Spectrum<'_>, tuning: &Tuning, dt: f32) {
        process_source(&mut self.mix, &mut self.scratch, spectrum, tuning, dt);

        let (weighted, total) = centroid_moments(spectrum);
        self.centroid.update(centroid_from_moments(weighted, total), dt);

        if self.octaves_enabled {
            for (energy, octave) in self.octave_energy.iter_mut().zip(OCTAVES.iter()) {
                *energy = octave_energy(spectrum, octave);
            }
            self.process_octaves(tuning, dt);
        }
    }

    /// One frame in stem mode. Stems without a spectrum this frame are
    /// left untouched and excluded from the shared centroid and octaves.
    pub fn process_stems(&mut self, spectra: &StemSet<Option<Spectrum<'_>>>, tuning: &Tuning, dt: f32) {
        let mut weighted = 0.0;
        let mut total = 0.0;
        let mut contributing = 0usize;
        self.octave_energy = [0.0; OCTAVE_COUNT];

        for (stem, spectrum) in spectra.iter() {
            let Some(spectrum) = spectrum else {
                continue;
            };
            process_source(&mut self.stems[stem], &mut self.scratch, spectrum, tuning, dt);

            let (w, t) = centroid_moments(spectrum);
            weighted += w;
            total += t;
            contributing += 1;

            if self.octaves_enabled {
                for (energy, octave) in self.octave_energy.iter_mut().zip(OCTAVES.iter()) {
                    *energy += octave_energy(spectrum, octave);
                }
            }
        }

        if contributing == 0 {
            return;
        }
        self.centroid.update(centroid_from_moments(weighted, total), dt);

        if self.octaves_enabled {
            let n = contributing as f32;
            self.octave_energy.iter_mut().for_each(|e| *e /= n);
            self.process_octaves(tuning, dt);
        }
    }

    fn process_octaves(&mut self, tuning: &Tuning, dt: f32) {
        let params = EnvelopeParams::new(tuning.scale(), OCTAVE_ATTACK, OCTAVE_RELEASE, tuning.decay_rate());
        for (state, &energy) in self.octaves.octaves.iter_mut().zip(self.octave_energy.iter()) {
            let mut raw = [energy];
            state.process(&mut raw, &params, dt);
        }
    }

    /// Back to baseline: every envelope, gain window, detector and the
    /// centroid. Called on track change, not on seek.
    pub fn reset(&mut self) {
        self.mix.reset();
        self.stems.iter_mut().for_each(|(_, s)| s.reset());
        self.octaves.reset();
        self.centroid.reset();
        log::debug!("Feature engine reset");
    }

    pub fn band(&self, source: SourceId, band: usize) -> Option<BandView<'_>> {
        let state = match source {
            SourceId::Mix => &self.mix,
            SourceId::Stem(stem) => &self.stems[stem],
        };
        Some(BandView::of(BANDS.get(band)?.name, state.band(band)?))
    }

    pub fn bands(&self, source: SourceId) -> impl Iterator<Item = BandView<'_>> {
        (0..BAND_COUNT).filter_map(move |i| self.band(source, i))
    }

    pub fn octave(&self, index: usize) -> Option<BandView<'_>> {
        Some(BandView::of("octave", self.octaves.octave(index)?))
    }

    /// Smoothed octave levels, lowest octave first.
    pub fn octave_levels(&self) -> [f32; OCTAVE_COUNT] {
        std::array::from_fn(|i| self.octaves.octaves[i].smoothed()[0])
    }

    /// Normalized, smoothed spectral centroid in 0..1.
    pub fn centroid(&self) -> f32 {
        self.centroid.value()
    }
}

fn process_source(
    state: &mut SourceState,
    scratch: &mut [f32],
    spectrum: &Spectrum<'_>,
    tuning: &Tuning,
    dt: f32,
) {
    for (i, (band, band_state)) in BANDS.iter().zip(state.bands.iter_mut()).enumerate() {
        map_band(spectrum, band, scratch);
        band_state.process(scratch, &tuning.band_params(i), dt);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::centroid::NEUTRAL_CENTROID;

    const SR: f32 = 44100.0;
    const MID: usize = 3;

    fn tone(bins: usize, freq: f32) -> Vec<f32> {
        let mut db = vec![-120.0; bins];
        let bin_hz = SR / (2 * bins) as f32;
        db[(freq / bin_hz).round() as usize] = 0.0;
        db
    }

    #[test]
    fn mid_tone_dominates_after_convergence() {
        let profile = DeviceProfile::Desktop;
        let mut engine = FeatureEngine::new(profile);
        let tuning = Tuning::default();
        let db = tone(profile.fft_size() / 2, 1000.0);
        let spectrum = Spectrum::new(&db, SR);

        for _ in 0..profile.gain_window() {
            engine.process_mix(&spectrum, &tuning, 1.0);
        }

        let mid = engine.band(SourceId::Mix, MID).unwrap();
        assert!((mid.peak() - BANDS[MID].scale.min(1.0)).abs() < 1e-3);
        for view in engine.bands(SourceId::Mix) {
            assert!(view.peak() <= mid.peak() + 1e-6, "{}", view.name);
        }
    }

    #[test]
    fn silence_leaves_neutral_outputs() {
        let mut engine = FeatureEngine::new(DeviceProfile::Mobile);
        let tuning = Tuning::default();
        let loud = tone(1024, 120.0);
        for _ in 0..30 {
            engine.process_mix(&Spectrum::new(&loud, SR), &tuning, 1.0);
        }

        let silent = vec![f32::NEG_INFINITY; 1024];
        for _ in 0..10 {
            engine.process_mix(&Spectrum::new(&silent, SR), &tuning, 1.0);
        }
        for view in engine.bands(SourceId::Mix) {
            assert_eq!(view.transient, 1.0, "{}", view.name);
            assert_eq!(view.delta, 0.0, "{}", view.name);
            assert!(view.smoothed.iter().all(|v| v.is_finite()));
        }
    }

    #[test]
    fn stems_are_independent() {
        let mut engine = FeatureEngine::new(DeviceProfile::Mobile);
        let tuning = Tuning::default();
        let kick = tone(1024, 50.0);
        let mut spectra: StemSet<Option<Spectrum<'_>>> = StemSet::default();
        spectra[Stem::Kick] = Some(Spectrum::new(&kick, SR));

        for _ in 0..20 {
            engine.process_stems(&spectra, &tuning, 1.0);
        }

        let kick_level = engine.band(SourceId::Stem(Stem::Kick), 0).unwrap().peak();
        let vocal_level = engine.band(SourceId::Stem(Stem::Vocals), 0).unwrap().peak();
        assert!(kick_level > 0.5);
        assert_eq!(vocal_level, 0.0);
        assert!(engine.centroid() < NEUTRAL_CENTROID);
    }

    #[test]
    fn stem_octaves_average_active_stems() {
        let mut engine = FeatureEngine::new(DeviceProfile::Mobile);
        engine.set_octaves(true);
        let tuning = Tuning::default();
        let a = tone(1024, 600.0);
        let silent = vec![-200.0; 1024];
        let mut spectra: StemSet<Option<Spectrum<'_>>> = StemSet::default();
        spectra[Stem::Vocals] = Some(Spectrum::new(&a, SR));
        spectra[Stem::Bass] = Some(Spectrum::new(&silent, SR));

        engine.process_stems(&spectra, &tuning, 1.0);
        let solo = octave_energy(&Spectrum::new(&a, SR), &OCTAVES[4]);
        assert!(solo > 0.5);
        // The silent bass stem counts toward the average.
        assert!((engine.octave_energy[4] - solo / 2.0).abs() < 1e-4);

        let levels = engine.octave_levels();
        let loudest = levels
            .iter()
            .enumerate()
            .fold((0, 0.0f32), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert_eq!(loudest.0, 4);
    }

    #[test]
    fn reset_clears_history_and_centroid() {
        let mut engine = FeatureEngine::new(DeviceProfile::Mobile);
        engine.set_octaves(true);
        let tuning = Tuning::default();
        let db = tone(1024, 8000.0);
        for _ in 0..50 {
            engine.process_mix(&Spectrum::new(&db, SR), &tuning, 1.0);
        }
        assert!(engine.centroid() > NEUTRAL_CENTROID);

        engine.reset();
        assert_eq!(engine.centroid(), NEUTRAL_CENTROID);
        for view in engine.bands(SourceId::Mix) {
            assert_eq!(view.peak(), 0.0);
        }
        assert_eq!(engine.octave_levels(), [0.0; OCTAVE_COUNT]);
    }

    #[test]
    fn reset_reopens_gain_for_a_quiet_track() {
        let profile = DeviceProfile::Mobile;
        let mut engine = FeatureEngine::new(profile);
        let tuning = Tuning::default();
        let loud = tone(1024, 1000.0);
        let mut quiet = vec![-120.0; 1024];
        let bin = (1000.0 / (SR / 2048.0)).round() as usize;
        quiet[bin] = -30.0;

        for _ in 0..10 {
            engine.process_mix(&Spectrum::new(&loud, SR), &tuning, 1.0);
        }
        engine.reset();

        // Far fewer frames than the gain window: only a cleared window lets
        // the quiet tone reach full scale.
        for _ in 0..profile.gain_window() / 3 {
            engine.process_mix(&Spectrum::new(&quiet, SR), &tuning, 1.0);
        }
        let mid = engine.band(SourceId::Mix, MID).unwrap();
        assert!(mid.peak() > 0.99, "{}", mid.peak());
    }

    #[test]
    fn variable_frame_pacing_converges_alike() {
        let tuning = Tuning::default();
        let db = tone(1024, 1000.0);
        let spectrum = Spectrum::new(&db, SR);

        let mut fast = FeatureEngine::new(DeviceProfile::Mobile);
        let mut slow = FeatureEngine::new(DeviceProfile::Mobile);
        // Prime both gain windows identically so only the envelope differs.
        fast.process_mix(&spectrum, &tuning, 0.0);
        slow.process_mix(&spectrum, &tuning, 0.0);
        for _ in 0..2 {
            fast.process_mix(&spectrum, &tuning, 1.0);
        }
        slow.process_mix(&spectrum, &tuning, 2.0);

        let a = fast.band(SourceId::Mix, MID).unwrap().peak();
        let b = slow.band(SourceId::Mix, MID).unwrap().peak();
        assert!((a - b).abs() < 1e-4, "{a} vs {b}");
    }
}
