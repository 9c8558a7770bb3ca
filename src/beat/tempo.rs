use serde::Serialize;
use std::path::Path;

use crate::audio::decode::AudioData;
use crate::backend::BackendError;

use super::clock::BeatClock;
use super::offline::{estimate_tempo, MAX_ANALYSIS_SECS};
use super::TempoEstimate;

/// A remote tempo detector.
pub trait TempoService {
    fn detect_bpm(&self, audio: &Path) -> Result<TempoEstimate, BackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TempoSource {
    Server,
    Offline,
    Manual,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedTempo {
    pub tempo: Option<TempoEstimate>,
    pub source: TempoSource,
}

impl ResolvedTempo {
    pub fn none() -> Self {
        Self {
            tempo: None,
            source: TempoSource::None,
        }
    }

    pub fn manual(bpm: f32, beat_offset: f64) -> Self {
        Self {
            tempo: Some(TempoEstimate { bpm, beat_offset }),
            source: TempoSource::Manual,
        }
    }

    /// 0 means no beat sync.
    pub fn bpm(&self) -> f32 {
        self.tempo.map_or(0.0, |t| t.bpm)
    }

    pub fn apply_to(&self, clock: &mut BeatClock) {
        match self.tempo {
            Some(t) => clock.set_tempo(t.bpm, t.beat_offset),
            None => clock.clear(),
        }
    }
}

pub fn resolve_tempo(
    service: Option<&dyn TempoService>,
    path: &Path,
    audio: Option<&AudioData>,
) -> ResolvedTempo {
    if let Some(service) = service {
        match service.detect_bpm(path) {
            Ok(tempo) => {
                log::info!("Server tempo: {:.1} BPM, offset {:.3}s", tempo.bpm, tempo.beat_offset);
                return ResolvedTempo {
                    tempo: Some(tempo),
                    source: TempoSource::Server,
                };
            }
            Err(err) => log::warn!("Server BPM detection failed: {}", err),
        }
    }

    let Some(audio) = audio else {
        log::warn!("No decoded audio for tempo fallback; beat sync disabled");
        return ResolvedTempo::none();
    };

    match estimate_tempo(audio.head(MAX_ANALYSIS_SECS), audio.sample_rate) {
        Some(tempo) => ResolvedTempo {
            tempo: Some(tempo),
            source: TempoSource::Offline,
        },
        None => {
            log::warn!("Could not estimate tempo; beat sync disabled");
            ResolvedTempo::none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<TempoEstimate, String>);

    impl TempoService for Fixed {
        fn detect_bpm(&self, _audio: &Path) -> Result<TempoEstimate, BackendError> {
            self.0.clone().map_err(BackendError::Server)
        }
    }

    fn clicks_at_120() -> AudioData {
        let sample_rate = 44100;
        let mut samples = vec![0.0; sample_rate as usize * 10];
        for k in 0..20 {
            samples[k * sample_rate as usize / 2] = 1.0;
        }
        AudioData { samples, sample_rate }
    }

    #[test]
    fn server_result_wins() {
        let service = Fixed(Ok(TempoEstimate { bpm: 140.0, beat_offset: 0.2 }));
        let resolved = resolve_tempo(Some(&service), Path::new("x.mp3"), Some(&clicks_at_120()));
        assert_eq!(resolved.source, TempoSource::Server);
        assert_eq!(resolved.bpm(), 140.0);
    }

    #[test]
    fn falls_back_to_offline_estimate() {
        let service = Fixed(Err("timeout".into()));
        let resolved = resolve_tempo(Some(&service), Path::new("x.mp3"), Some(&clicks_at_120()));
        assert_eq!(resolved.source, TempoSource::Offline);
        assert!((resolved.bpm() - 120.0).abs() <= 2.0);
    }

    #[test]
    fn total_failure_disables_beat_sync() {
        let service = Fixed(Err("down".into()));
        let silent = AudioData {
            samples: vec![0.0; 44100],
            sample_rate: 44100,
        };
        let resolved = resolve_tempo(Some(&service), Path::new("x.mp3"), Some(&silent));
        assert_eq!(resolved, ResolvedTempo::none());
        assert_eq!(resolve_tempo(None, Path::new("x.mp3"), None).bpm(), 0.0);

        let mut clock = BeatClock::with_tempo(TempoEstimate { bpm: 120.0, beat_offset: 0.0 });
        resolved.apply_to(&mut clock);
        assert!(!clock.has_tempo());
    }
}
