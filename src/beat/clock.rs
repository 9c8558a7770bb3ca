use serde::Serialize;

use super::TempoEstimate;

/// A position change larger than this between ticks is treated as a seek.
pub const SEEK_THRESHOLD_SECS: f64 = 0.5;
const MIN_BPM: f32 = 20.0;
const MAX_BPM: f32 = 300.0;

/// Result of one tick: the current beat index (-1 before the first beat or
/// without a tempo) and whether a new beat boundary was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BeatEvent {
    pub index: i64,
    pub fired: bool,
}

#[derive(Debug, Clone)]
pub struct BeatClock {
    bpm: f32,
    interval: f64,
    offset: f64,
    last_index: i64,
    last_position: Option<f64>,
}

impl Default for BeatClock {
    fn default() -> Self {
        Self {
            bpm: 0.0,
            interval: 0.0,
            offset: 0.0,
            last_index: -1,
            last_position: None,
        }
    }
}

impl BeatClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tempo(tempo: TempoEstimate) -> Self {
        let mut clock = Self::new();
        clock.set_tempo(tempo.bpm, tempo.beat_offset);
        clock
    }

    /// 0 when no tempo is known.
    pub fn bpm(&self) -> f32 {
        self.bpm
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn has_tempo(&self) -> bool {
        self.bpm > 0.0
    }

    pub fn last_index(&self) -> i64 {
        self.last_index
    }

    /// Replace tempo and phase anchor. Non-positive or non-finite BPM turns
    /// beat sync off; anything else is clamped to 20..300.
    pub fn set_tempo(&mut self, bpm: f32, offset: f64) {
        self.bpm = if bpm.is_finite() && bpm > 0.0 {
            bpm.clamp(MIN_BPM, MAX_BPM)
        } else {
            0.0
        };
        self.interval = if self.bpm > 0.0 { 60.0 / self.bpm as f64 } else { 0.0 };
        self.offset = if offset.is_finite() { offset } else { 0.0 };
        self.last_index = -1;
    }

    /// Explicit BPM entry; keeps the current phase anchor.
    pub fn set_bpm(&mut self, bpm: f32) {
        self.set_tempo(bpm, self.offset);
    }

    /// Declare `position` to be on a beat.
    pub fn resync(&mut self, position: f64) {
        self.set_tempo(self.bpm, position);
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Forget the last crossed beat so detection restarts at the next tick.
    pub fn notify_seek(&mut self) {
        self.last_index = -1;
        self.last_position = None;
    }

    pub fn beat_index(&self, position: f64) -> i64 {
        if self.interval <= 0.0 {
            return -1;
        }
        let adjusted = position - self.offset;
        if adjusted >= 0.0 {
            (adjusted / self.interval).floor() as i64
        } else {
            -1
        }
    }

    /// Progress through the current beat in 0..1, or 0 without a tempo.
    pub fn phase(&self, position: f64) -> f32 {
        if self.interval <= 0.0 {
            return 0.0;
        }
        let adjusted = position - self.offset;
        if adjusted < 0.0 {
            return 0.0;
        }
        ((adjusted / self.interval).fract()) as f32
    }

    pub fn tick(&mut self, position: f64) -> BeatEvent {
        if let Some(last) = self.last_position {
            if (position - last).abs() > SEEK_THRESHOLD_SECS {
                log::debug!("Seek detected ({:.2}s -> {:.2}s), resetting beat phase", last, position);
                self.last_index = -1;
            }
        }
        self.last_position = Some(position);

        let index = self.beat_index(position);
        let fired = index >= 0 && index != self.last_index;
        if fired {
            self.last_index = index;
        }
        BeatEvent { index, fired }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(clock: &mut BeatClock, from: f64, to: f64, step: f64) -> Vec<i64> {
        let mut fired = Vec::new();
        let mut pos = from;
        while pos < to {
            let ev = clock.tick(pos);
            if ev.fired {
                fired.push(ev.index);
            }
            pos += step;
        }
        fired
    }

    #[test]
    fn fires_once_per_beat() {
        let mut clock = BeatClock::with_tempo(TempoEstimate { bpm: 120.0, beat_offset: 0.0 });
        let fired = play(&mut clock, 0.0, 5.0, 1.0 / 60.0);
        assert_eq!(fired, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn index_is_monotonic_with_offset() {
        let mut clock = BeatClock::with_tempo(TempoEstimate { bpm: 128.0, beat_offset: 0.3 });
        let mut prev = -1;
        let mut fires = 0;
        let mut pos = 0.0;
        while pos < 10.0 {
            let ev = clock.tick(pos);
            assert!(ev.index >= prev);
            if ev.fired {
                assert_eq!(ev.index, prev + 1);
                fires += 1;
            }
            prev = ev.index;
            pos += 1.0 / 37.0;
        }
        assert!(fires > 15);
        assert_eq!(fires, prev + 1);
    }

    #[test]
    fn no_tempo_never_fires() {
        let mut clock = BeatClock::new();
        assert!(play(&mut clock, 0.0, 3.0, 0.01).is_empty());
        assert_eq!(clock.interval(), 0.0);
        clock.set_bpm(-5.0);
        assert!(!clock.has_tempo());
        assert_eq!(clock.interval(), 0.0);
    }

    #[test]
    fn backward_seek_restarts_cleanly() {
        let mut clock = BeatClock::with_tempo(TempoEstimate { bpm: 120.0, beat_offset: 0.0 });
        play(&mut clock, 0.0, 5.0, 1.0 / 60.0);
        assert_eq!(clock.last_index(), 9);

        // Land mid-beat 2: it fires once, then beat 3 fires on time.
        let fired = play(&mut clock, 1.2, 1.6, 1.0 / 60.0);
        assert_eq!(fired, vec![2, 3]);
    }

    #[test]
    fn forward_seek_does_not_skip_next_beat() {
        let mut clock = BeatClock::with_tempo(TempoEstimate { bpm: 120.0, beat_offset: 0.0 });
        play(&mut clock, 0.0, 1.1, 1.0 / 60.0);
        let first = clock.tick(4.9);
        assert!(first.fired);
        assert_eq!(first.index, 9);
        assert!(!clock.tick(4.95).fired);
        let next = clock.tick(5.0);
        assert!(next.fired);
        assert_eq!(next.index, 10);
    }

    #[test]
    fn manual_overrides_reset_phase() {
        let mut clock = BeatClock::with_tempo(TempoEstimate { bpm: 100.0, beat_offset: 0.0 });
        clock.tick(0.7);
        clock.resync(0.75);
        assert_eq!(clock.last_index(), -1);
        assert_eq!(clock.beat_index(0.74), -1);
        assert_eq!(clock.beat_index(0.75), 0);
        assert!(clock.tick(0.76).fired);

        clock.set_bpm(1000.0);
        assert_eq!(clock.bpm(), MAX_BPM);
        assert!((clock.interval() - 0.2).abs() < 1e-9);
    }

    #[test]
    fn phase_wraps_within_beat() {
        let clock = BeatClock::with_tempo(TempoEstimate { bpm: 60.0, beat_offset: 1.0 });
        assert_eq!(clock.phase(0.5), 0.0);
        assert!((clock.phase(2.25) - 0.25).abs() < 1e-6);
    }
}
