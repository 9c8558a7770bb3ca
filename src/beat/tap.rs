use std::collections::VecDeque;

use super::TempoEstimate;

const MAX_TAPS: usize = 8;
/// A pause longer than this starts a new tap sequence.
const RESET_GAP_SECS: f64 = 2.0;

/// Tap-tempo input: BPM from the mean interval of recent taps, phase
/// anchored on the latest tap.
#[derive(Debug, Clone, Default)]
pub struct TapTempo {
    taps: VecDeque<f64>,
}

impl TapTempo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn taps(&self) -> usize {
        self.taps.len()
    }

    /// Register a tap at playback position `at`. Returns a tempo once two
    /// or more taps are in the current sequence.
    pub fn tap(&mut self, at: f64) -> Option<TempoEstimate> {
        if let Some(&last) = self.taps.back() {
            if at - last > RESET_GAP_SECS || at <= last {
                self.taps.clear();
            }
        }
        self.taps.push_back(at);
        if self.taps.len() > MAX_TAPS {
            self.taps.pop_front();
        }

        let (first, last) = (*self.taps.front()?, *self.taps.back()?);
        let intervals = self.taps.len() - 1;
        if intervals == 0 {
            return None;
        }
        let mean = (last - first) / intervals as f64;
        Some(TempoEstimate {
            bpm: (60.0 / mean) as f32,
            beat_offset: last,
        })
    }

    pub fn clear(&mut self) {
        self.taps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steady_taps_give_bpm() {
        let mut tap = TapTempo::new();
        assert!(tap.tap(10.0).is_none());
        let mut est = None;
        for i in 1..6 {
            est = tap.tap(10.0 + i as f64 * 0.5);
        }
        let est = est.unwrap();
        assert!((est.bpm - 120.0).abs() < 1e-3);
        assert_eq!(est.beat_offset, 12.5);
    }

    #[test]
    fn long_pause_starts_over() {
        let mut tap = TapTempo::new();
        tap.tap(1.0);
        tap.tap(1.5);
        assert!(tap.tap(5.0).is_none());
        assert_eq!(tap.taps(), 1);
        let est = tap.tap(5.6).unwrap();
        assert!((est.bpm - 100.0).abs() < 1e-3);
    }

    #[test]
    fn keeps_only_recent_taps() {
        let mut tap = TapTempo::new();
        for i in 0..20 {
            tap.tap(i as f64 * 0.4);
        }
        assert_eq!(tap.taps(), MAX_TAPS);
    }
}
