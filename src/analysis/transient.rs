use super::smoothing::{approach, decay_for_dt};

/// Running average rate per 60 fps frame.
const AVG_RATE: f32 = 0.05;
/// Peak-to-average ratio counted as a hit.
const SPIKE_RATIO: f32 = 1.8;
/// Multiplier applied on a hit.
const BOOST: f32 = 1.5;
/// Per-frame decay of the boost back toward 1.0.
const BOOST_DECAY: f32 = 0.9;
/// Below this the band is treated as silent.
const FLOOR: f32 = 0.01;
/// Remaining boost small enough to snap to 1.0.
const SNAP: f32 = 1e-3;

#[derive(Debug, Clone)]
pub struct TransientDetector {
    avg: f32,
    multiplier: f32,
}

impl Default for TransientDetector {
    fn default() -> Self {
        Self {
            avg: 0.0,
            multiplier: 1.0,
        }
    }
}

impl TransientDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn multiplier(&self) -> f32 {
        self.multiplier
    }

    pub fn average(&self) -> f32 {
        self.avg
    }

    /// Feed one frame of normalized band values; returns the multiplier.
    pub fn update(&mut self, values: &[f32], dt: f32) -> f32 {
        let peak = values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0f32, f32::max);

        let spike = self.avg > FLOOR && peak / self.avg > SPIKE_RATIO;
        self.avg = approach(self.avg, peak, AVG_RATE, dt);

        if peak < FLOOR {
            self.multiplier = 1.0;
        } else if spike {
            self.multiplier = BOOST;
        } else {
            let excess = (self.multiplier - 1.0) * decay_for_dt(BOOST_DECAY, dt);
            self.multiplier = if excess < SNAP { 1.0 } else { 1.0 + excess };
        }
        self.multiplier
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(detector: &mut TransientDetector, level: f32, frames: usize) {
        for _ in 0..frames {
            detector.update(&[level], 1.0);
        }
    }

    #[test]
    fn spike_over_running_average_boosts() {
        let mut d = TransientDetector::new();
        settle(&mut d, 0.2, 200);
        assert_eq!(d.multiplier(), 1.0);
        assert_eq!(d.update(&[0.2, 0.9], 1.0), BOOST);
    }

    #[test]
    fn boost_decays_monotonically_to_one() {
        let mut d = TransientDetector::new();
        settle(&mut d, 0.2, 200);
        d.update(&[0.9], 1.0);
        let mut prev = d.multiplier();
        for _ in 0..300 {
            let m = d.update(&[0.3], 1.0);
            assert!(m <= prev);
            assert!(m >= 1.0);
            prev = m;
        }
        assert_eq!(prev, 1.0);
    }

    #[test]
    fn decay_is_frame_rate_independent() {
        let mut a = TransientDetector::new();
        let mut b = TransientDetector::new();
        for d in [&mut a, &mut b] {
            settle(d, 0.2, 200);
            d.update(&[0.9], 1.0);
        }
        // Half-rate frames vs full-rate frames at a steady level.
        a.update(&[0.2], 2.0);
        b.update(&[0.2], 1.0);
        b.update(&[0.2], 1.0);
        assert!((a.multiplier() - b.multiplier()).abs() < 1e-5);
    }

    #[test]
    fn silence_resets_multiplier() {
        let mut d = TransientDetector::new();
        settle(&mut d, 0.2, 100);
        d.update(&[1.0], 1.0);
        for _ in 0..10 {
            assert_eq!(d.update(&[0.0; 4], 1.0), 1.0);
        }
    }

    #[test]
    fn first_frame_never_fires() {
        let mut d = TransientDetector::new();
        assert_eq!(d.update(&[1.0], 1.0), 1.0);
    }
}
