use super::smoothing::approach;

pub const NEUTRAL_CENTROID: f32 = 0.5;
const MIN_HZ: f32 = 20.0;
const MAX_HZ: f32 = 20000.0;
const RATE: f32 = 0.05;

/// Map a frequency onto 0..1 on a log2 scale between 20 Hz and 20 kHz.
pub fn normalize_hz(hz: f32) -> f32 {
    if !hz.is_finite() || hz <= MIN_HZ {
        return 0.0;
    }
    ((hz.log2() - MIN_HZ.log2()) / (MAX_HZ.log2() - MIN_HZ.log2())).clamp(0.0, 1.0)
}

/// Slowly smoothed "brightness" of the active sources.
#[derive(Debug, Clone)]
pub struct CentroidTracker {
    value: f32,
}

impl Default for CentroidTracker {
    fn default() -> Self {
        Self {
            value: NEUTRAL_CENTROID,
        }
    }
}

impl CentroidTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn update(&mut self, centroid_hz: f32, dt: f32) -> f32 {
        self.value = approach(self.value, normalize_hz(centroid_hz), RATE, dt);
        self.value
    }

    pub fn reset(&mut self) {
        self.value = NEUTRAL_CENTROID;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_mapping_endpoints() {
        assert_eq!(normalize_hz(20.0), 0.0);
        assert!((normalize_hz(20000.0) - 1.0).abs() < 1e-6);
        assert!((normalize_hz(632.45) - 0.5).abs() < 1e-3);
        assert_eq!(normalize_hz(f32::NAN), 0.0);
    }

    #[test]
    fn tracker_moves_slowly_and_resets() {
        let mut t = CentroidTracker::new();
        let v = t.update(20000.0, 1.0);
        assert!(v > NEUTRAL_CENTROID && v < 0.6);
        for _ in 0..500 {
            t.update(20000.0, 1.0);
        }
        assert!(t.value() > 0.99);
        t.reset();
        assert_eq!(t.value(), NEUTRAL_CENTROID);
    }
}
