use super::smoothing::approach;

const ATTACK: f32 = 0.6;
const RELEASE: f32 = 0.15;
/// Output gain before clamping to 1.0.
const GAIN: f32 = 4.0;
/// Mean energy below this is silence and clears the detector.
const SILENCE: f32 = 1e-4;

#[derive(Debug, Clone, Default)]
pub struct DeltaDetector {
    prev_mean: f32,
    smoothed: f32,
}

impl DeltaDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value(&self) -> f32 {
        (self.smoothed * GAIN).min(1.0)
    }

    /// Feed one frame of normalized band values; returns the delta in 0..1.
    /// Falling energy counts as zero change.
    pub fn update(&mut self, values: &[f32], dt: f32) -> f32 {
        let mean = if values.is_empty() {
            0.0
        } else {
            values.iter().copied().filter(|v| v.is_finite()).sum::<f32>() / values.len() as f32
        };

        if mean < SILENCE {
            self.prev_mean = mean.max(0.0);
            self.smoothed = 0.0;
            return 0.0;
        }

        let rising = (mean - self.prev_mean).max(0.0);
        self.prev_mean = mean;

        let rate = if rising > self.smoothed { ATTACK } else { RELEASE };
        self.smoothed = approach(self.smoothed, rising, rate, dt).max(0.0);
        self.value()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
