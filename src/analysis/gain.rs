/// Divisor floor; keeps silence at zero instead of amplifying noise.
pub const GAIN_FLOOR: f32 = 0.01;

/// Divides a band by the loudest per-frame peak still in its window, so a
/// quiet passage only opens up once the loud one has aged out.
#[derive(Debug, Clone)]
pub struct AutoGain {
    peaks: Vec<f32>,
    idx: usize,
}

impl AutoGain {
    pub fn new(window: usize) -> Self {
        Self {
            peaks: vec![0.0; window.max(1)],
            idx: 0,
        }
    }

    pub fn window(&self) -> usize {
        self.peaks.len()
    }

    /// Record this frame's peak and rescale `values` in place.
    pub fn normalize(&mut self, values: &mut [f32]) {
        let peak = values
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(0.0f32, f32::max);
        self.peaks[self.idx] = peak;
        self.idx = (self.idx + 1) % self.peaks.len();

        let ceiling = self.ceiling();
        for v in values.iter_mut() {
            *v = if v.is_finite() { v.max(0.0) / ceiling } else { 0.0 };
        }
    }

    /// Current divisor: loudest peak in the window, never below the floor.
    pub fn ceiling(&self) -> f32 {
        self.peaks.iter().copied().fold(GAIN_FLOOR, f32::max)
    }

    pub fn reset(&mut self) {
        self.peaks.fill(0.0);
        self.idx = 0;
    }
}
