/// Reference frame rate for all tuned constants.
pub const REFERENCE_FPS: f64 = 60.0;

/// Upper bound for `dt`, so a stalled tab or debugger pause cannot slam
/// every filter straight to its target.
pub const MAX_DT: f32 = 10.0;

/// Convergence fraction for a per-frame rate applied over `dt` frames.
#[inline]
pub fn rate_for_dt(rate: f32, dt: f32) -> f32 {
    1.0 - (1.0 - rate.clamp(0.0, 1.0)).powf(dt)
}

/// Per-frame multiplicative decay applied over `dt` frames.
#[inline]
pub fn decay_for_dt(decay: f32, dt: f32) -> f32 {
    decay.clamp(0.0, 1.0).powf(dt)
}

/// Move `value` toward `target` by `rate` per reference frame.
#[inline]
pub fn approach(value: f32, target: f32, rate: f32, dt: f32) -> f32 {
    value + (target - value) * rate_for_dt(rate, dt)
}

/// Turns playback or wall-clock timestamps into `dt`.
#[derive(Debug, Default, Clone)]
pub struct FrameClock {
    last: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time since the previous call, in reference frames. The first call
    /// reports a single frame.
    pub fn tick(&mut self, now_sec: f64) -> f32 {
        let dt = match self.last {
            Some(prev) => ((now_sec - prev) * REFERENCE_FPS) as f32,
            None => 1.0,
        };
        self.last = Some(now_sec);
        dt.clamp(0.0, MAX_DT)
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
