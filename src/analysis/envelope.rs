use super::smoothing::rate_for_dt;

/// Decay-rate setting at which band release constants apply unchanged.
pub const BASELINE_DECAY_RATE: f32 = 0.85;
const MAX_DECAY_RATE: f32 = 0.99;
const MIN_RELEASE: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeParams {
    pub sensitivity: f32,
    pub attack: f32,
    pub release: f32,
}

impl EnvelopeParams {
    /// Band rates with the global decay setting folded into the release.
    pub fn new(sensitivity: f32, attack: f32, release: f32, decay_rate: f32) -> Self {
        Self {
            sensitivity: sensitivity.max(0.0),
            attack: attack.clamp(0.0, 1.0),
            release: scaled_release(release, decay_rate),
        }
    }
}

/// Power-law release multiplier: 1.0 at the baseline, larger for a lower
/// decay rate (snappier), approaching zero as the rate approaches 1.
pub fn release_scale(decay_rate: f32) -> f32 {
    let d = decay_rate.clamp(0.0, MAX_DECAY_RATE);
    ((1.0 - d) / (1.0 - BASELINE_DECAY_RATE)).powi(3)
}

pub fn scaled_release(release: f32, decay_rate: f32) -> f32 {
    (release * release_scale(decay_rate)).clamp(MIN_RELEASE, 1.0)
}

/// Blend `raw * sensitivity` into `smoothed`, bin by bin.
pub fn smooth_envelope(smoothed: &mut [f32], raw: &[f32], params: &EnvelopeParams, dt: f32) {
    let attack = rate_for_dt(params.attack, dt);
    let release = rate_for_dt(params.release, dt);
    for (s, &r) in smoothed.iter_mut().zip(raw) {
        let target = if r.is_finite() { r * params.sensitivity } else { 0.0 };
        let k = if target > *s { attack } else { release };
        *s += (target - *s) * k;
    }
}
