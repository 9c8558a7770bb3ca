pub mod clock;
pub mod offline;
pub mod tap;
pub mod tempo;

use serde::Serialize;

/// A tempo plus the playback time of one known beat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TempoEstimate {
    pub bpm: f32,
    /// Phase anchor in seconds.
    pub beat_offset: f64,
}
