pub mod bands;
pub mod centroid;
pub mod delta;
pub mod engine;
pub mod envelope;
pub mod gain;
pub mod smoothing;
pub mod state;
pub mod transient;
