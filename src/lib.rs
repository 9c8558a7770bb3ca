pub mod analysis;
pub mod audio;
pub mod backend;
pub mod beat;
pub mod config;
