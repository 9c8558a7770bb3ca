use beatscope::analysis::state::DeviceProfile;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "beatscope", about = "Beat-synced visualizer feature extraction")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Output feature file, one JSON object per frame ("-" for stdout)
    #[arg(short, long, default_value = "features.jsonl")]
    pub output: PathBuf,

    /// Config file (defaults to beatscope.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Resolution/frame-budget profile
    #[arg(long, value_enum)]
    pub profile: Option<DeviceProfile>,

    /// Frames per second of the simulated render loop
    #[arg(long)]
    pub fps: Option<u32>,

    /// Base URL of the separation/BPM service (e.g. http://localhost:5000)
    #[arg(long)]
    pub backend: Option<String>,

    /// Analyze the five separated stems instead of the mixed track
    #[arg(long)]
    pub stems: bool,

    /// Also compute the ten octave buckets for ring visuals
    #[arg(long)]
    pub octaves: bool,

    /// Use this tempo instead of detecting one
    #[arg(long)]
    pub bpm: Option<f32>,

    /// Playback time of a known beat, used with --bpm
    #[arg(long, default_value_t = 0.0)]
    pub beat_offset: f64,

    /// Tap-tempo timestamps in seconds (comma-separated); overrides detection
    #[arg(long, value_delimiter = ',')]
    pub taps: Vec<f64>,

    /// Skip the service and estimate tempo locally
    #[arg(long)]
    pub offline_bpm: bool,

    /// Print the resolved tempo and exit
    #[arg(long)]
    pub tempo_only: bool,

    /// Global amplitude scale (overrides config)
    #[arg(long)]
    pub scale: Option<f32>,

    /// Envelope persistence, 0.0-0.99 (overrides config)
    #[arg(long)]
    pub decay_rate: Option<f32>,
}
