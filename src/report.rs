use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use beatscope::analysis::bands::OCTAVE_COUNT;
use beatscope::analysis::engine::{BandSummary, FeatureEngine, SourceId};
use beatscope::analysis::state::{DeviceProfile, Stem};
use beatscope::beat::clock::BeatEvent;
use beatscope::beat::tempo::ResolvedTempo;

#[derive(Debug, Serialize)]
pub struct Header<'a> {
    pub input: &'a str,
    pub sample_rate: u32,
    pub duration: f64,
    pub fps: u32,
    pub profile: DeviceProfile,
    pub stems: bool,
    pub tempo: ResolvedTempo,
}

#[derive(Debug, Serialize)]
pub struct StemReport {
    pub stem: Stem,
    pub bands: Vec<BandSummary>,
}

/// Everything a renderer would read for one frame.
#[derive(Debug, Serialize)]
pub struct FrameReport {
    pub time: f64,
    pub dt: f32,
    pub beat: BeatEvent,
    pub beat_phase: f32,
    pub centroid: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bands: Option<Vec<BandSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stems: Option<Vec<StemReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub octaves: Option<[f32; OCTAVE_COUNT]>,
}

impl FrameReport {
    pub fn capture(
        engine: &FeatureEngine,
        stem_mode: bool,
        time: f64,
        dt: f32,
        beat: BeatEvent,
        beat_phase: f32,
    ) -> Self {
        let summarize = |source| engine.bands(source).map(|b| b.summary()).collect::<Vec<_>>();

        let (bands, stems) = if stem_mode {
            let stems = Stem::ALL
                .iter()
                .map(|&stem| StemReport {
                    stem,
                    bands: summarize(SourceId::Stem(stem)),
                })
                .collect();
            (None, Some(stems))
        } else {
            (Some(summarize(SourceId::Mix)), None)
        };

        Self {
            time,
            dt,
            beat,
            beat_phase,
            centroid: engine.centroid(),
            bands,
            stems,
            octaves: engine.octaves_enabled().then(|| engine.octave_levels()),
        }
    }
}

/// JSON-lines sink: a header line followed by one line per frame.
pub struct ReportWriter {
    out: BufWriter<Box<dyn Write>>,
}

impl ReportWriter {
    pub fn create(path: &Path) -> Result<Self> {
        let sink: Box<dyn Write> = if path.as_os_str() == "-" {
            Box::new(std::io::stdout())
        } else {
            Box::new(
                File::create(path)
                    .with_context(|| format!("Failed to create output file: {}", path.display()))?,
            )
        };
        Ok(Self {
            out: BufWriter::new(sink),
        })
    }

    pub fn write<T: Serialize>(&mut self, record: &T) -> Result<()> {
        serde_json::to_writer(&mut self.out, record)?;
        self.out.write_all(b"\n")?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush().context("Failed to flush feature output")
    }
}
