mod cli;
mod report;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;

use beatscope::analysis::engine::FeatureEngine;
use beatscope::analysis::smoothing::FrameClock;
use beatscope::analysis::state::{DeviceProfile, Stem, StemSet};
use beatscope::audio::decode;
use beatscope::audio::spectrum::{DecodedSource, Spectrum, SpectrumSource};
use beatscope::backend::BackendClient;
use beatscope::beat::clock::BeatClock;
use beatscope::beat::tap::TapTempo;
use beatscope::beat::tempo::{self, ResolvedTempo, TempoService};
use beatscope::config::{self, Config, Tuning};

use cli::Cli;
use report::{FrameReport, Header, ReportWriter};

enum Sources {
    Mix(DecodedSource),
    Stems(StemSet<Option<DecodedSource>>),
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let cfg = match config::find_config(cli.config.as_deref()) {
        Some(path) => match config::load_config(&path) {
            Ok(cfg) => {
                log::info!("Loaded config from {}", path.display());
                cfg
            }
            Err(err) => {
                log::warn!("{:#}; using defaults", err);
                Config::default()
            }
        },
        None => Config::default(),
    };

    // CLI flags win over config values
    let profile = cli.profile.unwrap_or(cfg.analysis.profile);
    let fps = cli.fps.unwrap_or(cfg.analysis.fps).clamp(1, 240);
    let octaves = cli.octaves || cfg.analysis.octaves;
    let tuning = Tuning {
        global_scale: cli.scale.unwrap_or(cfg.tuning.global_scale),
        decay_rate: cli.decay_rate.unwrap_or(cfg.tuning.decay_rate),
        ..cfg.tuning.clone()
    };
    let backend_url = cli.backend.clone().or_else(|| cfg.backend.url.clone());

    if !cli.input.exists() {
        anyhow::bail!("Input file not found: {}", cli.input.display());
    }

    log::info!("beatscope - audio feature extraction");
    log::info!("Input: {}", cli.input.display());
    log::info!("Profile: {:?} @ {}fps", profile, fps);

    // 1. Decode
    let audio = decode::decode_audio(&cli.input)?;

    // 2. Backend
    let client = match backend_url {
        Some(url) => Some(
            BackendClient::with_timeouts(
                &url,
                Duration::from_secs(cfg.backend.bpm_timeout_secs),
                Duration::from_secs(cfg.backend.separation_timeout_secs),
            )
            .context("Failed to create backend client")?,
        ),
        None => None,
    };

    // 3. Tempo
    let tapped = tap_tempo(&cli.taps);
    let tempo = match (cli.bpm, tapped) {
        (Some(bpm), _) => ResolvedTempo::manual(bpm, cli.beat_offset),
        (None, Some(tapped)) => tapped,
        (None, None) => {
            let service = if cli.offline_bpm {
                None
            } else {
                client.as_ref().map(|c| c as &dyn TempoService)
            };
            tempo::resolve_tempo(service, &cli.input, Some(&audio))
        }
    };
    log::info!("Tempo: {:.1} BPM ({:?})", tempo.bpm(), tempo.source);

    if cli.tempo_only {
        println!("{}", serde_json::to_string(&tempo)?);
        return Ok(());
    }

    // 4. Sources
    let sample_rate = audio.sample_rate;
    let duration = audio.duration();
    let sources = if cli.stems {
        match client.as_ref() {
            Some(client) => match load_stems(client, &cli.input, profile) {
                Ok(stems) => Sources::Stems(stems),
                Err(err) => {
                    log::error!("Stem separation failed: {:#}", err);
                    log::warn!("Falling back to the mixed track");
                    Sources::Mix(DecodedSource::new(audio, profile.fft_size()))
                }
            },
            None => {
                log::warn!("--stems needs a backend URL; analyzing the mixed track");
                Sources::Mix(DecodedSource::new(audio, profile.fft_size()))
            }
        }
    } else {
        Sources::Mix(DecodedSource::new(audio, profile.fft_size()))
    };

    // 5. Frame loop
    let mut writer = ReportWriter::create(&cli.output)?;
    let input_name = cli.input.display().to_string();
    writer.write(&Header {
        input: &input_name,
        sample_rate,
        duration,
        fps,
        profile,
        stems: matches!(sources, Sources::Stems(_)),
        tempo,
    })?;

    let beats = run_frames(sources, &mut writer, profile, fps, duration, octaves, &tuning, &tempo)?;
    writer.finish()?;

    log::info!("Done! {} beats, output: {}", beats, cli.output.display());
    Ok(())
}

fn tap_tempo(taps: &[f64]) -> Option<ResolvedTempo> {
    let mut tapper = TapTempo::new();
    let estimate = taps.iter().fold(None, |_, &at| tapper.tap(at))?;
    Some(ResolvedTempo::manual(estimate.bpm, estimate.beat_offset))
}

/// Separate, download and decode all stems. A stem that fails to download
/// or decode is skipped; losing every stem is an error.
fn load_stems(
    client: &BackendClient,
    input: &Path,
    profile: DeviceProfile,
) -> Result<StemSet<Option<DecodedSource>>> {
    let urls = client.separate(input)?;
    let mut stems: StemSet<Option<DecodedSource>> = StemSet::default();

    for stem in Stem::ALL {
        let url = urls.get(stem);
        let extension = Path::new(url).extension().and_then(|e| e.to_str());
        let decoded = client
            .fetch(url)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| decode::decode_bytes(bytes, extension));
        match decoded {
            Ok(audio) => {
                log::info!("Stem {}: {:.1}s", stem.name(), audio.duration());
                stems[stem] = Some(DecodedSource::new(audio, profile.fft_size()));
            }
            Err(err) => log::warn!("Skipping stem {}: {:#}", stem.name(), err),
        }
    }

    if stems.iter().all(|(_, s)| s.is_none()) {
        anyhow::bail!("no stem could be downloaded and decoded");
    }
    Ok(stems)
}

#[allow(clippy::too_many_arguments)]
fn run_frames(
    mut sources: Sources,
    writer: &mut ReportWriter,
    profile: DeviceProfile,
    fps: u32,
    duration: f64,
    octaves: bool,
    tuning: &Tuning,
    tempo: &ResolvedTempo,
) -> Result<usize> {
    let total_frames = (duration * fps as f64).ceil() as usize;
    let stem_mode = matches!(sources, Sources::Stems(_));

    let mut engine = FeatureEngine::new(profile);
    engine.set_octaves(octaves);
    let mut clock = BeatClock::new();
    tempo.apply_to(&mut clock);
    let mut frame_clock = FrameClock::new();
    let mut beats = 0;

    log::info!("Processing {} frames...", total_frames);
    let pb = ProgressBar::new(total_frames as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    for frame_idx in 0..total_frames {
        let time = frame_idx as f64 / fps as f64;
        let dt = frame_clock.tick(time);

        match &mut sources {
            Sources::Mix(source) => {
                let spectrum = source.spectrum_at(time);
                engine.process_mix(&spectrum, tuning, dt);
            }
            Sources::Stems(stems) => {
                let mut spectra: StemSet<Option<Spectrum<'_>>> = StemSet::default();
                for (stem, source) in stems.iter_mut() {
                    if let Some(source) = source {
                        spectra[stem] = Some(source.spectrum_at(time));
                    }
                }
                engine.process_stems(&spectra, tuning, dt);
            }
        }

        let beat = clock.tick(time);
        if beat.fired {
            beats += 1;
            log::trace!("Beat {} at {:.3}s", beat.index, time);
        }

        writer.write(&FrameReport::capture(&engine, stem_mode, time, dt, beat, clock.phase(time)))?;
        pb.set_position(frame_idx as u64 + 1);
    }

    pb.finish_with_message("Analysis complete");
    Ok(beats)
}
