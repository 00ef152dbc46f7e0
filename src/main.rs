mod cli;
mod encode;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use ambience::audio::capture::offline::OfflineBackend;
use ambience::audio::capture::{CaptureBackend, CaptureManager, CaptureRequest};
use ambience::audio::decode::decode_audio;
use ambience::audio::features::{AnalyzerConfig, AnalyzerConfigPatch};
use ambience::config;
use ambience::driver::{DriverOptions, FrameDriver, TickOutcome};
use ambience::modes::{AmbienceEffect, ModeKind, VisualizerMode};
use ambience::render::backend::GpuBackend;
use ambience::render::broker::GpuContextBroker;
use ambience::render::gpu::WgpuBackend;
use ambience::render::headless::HeadlessBackend;
use cli::Cli;
use encode::ffmpeg::{EncoderSettings, FfmpegEncoder};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();
    let mut analyzer = AnalyzerConfig::default();
    let mut config_effect = AmbienceEffect::None;
    let mut config_performance = false;

    if let Some(ref path) = config::find_config(cli.config.as_deref()) {
        if let Some(cfg) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.width == config::default_width() { cli.width = cfg.output.width; }
            if cli.height == config::default_height() { cli.height = cfg.output.height; }
            if cli.fps == config::default_fps() { cli.fps = cfg.output.fps; }
            if cli.crf == config::default_crf() { cli.crf = cfg.output.crf; }
            if cli.codec == config::default_codec() { cli.codec = cfg.output.codec; }
            if cli.mode == config::default_mode() { cli.mode = cfg.visualizer.mode; }
            analyzer = cfg.analyzer;
            config_effect = cfg.visualizer.effect;
            config_performance = cfg.visualizer.performance_mode;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    if cli.list_modes {
        print_modes();
        return Ok(());
    }

    if let Some(ref json) = cli.analyzer {
        let patch = AnalyzerConfigPatch::from_json(json).context("Invalid --analyzer JSON")?;
        analyzer.apply(&patch);
    }

    let mode = VisualizerMode::from_key_or_default(&cli.mode);
    let effect = if cli.effect == "none" {
        config_effect
    } else {
        AmbienceEffect::from_key(&cli.effect)
    };
    let performance_mode = cli.performance || config_performance;
    if cli.fps == 0 {
        anyhow::bail!("--fps must be at least 1");
    }

    // 1. Capture source
    let (backend, request, source_duration) = capture_source(&cli)?;
    let duration = cli
        .duration
        .or(source_duration)
        .context("--duration is required for live sources")?;
    let total_frames = (duration * cli.fps as f32).ceil() as u64;

    log::info!("ambience - audio-reactive visualizer");
    log::info!("Output: {}", cli.output.display());
    log::info!("Mode: {} / effect: {:?}", mode.display_name(), effect);
    log::info!("Resolution: {}x{} @ {}fps, {:.1}s", cli.width, cli.height, cli.fps, duration);

    let mut capture = CaptureManager::new(backend, analyzer);
    capture
        .try_start(request.clone())
        .with_context(|| format!("Failed to start {} capture", request.kind()))?;

    // 2. Frame driver over a lazily created GPU backend
    let broker = gpu_broker(cli.no_gpu);
    let mut driver = FrameDriver::new(
        capture,
        broker,
        DriverOptions {
            width: cli.width,
            height: cli.height,
            mode,
            effect,
            performance_mode,
            seed: cli.seed,
            ..DriverOptions::default()
        },
    );

    // 3. Encoder
    let audio_input = match &request {
        CaptureRequest::File(path) => Some(path.as_path()),
        _ => None,
    };
    let mut encoder = FfmpegEncoder::new(
        &cli.output,
        audio_input,
        &EncoderSettings {
            width: cli.width,
            height: cli.height,
            fps: cli.fps,
            codec: &cli.codec,
            pix_fmt: &cli.pix_fmt,
            crf: cli.crf,
            bitrate: cli.bitrate.as_deref(),
        },
    )?;

    // 4. Record loop
    let pb = ProgressBar::new(total_frames);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")?
            .progress_chars("=>-"),
    );

    let frame_time = Duration::from_secs_f64(1.0 / cli.fps as f64);
    let realtime = audio_input.is_none();
    let started = Instant::now();
    let mut degraded = 0u64;

    for frame_idx in 0..total_frames {
        if realtime {
            // Live devices deliver samples on their own clock
            let deadline = started + frame_time * frame_idx as u32;
            if let Some(wait) = deadline.checked_duration_since(Instant::now()) {
                std::thread::sleep(wait);
            }
        }

        match driver.tick(frame_time) {
            TickOutcome::Rendered => {}
            TickOutcome::Degraded => degraded += 1,
            TickOutcome::Stopped => break,
        }
        encoder.write_frame(driver.canvas().pixels())?;
        pb.set_position(frame_idx + 1);

        if !driver.capture().is_audio_capture_active() {
            log::info!("Capture source ended at frame {}", frame_idx);
            break;
        }
    }

    pb.finish_with_message("Rendering complete");
    if degraded > 0 {
        log::warn!("{} frames rendered with errors", degraded);
    }
    if let Some(name) = driver.broker().backend_name() {
        log::info!("GPU backend: {}", name);
    }
    driver.unmount();

    // 5. Finish encoding
    log::info!("Finishing encoding...");
    encoder.finish()?;

    log::info!("Done! Output: {}", cli.output.display());
    Ok(())
}

fn print_modes() {
    println!("Available modes:");
    for mode in VisualizerMode::all() {
        let kind = match mode.kind() {
            ModeKind::Spectrum => "2d",
            ModeKind::Particle => "particles",
            ModeKind::Shader => "gpu",
            ModeKind::MultiPass => "gpu, multi-pass",
        };
        println!("  {:<20} {} [{}]", mode.id(), mode.display_name(), kind);
    }
    println!("Effects: none, rain, heavy-rain, snow, leaves, cherry-blossom, fireflies, cloud-shadows");
}

type CaptureSource = (Box<dyn CaptureBackend>, CaptureRequest, Option<f32>);

fn capture_source(cli: &Cli) -> Result<CaptureSource> {
    match cli.source.as_str() {
        "file" => {
            let input: PathBuf = cli.input.clone().context("Input audio file is required")?;
            if !input.exists() {
                anyhow::bail!("Input file not found: {}", input.display());
            }
            log::info!("Decoding audio...");
            let audio = decode_audio(&input).with_context(|| format!("Failed to decode {}", input.display()))?;
            let duration = audio.duration();
            let mut backend = OfflineBackend::new();
            backend.preload(input.clone(), audio);
            Ok((Box::new(backend), CaptureRequest::File(input), Some(duration)))
        }
        "mic" | "tab" => live_source(&cli.source),
        other => anyhow::bail!("Unknown source {:?} (expected file, mic or tab)", other),
    }
}

#[cfg(feature = "live-capture")]
fn live_source(source: &str) -> Result<CaptureSource> {
    use ambience::audio::capture::live::LiveBackend;
    let request = if source == "mic" {
        CaptureRequest::Mic
    } else {
        CaptureRequest::Tab
    };
    Ok((Box::new(LiveBackend::new()), request, None))
}

#[cfg(not(feature = "live-capture"))]
fn live_source(source: &str) -> Result<CaptureSource> {
    anyhow::bail!(
        "{} capture requires the 'live-capture' feature. \
         Rebuild with: cargo build --features live-capture",
        source
    )
}

fn gpu_broker(no_gpu: bool) -> GpuContextBroker {
    if no_gpu {
        return GpuContextBroker::with_backend(HeadlessBackend::new());
    }
    GpuContextBroker::new(Box::new(|| match WgpuBackend::new() {
        Ok(backend) => Ok(Box::new(backend) as Box<dyn GpuBackend>),
        Err(err) => {
            log::warn!("GPU unavailable ({}), using headless renderer", err);
            Ok(Box::new(HeadlessBackend::new()) as Box<dyn GpuBackend>)
        }
    }))
}
