mod common;

use std::time::Duration;

use ambience::audio::features::FeatureVector;
use ambience::driver::TickOutcome;
use ambience::modes::{AmbienceEffect, VisualizerMode};
use ambience::particles::stacking::{Deposit, StackedDeposits};
use ambience::particles::{EffectKind, ParticleSystem};
use ambience::render::broker::GpuContextBroker;
use ambience::render::headless::{GpuEvent, HeadlessBackend};
use ambience::render::FrameInfo;
use common::headless_driver;
use rand::rngs::StdRng;
use rand::SeedableRng;

const TICK: Duration = Duration::from_millis(16);

#[test]
fn outgoing_gpu_mode_is_released_before_the_next_draw() {
    let (mut driver, probe, _) = headless_driver(64, 48);

    driver.set_mode("plasma");
    assert_eq!(driver.tick(TICK), TickOutcome::Rendered);
    driver.set_mode("🌀 Accretion (WebGL)");
    assert_eq!(driver.tick(TICK), TickOutcome::Rendered);

    let events = probe.events();
    let released = events
        .iter()
        .position(|e| matches!(e, GpuEvent::DestroyProgram { label, .. } if label == "plasma"))
        .expect("plasma program released");
    let first_accretion_draw = events
        .iter()
        .position(|e| matches!(e, GpuEvent::Draw { label, .. } if label == "accretion"))
        .expect("accretion drawn");
    assert!(released < first_accretion_draw);
    assert_eq!(driver.broker().live_program_count(), 1);
    assert_eq!(probe.live_programs(), 1);
}

#[test]
fn rain_pool_never_grows() {
    let mut rain = ParticleSystem::new(EffectKind::Rain, StdRng::seed_from_u64(1));
    let features = FeatureVector {
        spectrum: vec![0.7; 64],
        bass: 1.0,
        ..FeatureVector::default()
    };
    for n in 0..10_000u64 {
        let frame = FrameInfo {
            time: n as f32 * 0.016,
            dt: 0.016,
            now_ms: n as f64 * 16.0,
            frame: n,
            ..FrameInfo::default()
        };
        rain.update(&features, &frame, 320, 240);
        assert_eq!(rain.pool().len(), 300);
    }
    assert_eq!(rain.pool().allocations(), 1);
}

#[test]
fn snow_deposit_lives_exactly_its_duration() {
    let snow = EffectKind::Snow.config();
    let duration = snow.stack_duration_ms.expect("snow stacks");
    assert_eq!(duration, 4000.0);

    let t = 10_000.0;
    let mut stack = StackedDeposits::new(duration);
    stack.deposit(Deposit {
        x: 5.0,
        y: 100.0,
        size: 3.0,
        rotation: 0.0,
        color: [255, 255, 255],
        created_ms: t,
    });
    stack.prune(t + 3999.0);
    assert_eq!(stack.len(), 1);
    stack.prune(t + 4001.0);
    assert!(stack.is_empty());
}

#[test]
fn same_size_shared_canvas_is_not_reallocated() {
    let backend = HeadlessBackend::new();
    let probe = backend.probe();
    let mut broker = GpuContextBroker::with_backend(backend);

    assert!(broker.ensure_shared_canvas_size(800, 600));
    let surface = broker.shared_canvas();
    assert!(broker.ensure_shared_canvas_size(800, 600));

    assert_eq!(broker.shared_canvas(), surface);
    assert_eq!(broker.stats().surface_creations, 1);
    assert_eq!(broker.stats().surface_resizes, 0);
    assert_eq!(probe.count(|e| matches!(e, GpuEvent::CreateSurface { .. })), 1);
    assert_eq!(probe.count(|e| matches!(e, GpuEvent::ResizeSurface { .. })), 0);
}

#[test]
fn rain_accretion_round_trips_do_not_leak() {
    let (mut driver, probe, _) = headless_driver(64, 48);

    for _ in 0..2 {
        driver.set_mode("rain");
        driver.tick(TICK);
        driver.set_mode("🌀 Accretion (WebGL)");
        driver.tick(TICK);
        assert!(driver.broker().live_program_count() <= 1);
    }
    driver.set_mode("rain");
    assert_eq!(driver.tick(TICK), TickOutcome::Rendered);

    assert_eq!(driver.broker().live_program_count(), 0);
    assert_eq!(probe.live_programs(), 0);
    // Both renderers were built once; returning to rain reuses its pool
    assert_eq!(driver.visualizers().load_count(), 2);
    assert_eq!(driver.broker().stats().surface_creations, 1);
}

#[test]
fn particle_pool_survives_cleanup() {
    let mut broker = GpuContextBroker::with_backend(HeadlessBackend::new());
    let mut rain = ParticleSystem::new(EffectKind::Rain, StdRng::seed_from_u64(2));
    let frame = FrameInfo {
        dt: 0.016,
        ..FrameInfo::default()
    };
    rain.update(&FeatureVector::default(), &frame, 100, 100);
    ambience::modes::ModeRenderer::cleanup(&mut rain, &mut broker);
    rain.update(&FeatureVector::default(), &frame, 100, 100);
    assert_eq!(rain.pool().allocations(), 1);
}

#[test]
fn unmount_cancels_rendering_and_releases_everything() {
    let (mut driver, probe, backend) = headless_driver(64, 48);
    assert!(driver.capture_mut().start_mic_capture());
    driver.set_mode("fiber");
    assert_eq!(driver.tick(TICK), TickOutcome::Rendered);
    assert_eq!(driver.broker().live_context_count(), 1);

    let stale = driver.liveness().token();
    driver.unmount();
    assert!(!stale.is_live());
    assert_eq!(driver.broker().live_program_count(), 0);
    assert_eq!(driver.broker().live_context_count(), 0);
    assert_eq!(probe.live_surfaces(), 0);
    assert!(backend.is_stopped(0));

    probe.clear_events();
    assert_eq!(driver.tick(TICK), TickOutcome::Stopped);
    assert!(probe.events().is_empty());

    driver.remount();
    assert_eq!(driver.tick(TICK), TickOutcome::Rendered);
}

#[test]
fn shader_output_reaches_the_canvas() {
    let (mut driver, _, _) = headless_driver(40, 30);
    driver.set_visualizer(VisualizerMode::Plasma);
    driver.tick(TICK);
    // Headless draws fill with a flat tint distinct from the background
    assert_eq!(driver.canvas().pixel(20, 15), Some([24, 24, 32, 255]));
}

#[test]
fn performance_mode_halves_gpu_resolution() {
    let (mut driver, _, _) = headless_driver(64, 48);
    driver.set_mode("tunnel");
    driver.set_performance_mode(true);
    driver.tick(TICK);
    assert_eq!(driver.broker().shared_canvas_size(), Some((32, 24)));
    assert!((driver.frame_info().dt - 0.01).abs() < 1e-6);
    assert_eq!(driver.canvas().width(), 64);
}

#[test]
fn effect_layer_draws_over_visualizer() {
    let (mut driver, _, _) = headless_driver(120, 90);
    driver.set_mode("bars");
    driver.set_effect(AmbienceEffect::Fireflies);
    for _ in 0..3 {
        assert_eq!(driver.tick(TICK), TickOutcome::Rendered);
    }
    assert!(driver.effects().is_loaded(VisualizerMode::Fireflies));
    assert!(!driver.visualizers().is_loaded(VisualizerMode::Fireflies));

    driver.set_effect(AmbienceEffect::None);
    driver.tick(TICK);
    assert_eq!(driver.effect(), AmbienceEffect::None);
}

#[test]
fn unknown_mode_key_falls_back_to_bars() {
    let (mut driver, _, _) = headless_driver(32, 32);
    assert_eq!(driver.set_mode("definitely-not-a-mode"), VisualizerMode::Bars);
    assert_eq!(driver.tick(TICK), TickOutcome::Rendered);
    assert!(driver.visualizers().is_loaded(VisualizerMode::Bars));
}

#[test]
fn every_mode_renders_headless() {
    let (mut driver, _, _) = headless_driver(48, 36);
    for mode in VisualizerMode::all() {
        driver.set_visualizer(mode);
        assert_eq!(driver.tick(TICK), TickOutcome::Rendered, "{}", mode.id());
    }
    assert_eq!(driver.visualizers().load_count(), 41);
    assert!(driver.broker().live_program_count() <= 2);
}
