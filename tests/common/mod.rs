#![allow(dead_code)]

use std::cell::RefCell;
use std::f32::consts::TAU;
use std::rc::Rc;

use ambience::audio::analyser::{lock_analyser, SharedAnalyser};
use ambience::audio::capture::{
    CaptureBackend, CaptureError, CaptureManager, CaptureRequest, EndedSignal, MediaStream, SourceKind,
};
use ambience::audio::features::AnalyzerConfig;
use ambience::driver::{DriverOptions, FrameDriver};
use ambience::render::broker::GpuContextBroker;
use ambience::render::headless::{HeadlessBackend, HeadlessProbe};

pub const SAMPLE_RATE: u32 = 48_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Failure {
    Denied,
    NoTrack,
    ConnectFails,
}

#[derive(Default)]
struct Script {
    next_failure: Option<Failure>,
    streams: Vec<StreamRecord>,
}

struct StreamRecord {
    kind: SourceKind,
    stopped: Rc<RefCell<bool>>,
    ended: EndedSignal,
}

/// Capture backend whose streams play a loud bass tone and whose failures
/// are scripted per call.
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    script: Rc<RefCell<Script>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next(&self, failure: Failure) {
        self.script.borrow_mut().next_failure = Some(failure);
    }

    pub fn acquired(&self) -> usize {
        self.script.borrow().streams.len()
    }

    pub fn stream_kind(&self, index: usize) -> SourceKind {
        self.script.borrow().streams[index].kind
    }

    pub fn is_stopped(&self, index: usize) -> bool {
        *self.script.borrow().streams[index].stopped.borrow()
    }

    /// Simulate the user revoking the device from outside the app.
    pub fn end_stream(&self, index: usize) {
        self.script.borrow().streams[index].ended.fire();
    }
}

impl CaptureBackend for ScriptedBackend {
    fn acquire(&mut self, request: &CaptureRequest) -> Result<Box<dyn MediaStream>, CaptureError> {
        let failure = self.script.borrow_mut().next_failure.take();
        match failure {
            Some(Failure::Denied) => return Err(CaptureError::PermissionDenied("denied by test".into())),
            Some(Failure::NoTrack) => return Err(CaptureError::NoAudioTrack),
            _ => {}
        }
        let stopped = Rc::new(RefCell::new(false));
        let ended = EndedSignal::new();
        self.script.borrow_mut().streams.push(StreamRecord {
            kind: request.kind(),
            stopped: stopped.clone(),
            ended: ended.clone(),
        });
        Ok(Box::new(ToneStream {
            kind: request.kind(),
            stopped,
            ended,
            analyser: None,
            phase: 0.0,
            fail_connect: failure == Some(Failure::ConnectFails),
        }))
    }
}

struct ToneStream {
    kind: SourceKind,
    stopped: Rc<RefCell<bool>>,
    ended: EndedSignal,
    analyser: Option<SharedAnalyser>,
    phase: f32,
    fail_connect: bool,
}

impl MediaStream for ToneStream {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn ended_signal(&self) -> EndedSignal {
        self.ended.clone()
    }

    fn connect(&mut self, analyser: SharedAnalyser, _audible: bool) -> Result<(), CaptureError> {
        if self.fail_connect {
            return Err(CaptureError::Stream("connect failed".into()));
        }
        self.analyser = Some(analyser);
        Ok(())
    }

    fn advance(&mut self, dt: f32) {
        let Some(analyser) = &self.analyser else {
            return;
        };
        let count = (dt * SAMPLE_RATE as f32) as usize;
        let step = 100.0 * TAU / SAMPLE_RATE as f32;
        let samples: Vec<f32> = (0..count)
            .map(|_| {
                self.phase = (self.phase + step) % TAU;
                0.8 * self.phase.sin()
            })
            .collect();
        lock_analyser(analyser).push_samples(&samples);
    }

    fn stop(&mut self) {
        *self.stopped.borrow_mut() = true;
        self.analyser = None;
    }
}

pub fn manager(backend: &ScriptedBackend) -> CaptureManager {
    CaptureManager::new(Box::new(backend.clone()), AnalyzerConfig::default())
}

/// Driver over a silent capture manager and a headless GPU.
pub fn headless_driver(width: u32, height: u32) -> (FrameDriver, HeadlessProbe, ScriptedBackend) {
    let capture_backend = ScriptedBackend::new();
    let gpu = HeadlessBackend::new();
    let probe = gpu.probe();
    let driver = FrameDriver::new(
        manager(&capture_backend),
        GpuContextBroker::with_backend(gpu),
        DriverOptions {
            width,
            height,
            seed: Some(7),
            ..DriverOptions::default()
        },
    );
    (driver, probe, capture_backend)
}
