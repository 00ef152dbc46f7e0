//! Capture source management.
//!
//! Exactly one media stream feeds the analyser at a time. Every `start_*`
//! call tears the previous source down first, and a failed start leaves the
//! manager exactly as clean as a stopped one.

#[cfg(feature = "live-capture")]
pub mod live;
pub mod offline;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::analyser::{lock_analyser, Analyser, SharedAnalyser};
use super::features::{
    AnalyzerConfig, AnalyzerConfigPatch, FeatureExtractor, FeatureVector, FrequencyBands,
};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("the selected source has no audio track")]
    NoAudioTrack,
    #[error("no capture device available: {0}")]
    NoDevice(String),
    #[error("failed to decode audio: {0}")]
    Decode(String),
    #[error("{0} capture is not supported by this backend")]
    Unsupported(&'static str),
    #[error("audio stream error: {0}")]
    Stream(String),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    None,
    Tab,
    Mic,
    File,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::None => "none",
            SourceKind::Tab => "tab",
            SourceKind::Mic => "mic",
            SourceKind::File => "file",
        }
    }
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureRequest {
    Tab,
    Mic,
    File(PathBuf),
}

impl CaptureRequest {
    pub fn kind(&self) -> SourceKind {
        match self {
            CaptureRequest::Tab => SourceKind::Tab,
            CaptureRequest::Mic => SourceKind::Mic,
            CaptureRequest::File(_) => SourceKind::File,
        }
    }

    /// Only file playback is routed to the output; captured system audio or
    /// microphone input would feed back.
    pub fn is_audible(&self) -> bool {
        matches!(self, CaptureRequest::File(_))
    }
}

/// Set when a stream ends on its own: the user revoked the device, the
/// playback finished or the driver reported an error.
#[derive(Clone, Debug, Default)]
pub struct EndedSignal(Arc<AtomicBool>);

impl EndedSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_fired(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// One acquired audio input.
pub trait MediaStream {
    fn kind(&self) -> SourceKind;

    fn sample_rate(&self) -> u32;

    fn ended_signal(&self) -> EndedSignal;

    /// Start delivering samples into `analyser`, and to the output device
    /// when `audible` is set.
    fn connect(&mut self, analyser: SharedAnalyser, audible: bool) -> Result<(), CaptureError>;

    /// Advance clock-driven sources by `dt` seconds. Real-time sources are
    /// driven by their device and ignore this.
    fn advance(&mut self, _dt: f32) {}

    /// Stop every track and detach from the analyser. Must be idempotent.
    fn stop(&mut self);
}

/// Acquires streams for capture requests.
pub trait CaptureBackend {
    fn acquire(&mut self, request: &CaptureRequest) -> Result<Box<dyn MediaStream>, CaptureError>;
}

/// Owns the analyser for one started source; closed when the source stops.
pub struct AudioContext {
    sample_rate: u32,
    analyser: SharedAnalyser,
    closed: bool,
}

impl AudioContext {
    fn new(sample_rate: u32, config: &AnalyzerConfig) -> Self {
        Self {
            sample_rate,
            analyser: Arc::new(Mutex::new(Analyser::new(sample_rate, config))),
            closed: false,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

struct ActiveCapture {
    kind: SourceKind,
    stream: Box<dyn MediaStream>,
    context: AudioContext,
    ended: EndedSignal,
}

pub struct CaptureManager {
    backend: Box<dyn CaptureBackend>,
    active: Option<ActiveCapture>,
    extractor: FeatureExtractor,
    contexts_opened: usize,
    contexts_closed: usize,
}

impl CaptureManager {
    pub fn new(backend: Box<dyn CaptureBackend>, config: AnalyzerConfig) -> Self {
        Self {
            backend,
            active: None,
            extractor: FeatureExtractor::new(config.sanitized()),
            contexts_opened: 0,
            contexts_closed: 0,
        }
    }

    pub fn start_tab_capture(&mut self) -> bool {
        self.start(CaptureRequest::Tab)
    }

    pub fn start_mic_capture(&mut self) -> bool {
        self.start(CaptureRequest::Mic)
    }

    pub fn start_file_capture(&mut self, path: &Path) -> bool {
        self.start(CaptureRequest::File(path.to_path_buf()))
    }

    fn start(&mut self, request: CaptureRequest) -> bool {
        match self.try_start(request.clone()) {
            Ok(()) => true,
            Err(err) => {
                log::warn!("Could not start {} capture: {}", request.kind(), err);
                false
            }
        }
    }

    /// Start a source, returning the typed failure cause.
    pub fn try_start(&mut self, request: CaptureRequest) -> Result<(), CaptureError> {
        self.stop_audio_capture();

        let mut stream = self.backend.acquire(&request)?;
        let mut context = AudioContext::new(stream.sample_rate(), self.extractor.config());
        self.contexts_opened += 1;

        if let Err(err) = stream.connect(context.analyser.clone(), request.is_audible()) {
            stream.stop();
            context.close();
            self.contexts_closed += 1;
            return Err(err);
        }

        let ended = stream.ended_signal();
        log::info!(
            "Started {} capture at {}Hz",
            request.kind(),
            context.sample_rate()
        );
        self.active = Some(ActiveCapture {
            kind: request.kind(),
            stream,
            context,
            ended,
        });
        Ok(())
    }

    /// Tear down the active source, if any. Safe to call repeatedly.
    pub fn stop_audio_capture(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.stream.stop();
            active.context.close();
            self.contexts_closed += 1;
            log::info!("Stopped {} capture", active.kind);
        }
        self.extractor.refresh(None);
    }

    pub fn is_audio_capture_active(&self) -> bool {
        self.active
            .as_ref()
            .map_or(false, |active| !active.ended.is_fired())
    }

    pub fn audio_source_type(&self) -> SourceKind {
        if self.is_audio_capture_active() {
            self.active.as_ref().map_or(SourceKind::None, |a| a.kind)
        } else {
            SourceKind::None
        }
    }

    /// Run the teardown for streams that ended on their own. Called once per
    /// tick by the frame driver.
    pub fn poll(&mut self) {
        let ended = self
            .active
            .as_ref()
            .map_or(false, |active| active.ended.is_fired());
        if ended {
            log::info!("Capture source ended");
            self.stop_audio_capture();
        }
    }

    /// Advance clock-driven sources (file playback in offline mode).
    pub fn advance(&mut self, dt: f32) {
        if let Some(active) = self.active.as_mut() {
            active.stream.advance(dt);
        }
    }

    /// Number of audio contexts created and not yet closed.
    pub fn live_audio_contexts(&self) -> usize {
        self.contexts_opened - self.contexts_closed
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.active.as_ref().map(|a| a.context.sample_rate())
    }

    pub fn analyzer_config(&self) -> &AnalyzerConfig {
        self.extractor.config()
    }

    pub fn default_analyzer_config() -> AnalyzerConfig {
        AnalyzerConfig::default()
    }

    /// Merge `patch` into the configuration and apply it to the live
    /// analyser. The analyser lock makes the buffer swap atomic for readers.
    pub fn update_analyzer_config(&mut self, patch: &AnalyzerConfigPatch) -> AnalyzerConfig {
        let mut config = self.extractor.config().clone();
        config.apply(patch);
        if let Some(active) = self.active.as_ref() {
            lock_analyser(&active.context.analyser).apply_config(&config);
        }
        log::debug!("Analyzer config now {:?}", config);
        self.extractor.set_config(config.clone());
        config
    }

    fn live_analyser(&self) -> Option<SharedAnalyser> {
        self.active
            .as_ref()
            .filter(|active| !active.ended.is_fired())
            .map(|active| active.context.analyser.clone())
    }

    pub fn normalized_frequency_data(&mut self) -> Vec<f32> {
        let analyser = self.live_analyser();
        self.extractor.refresh(analyser.as_ref());
        let mut out = Vec::new();
        self.extractor.normalized_into(&mut out);
        out
    }

    pub fn frequency_bands(&mut self) -> FrequencyBands {
        let analyser = self.live_analyser();
        self.extractor.refresh(analyser.as_ref());
        self.extractor.bands()
    }

    /// Fill `features` from a single analyser snapshot. `beat_intensity` is
    /// left for the caller.
    pub fn extract(&mut self, features: &mut FeatureVector) {
        let analyser = self.live_analyser();
        self.extractor.refresh(analyser.as_ref());
        self.extractor.normalized_into(&mut features.spectrum);
        let bands = self.extractor.bands();
        features.bass = bands.bass;
        features.mid = bands.mid;
        features.high = bands.high;
        features.intensity = if features.spectrum.is_empty() {
            0.0
        } else {
            features.spectrum.iter().sum::<f32>() / features.spectrum.len() as f32
        };
    }
}

impl Drop for CaptureManager {
    fn drop(&mut self) {
        self.stop_audio_capture();
    }
}
