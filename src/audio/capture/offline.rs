use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use super::{CaptureBackend, CaptureError, CaptureRequest, EndedSignal, MediaStream, SourceKind};
use crate::audio::analyser::{lock_analyser, SharedAnalyser};
use crate::audio::decode::{decode_audio, AudioData};

/// Backend for offline rendering: files are decoded up front and fed to the
/// analyser from the frame clock. Live sources are unavailable.
#[derive(Default)]
pub struct OfflineBackend {
    preloaded: HashMap<PathBuf, Arc<AudioData>>,
}

impl OfflineBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `path` from already decoded audio instead of reading the file.
    pub fn preload(&mut self, path: impl Into<PathBuf>, audio: AudioData) {
        self.preloaded.insert(path.into(), Arc::new(audio));
    }
}

impl CaptureBackend for OfflineBackend {
    fn acquire(&mut self, request: &CaptureRequest) -> Result<Box<dyn MediaStream>, CaptureError> {
        match request {
            CaptureRequest::Tab => Err(CaptureError::Unsupported("tab")),
            CaptureRequest::Mic => Err(CaptureError::Unsupported("mic")),
            CaptureRequest::File(path) => {
                let audio = match self.preloaded.get(path) {
                    Some(audio) => audio.clone(),
                    None => Arc::new(decode_audio(path)?),
                };
                if audio.sample_rate == 0 {
                    return Err(CaptureError::Decode(format!(
                        "zero sample rate: {}",
                        path.display()
                    )));
                }
                Ok(Box::new(ClockedPlayback::new(audio)))
            }
        }
    }
}

/// File playback advanced by the caller's clock rather than a device.
pub struct ClockedPlayback {
    audio: Arc<AudioData>,
    position: usize,
    carry: f64,
    analyser: Option<SharedAnalyser>,
    ended: EndedSignal,
}

impl ClockedPlayback {
    pub fn new(audio: Arc<AudioData>) -> Self {
        Self {
            audio,
            position: 0,
            carry: 0.0,
            analyser: None,
            ended: EndedSignal::new(),
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl MediaStream for ClockedPlayback {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    fn ended_signal(&self) -> EndedSignal {
        self.ended.clone()
    }

    fn connect(&mut self, analyser: SharedAnalyser, _audible: bool) -> Result<(), CaptureError> {
        self.analyser = Some(analyser);
        Ok(())
    }

    fn advance(&mut self, dt: f32) {
        let Some(analyser) = self.analyser.as_ref() else {
            return;
        };
        if self.ended.is_fired() {
            return;
        }

        let exact = dt.max(0.0) as f64 * self.audio.sample_rate as f64 + self.carry;
        let count = exact.floor() as usize;
        self.carry = exact - count as f64;

        let end = (self.position + count).min(self.audio.samples.len());
        lock_analyser(analyser).push_samples(&self.audio.samples[self.position..end]);
        self.position = end;

        if self.position >= self.audio.samples.len() {
            self.ended.fire();
        }
    }

    fn stop(&mut self) {
        self.analyser = None;
    }
}
