use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig, SupportedStreamConfig};
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use super::{CaptureBackend, CaptureError, CaptureRequest, EndedSignal, MediaStream, SourceKind};
use crate::audio::analyser::{lock_analyser, SharedAnalyser};
use crate::audio::decode::{decode_audio, AudioData};

/// Real-time capture through the platform audio host.
pub struct LiveBackend {
    host: cpal::Host,
}

impl Default for LiveBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveBackend {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// System output loopback: a PulseAudio/PipeWire monitor source on
    /// Linux, the default output device (WASAPI loopback) on Windows.
    fn find_loopback_device(&self) -> Option<Device> {
        #[cfg(target_os = "windows")]
        {
            self.host.default_output_device()
        }

        #[cfg(not(target_os = "windows"))]
        {
            self.host.input_devices().ok()?.find(|device| {
                device
                    .name()
                    .map(|name| name.to_lowercase().contains("monitor"))
                    .unwrap_or(false)
            })
        }
    }
}

impl CaptureBackend for LiveBackend {
    fn acquire(&mut self, request: &CaptureRequest) -> Result<Box<dyn MediaStream>, CaptureError> {
        match request {
            CaptureRequest::Mic => {
                let device = self
                    .host
                    .default_input_device()
                    .ok_or_else(|| CaptureError::NoDevice("no microphone".into()))?;
                let config = device
                    .default_input_config()
                    .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;
                Ok(Box::new(InputCapture::new(SourceKind::Mic, device, config)))
            }
            CaptureRequest::Tab => {
                let device = self
                    .find_loopback_device()
                    .ok_or(CaptureError::NoAudioTrack)?;
                let config = device
                    .default_input_config()
                    .or_else(|_| device.default_output_config())
                    .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;
                Ok(Box::new(InputCapture::new(SourceKind::Tab, device, config)))
            }
            CaptureRequest::File(path) => {
                let audio = decode_audio(path)?;
                let device = self
                    .host
                    .default_output_device()
                    .ok_or_else(|| CaptureError::NoDevice("no output device".into()))?;
                let config = device
                    .default_output_config()
                    .map_err(|e| CaptureError::Stream(e.to_string()))?;
                Ok(Box::new(FilePlayer::new(path, audio, device, config)))
            }
        }
    }
}

fn build_error(err: cpal::BuildStreamError) -> CaptureError {
    match err {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::NoDevice("device not available".into())
        }
        other => CaptureError::Stream(other.to_string()),
    }
}

/// Microphone or loopback input. Never routed to the output.
struct InputCapture {
    kind: SourceKind,
    device: Device,
    config: SupportedStreamConfig,
    stream: Option<Stream>,
    ended: EndedSignal,
}

impl InputCapture {
    fn new(kind: SourceKind, device: Device, config: SupportedStreamConfig) -> Self {
        Self {
            kind,
            device,
            config,
            stream: None,
            ended: EndedSignal::new(),
        }
    }
}

impl MediaStream for InputCapture {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate().0
    }

    fn ended_signal(&self) -> EndedSignal {
        self.ended.clone()
    }

    fn connect(&mut self, analyser: SharedAnalyser, _audible: bool) -> Result<(), CaptureError> {
        let channels = self.config.channels() as usize;
        let stream_config: StreamConfig = self.config.clone().into();
        let ended = self.ended.clone();
        let err_fn = move |err: cpal::StreamError| {
            log::warn!("Input stream error: {}", err);
            ended.fire();
        };

        let stream = match self.config.sample_format() {
            SampleFormat::F32 => self.device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    lock_analyser(&analyser).push_interleaved(data, channels);
                },
                err_fn,
                None,
            ),
            SampleFormat::I16 => self.device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    lock_analyser(&analyser).push_interleaved_as(data, channels, |s| s as f32 / i16::MAX as f32);
                },
                err_fn,
                None,
            ),
            SampleFormat::U16 => self.device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    lock_analyser(&analyser)
                        .push_interleaved_as(data, channels, |s| (s as f32 - 32_768.0) / 32_768.0);
                },
                err_fn,
                None,
            ),
            other => {
                return Err(CaptureError::Stream(format!(
                    "unsupported sample format {:?}",
                    other
                )))
            }
        }
        .map_err(build_error)?;

        stream
            .play()
            .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
    }
}

/// Decoded file played through the default output while feeding the
/// analyser with exactly what is being heard.
struct FilePlayer {
    name: String,
    audio: Arc<AudioData>,
    device: Device,
    config: SupportedStreamConfig,
    stream: Option<Stream>,
    ended: EndedSignal,
}

impl FilePlayer {
    fn new(path: &Path, audio: AudioData, device: Device, config: SupportedStreamConfig) -> Self {
        Self {
            name: path.display().to_string(),
            audio: Arc::new(audio),
            device,
            config,
            stream: None,
            ended: EndedSignal::new(),
        }
    }
}

impl MediaStream for FilePlayer {
    fn kind(&self) -> SourceKind {
        SourceKind::File
    }

    fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    fn ended_signal(&self) -> EndedSignal {
        self.ended.clone()
    }

    fn connect(&mut self, analyser: SharedAnalyser, audible: bool) -> Result<(), CaptureError> {
        if self.config.sample_format() != SampleFormat::F32 {
            return Err(CaptureError::Stream(format!(
                "output sample format {:?} not supported for playback",
                self.config.sample_format()
            )));
        }

        let channels = self.config.channels() as usize;
        let stream_config: StreamConfig = self.config.clone().into();
        // Nearest-sample stepping when the device rate differs from the file
        let step = self.audio.sample_rate as f64 / stream_config.sample_rate.0 as f64;
        let audio = self.audio.clone();
        let playback_ended = self.ended.clone();
        let ended = self.ended.clone();
        let mut cursor = 0.0f64;

        let stream = self
            .device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let start = cursor;
                    for frame in data.chunks_mut(channels) {
                        let sample = audio.samples.get(cursor as usize).copied().unwrap_or(0.0);
                        let out = if audible { sample } else { 0.0 };
                        frame.iter_mut().for_each(|s| *s = out);
                        cursor += step;
                    }
                    let heard = heard_range(start, cursor, audio.samples.len());
                    if !heard.is_empty() {
                        lock_analyser(&analyser).push_samples(&audio.samples[heard]);
                    }
                    if cursor as usize >= audio.samples.len() {
                        playback_ended.fire();
                    }
                },
                move |err| {
                    log::warn!("Playback stream error: {}", err);
                    ended.fire();
                },
                None,
            )
            .map_err(build_error)?;

        stream
            .play()
            .map_err(|e| CaptureError::Stream(e.to_string()))?;
        log::debug!("Playing {} ({}Hz)", self.name, self.audio.sample_rate);
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
    }
}

/// Samples played between two cursor positions. The cursor only moves
/// forward, so a callback always hears one contiguous slice of the file.
fn heard_range(start: f64, end: f64, len: usize) -> Range<usize> {
    let first = (start as usize).min(len);
    let last = (end as usize).min(len).max(first);
    first..last
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heard_range_covers_the_played_span() {
        assert_eq!(heard_range(0.0, 512.0, 10_000), 0..512);
        // Device faster than the file: fractional steps
        assert_eq!(heard_range(100.5, 356.25, 10_000), 100..356);
    }

    #[test]
    fn heard_range_stops_at_end_of_file() {
        assert_eq!(heard_range(9_900.0, 10_412.0, 10_000), 9_900..10_000);
        assert!(heard_range(10_400.0, 10_900.0, 10_000).is_empty());
    }
}
