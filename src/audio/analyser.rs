use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::{Arc, Mutex, MutexGuard};

use super::features::AnalyzerConfig;

/// Shared between the capture callback (writer) and the frame loop (reader).
pub type SharedAnalyser = Arc<Mutex<Analyser>>;

pub fn lock_analyser(analyser: &SharedAnalyser) -> MutexGuard<'_, Analyser> {
    analyser.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Frequency-domain analyser with Web Audio `AnalyserNode` semantics.
///
/// Keeps the most recent `fft_size` mono samples, and on every snapshot
/// applies a Blackman window, runs a forward FFT, smooths magnitudes over
/// time and maps them to bytes between `min_decibels` and `max_decibels`.
pub struct Analyser {
    sample_rate: u32,
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    ring: Vec<f32>,
    write_pos: usize,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl Analyser {
    pub fn new(sample_rate: u32, config: &AnalyzerConfig) -> Self {
        let config = config.clone().sanitized();
        let fft_size = config.fft_size;
        let mut planner = FftPlanner::<f32>::new();
        Self {
            sample_rate,
            fft_size,
            smoothing: config.smoothing_time_constant,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            fft: planner.plan_fft_forward(fft_size),
            window: blackman_window(fft_size),
            ring: vec![0.0; fft_size],
            write_pos: 0,
            scratch: vec![Complex::new(0.0, 0.0); fft_size],
            smoothed: vec![0.0; fft_size / 2],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Apply a new configuration in place. A changed `fft_size` replans the
    /// FFT and reallocates every buffer before the next snapshot is taken.
    pub fn apply_config(&mut self, config: &AnalyzerConfig) {
        let config = config.clone().sanitized();
        self.smoothing = config.smoothing_time_constant;
        self.min_decibels = config.min_decibels;
        self.max_decibels = config.max_decibels;

        if config.fft_size != self.fft_size {
            let fft_size = config.fft_size;
            let mut planner = FftPlanner::<f32>::new();
            self.fft = planner.plan_fft_forward(fft_size);
            self.window = blackman_window(fft_size);

            // Keep the newest samples so the spectrum does not drop to silence
            let ordered = self.ordered_samples();
            let mut ring = vec![0.0; fft_size];
            let keep = ordered.len().min(fft_size);
            ring[fft_size - keep..].copy_from_slice(&ordered[ordered.len() - keep..]);

            self.ring = ring;
            self.write_pos = 0;
            self.fft_size = fft_size;
            self.scratch = vec![Complex::new(0.0, 0.0); fft_size];
            self.smoothed = vec![0.0; fft_size / 2];
        }
    }

    /// Push mono samples from the capture callback.
    pub fn push_samples(&mut self, samples: &[f32]) {
        for &sample in samples {
            self.ring[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Push interleaved frames, downmixing to mono.
    pub fn push_interleaved(&mut self, samples: &[f32], channels: usize) {
        if channels <= 1 {
            self.push_samples(samples);
            return;
        }
        self.push_interleaved_as(samples, channels, |s| s);
    }

    /// Push interleaved frames of any sample type, converting in place so
    /// audio callbacks never allocate.
    pub fn push_interleaved_as<T: Copy>(&mut self, samples: &[T], channels: usize, to_f32: impl Fn(T) -> f32) {
        let channels = channels.max(1);
        for frame in samples.chunks(channels) {
            let mono = frame.iter().map(|&s| to_f32(s)).sum::<f32>() / channels as f32;
            self.ring[self.write_pos] = mono;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Fill `out` with one byte per frequency bin (0-255). `out` is resized
    /// to `frequency_bin_count()`.
    pub fn byte_frequency_data(&mut self, out: &mut Vec<u8>) {
        let n = self.fft_size;
        for i in 0..n {
            let sample = self.ring[(self.write_pos + i) % n];
            self.scratch[i] = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let bins = n / 2;
        out.clear();
        out.reserve(bins);

        let range = (self.max_decibels - self.min_decibels).max(f32::EPSILON);
        let scale = 255.0 / range;
        let tau = self.smoothing;

        for k in 0..bins {
            let magnitude = self.scratch[k].norm() / n as f32;
            let smoothed = tau * self.smoothed[k] + (1.0 - tau) * magnitude;
            let smoothed = if smoothed.is_finite() { smoothed } else { 0.0 };
            self.smoothed[k] = smoothed;

            let db = if smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                f32::NEG_INFINITY
            };
            let byte = (scale * (db - self.min_decibels)).floor().clamp(0.0, 255.0);
            out.push(byte as u8);
        }
    }

    fn ordered_samples(&self) -> Vec<f32> {
        let n = self.fft_size;
        (0..n).map(|i| self.ring[(self.write_pos + i) % n]).collect()
    }
}

fn blackman_window(size: usize) -> Vec<f32> {
    let alpha = 0.16f32;
    let a0 = 0.5 * (1.0 - alpha);
    let a1 = 0.5;
    let a2 = 0.5 * alpha;
    let two_pi = 2.0 * std::f32::consts::PI;
    (0..size)
        .map(|i| {
            let x = i as f32 / size as f32;
            a0 - a1 * (two_pi * x).cos() + a2 * (2.0 * two_pi * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn silence_maps_to_zero_bytes() {
        let mut analyser = Analyser::new(48_000, &AnalyzerConfig::default());
        let mut out = Vec::new();
        analyser.byte_frequency_data(&mut out);
        assert_eq!(out.len(), analyser.frequency_bin_count());
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn sine_peaks_at_expected_bin() {
        let config = AnalyzerConfig {
            smoothing_time_constant: 0.0,
            ..AnalyzerConfig::default()
        };
        let mut analyser = Analyser::new(48_000, &config);
        analyser.push_samples(&sine(1_500.0, 48_000, config.fft_size));
        let mut out = Vec::new();
        analyser.byte_frequency_data(&mut out);

        let peak = out
            .iter()
            .enumerate()
            .max_by_key(|(_, &b)| b)
            .map(|(i, _)| i)
            .unwrap();
        let expected = (1_500.0 * config.fft_size as f32 / 48_000.0).round() as usize;
        assert!(peak.abs_diff(expected) <= 1, "peak {} expected {}", peak, expected);
        assert!(out[peak] > 200);
    }

    #[test]
    fn resizing_fft_keeps_recent_samples() {
        let mut analyser = Analyser::new(44_100, &AnalyzerConfig::default());
        analyser.push_samples(&sine(440.0, 44_100, 4096));

        let config = AnalyzerConfig {
            fft_size: 512,
            ..AnalyzerConfig::default()
        };
        analyser.apply_config(&config);
        let mut out = Vec::new();
        analyser.byte_frequency_data(&mut out);
        assert_eq!(out.len(), 256);
        assert!(out.iter().any(|&b| b > 0));
    }

    #[test]
    fn integer_frames_downmix_like_float_frames() {
        let config = AnalyzerConfig {
            fft_size: 32,
            ..AnalyzerConfig::default()
        };
        let mut from_i16 = Analyser::new(48_000, &config);
        let stereo: Vec<i16> = (0..64).map(|i| if i % 2 == 0 { i16::MAX } else { 0 }).collect();
        from_i16.push_interleaved_as(&stereo, 2, |s| s as f32 / i16::MAX as f32);

        let mut from_f32 = Analyser::new(48_000, &config);
        let floats: Vec<f32> = (0..64).map(|i| if i % 2 == 0 { 1.0 } else { 0.0 }).collect();
        from_f32.push_interleaved(&floats, 2);

        assert_eq!(from_i16.ordered_samples(), from_f32.ordered_samples());
        assert!(from_i16.ordered_samples().iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn zero_fft_size_is_clamped_before_allocation() {
        let config = AnalyzerConfig {
            fft_size: 0,
            ..AnalyzerConfig::default()
        };
        let mut analyser = Analyser::new(48_000, &config);
        assert_eq!(analyser.fft_size(), 32);
        analyser.push_samples(&[0.5; 100]);
        analyser.apply_config(&AnalyzerConfig {
            fft_size: 3000,
            ..AnalyzerConfig::default()
        });
        assert_eq!(analyser.fft_size(), 2048);
    }
}
