use serde::{Deserialize, Serialize};
use std::ops::Range;

use super::analyser::{lock_analyser, SharedAnalyser};

pub const MIN_FFT_SIZE: usize = 32;
pub const MAX_FFT_SIZE: usize = 32_768;
pub const MAX_SMOOTHING: f32 = 0.99;

/// Width of the spectral smoothing kernel (Savitzky-Golay, quadratic, 5 points)
const KERNEL: [f32; 5] = [-3.0 / 35.0, 12.0 / 35.0, 17.0 / 35.0, 12.0 / 35.0, -3.0 / 35.0];
const SMOOTHING_PASSES: usize = 2;

/// Approximate band edges in Hz
pub const BASS_HZ: (f32, f32) = (20.0, 250.0);
pub const MID_HZ: (f32, f32) = (250.0, 2_000.0);
pub const HIGH_HZ: (f32, f32) = (2_000.0, 16_000.0);

/// Release factors applied when a band falls (attack is instant)
const BASS_RELEASE: f32 = 0.85;
const MID_RELEASE: f32 = 0.8;
const HIGH_RELEASE: f32 = 0.7;

/// User-tunable analyser settings, persisted by the host as JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerConfig {
    pub fft_size: usize,
    pub smoothing_time_constant: f32,
    pub min_decibels: f32,
    pub max_decibels: f32,
    pub freq_start_index: usize,
    pub freq_length: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing_time_constant: 0.8,
            min_decibels: -90.0,
            max_decibels: -10.0,
            freq_start_index: 2,
            freq_length: 128,
        }
    }
}

/// Partial update coming from a settings panel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyzerConfigPatch {
    pub fft_size: Option<usize>,
    pub smoothing_time_constant: Option<f32>,
    pub min_decibels: Option<f32>,
    pub max_decibels: Option<f32>,
    pub freq_start_index: Option<usize>,
    pub freq_length: Option<usize>,
}

impl AnalyzerConfigPatch {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl AnalyzerConfig {
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Merge a patch, clamping out-of-range values instead of rejecting them.
    pub fn apply(&mut self, patch: &AnalyzerConfigPatch) {
        if let Some(size) = patch.fft_size {
            self.fft_size = clamp_fft_size(size);
        }
        if let Some(tau) = patch.smoothing_time_constant {
            self.smoothing_time_constant = if tau.is_finite() {
                tau.clamp(0.0, MAX_SMOOTHING)
            } else {
                self.smoothing_time_constant
            };
        }

        let min_db = patch.min_decibels.unwrap_or(self.min_decibels);
        let max_db = patch.max_decibels.unwrap_or(self.max_decibels);
        if min_db.is_finite() && max_db.is_finite() && min_db < max_db {
            self.min_decibels = min_db;
            self.max_decibels = max_db;
        } else if patch.min_decibels.is_some() || patch.max_decibels.is_some() {
            log::warn!(
                "Ignoring decibel range {}..{} (min must be below max)",
                min_db,
                max_db
            );
        }

        if let Some(start) = patch.freq_start_index {
            self.freq_start_index = start;
        }
        if let Some(len) = patch.freq_length {
            self.freq_length = len;
        }
    }

    /// Bring every field into range the way a patch would. Configs read from
    /// disk go through here since serde fills them without clamping.
    pub fn sanitized(self) -> Self {
        let mut config = AnalyzerConfig::default();
        config.apply(&AnalyzerConfigPatch {
            fft_size: Some(self.fft_size),
            smoothing_time_constant: Some(self.smoothing_time_constant),
            min_decibels: Some(self.min_decibels),
            max_decibels: Some(self.max_decibels),
            freq_start_index: Some(self.freq_start_index),
            freq_length: Some(self.freq_length),
        });
        config
    }

    /// The readable window of bins after clamping to what the analyser has.
    pub fn readable_window(&self, available_bins: usize) -> Range<usize> {
        let start = self.freq_start_index.min(available_bins);
        let end = self.freq_start_index.saturating_add(self.freq_length).min(available_bins);
        start..end
    }
}

pub fn clamp_fft_size(size: usize) -> usize {
    let size = size.clamp(MIN_FFT_SIZE, MAX_FFT_SIZE);
    if size.is_power_of_two() {
        return size;
    }
    let upper = size.next_power_of_two();
    let lower = upper / 2;
    if size - lower < upper - size {
        lower
    } else {
        upper.min(MAX_FFT_SIZE)
    }
}

/// Three-band energy summary, each in 0.0-1.0.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrequencyBands {
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
}

/// Per-frame features handed to every renderer. Buffers are reused between
/// frames, so renderers must not hold on to them across ticks.
#[derive(Clone, Debug, Default)]
pub struct FeatureVector {
    /// Smoothed spectrum, `freq_length` entries in 0.0-1.0
    pub spectrum: Vec<f32>,
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
    /// Mean of `spectrum`
    pub intensity: f32,
    /// 1.0 at a detected onset, decaying towards 0.0
    pub beat_intensity: f32,
}

impl FeatureVector {
    pub fn silent(len: usize) -> Self {
        Self {
            spectrum: vec![0.0; len],
            ..Self::default()
        }
    }

    /// Spectrum value at a fractional position (0.0-1.0), clamped to the
    /// available data. Returns 0.0 for an empty spectrum.
    pub fn sample(&self, t: f32) -> f32 {
        if self.spectrum.is_empty() {
            return 0.0;
        }
        let last = self.spectrum.len() - 1;
        let idx = (t.clamp(0.0, 1.0) * last as f32).round() as usize;
        self.spectrum[idx.min(last)]
    }

    pub fn bands(&self) -> FrequencyBands {
        FrequencyBands {
            bass: self.bass,
            mid: self.mid,
            high: self.high,
        }
    }
}

/// Turns raw analyser bytes into the normalized spectrum and band energies.
pub struct FeatureExtractor {
    config: AnalyzerConfig,
    raw: Vec<u8>,
    sample_rate: u32,
    windowed: Vec<f32>,
    scratch: Vec<f32>,
    band_state: FrequencyBands,
}

impl FeatureExtractor {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self {
            config: config.sanitized(),
            raw: Vec::new(),
            sample_rate: 0,
            windowed: Vec::new(),
            scratch: Vec::new(),
            band_state: FrequencyBands::default(),
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: AnalyzerConfig) {
        self.config = config.sanitized();
    }

    /// Take a fresh byte snapshot from the analyser. With no analyser the
    /// snapshot is cleared and every read returns silence.
    pub fn refresh(&mut self, analyser: Option<&SharedAnalyser>) {
        match analyser {
            Some(analyser) => {
                let mut analyser = lock_analyser(analyser);
                self.sample_rate = analyser.sample_rate();
                analyser.byte_frequency_data(&mut self.raw);
            }
            None => {
                self.raw.clear();
                self.sample_rate = 0;
                self.band_state = FrequencyBands::default();
            }
        }
    }

    pub fn has_signal(&self) -> bool {
        !self.raw.is_empty()
    }

    /// Write the windowed, normalized and smoothed spectrum into `out`.
    /// The output always holds exactly `freq_length` values; bins the
    /// analyser does not have read as zero.
    pub fn normalized_into(&mut self, out: &mut Vec<f32>) {
        let len = self.config.freq_length;
        out.clear();
        out.resize(len, 0.0);
        if self.raw.is_empty() || len == 0 {
            return;
        }

        let window = self.config.readable_window(self.raw.len());
        self.windowed.clear();
        self.windowed.resize(len, 0.0);
        for (dst, &byte) in self.windowed.iter_mut().zip(&self.raw[window]) {
            *dst = byte as f32 / 255.0;
        }

        self.scratch.clear();
        self.scratch.resize(len, 0.0);
        smooth_spectrum(&mut self.windowed, &mut self.scratch);
        out.copy_from_slice(&self.windowed);
    }

    /// Averaged band energies over the full, unwindowed spectrum, each with
    /// its own peak-decay smoothing.
    pub fn bands(&mut self) -> FrequencyBands {
        if self.raw.is_empty() || self.sample_rate == 0 {
            self.band_state = FrequencyBands::default();
            return self.band_state;
        }

        let fft_size = self.raw.len() * 2;
        let average = |range: Range<usize>| -> f32 {
            if range.is_empty() {
                return 0.0;
            }
            let len = range.len() as f32;
            self.raw[range].iter().map(|&b| b as f32 / 255.0).sum::<f32>() / len
        };

        let bass = average(band_bin_range(BASS_HZ, self.sample_rate, fft_size));
        let mid = average(band_bin_range(MID_HZ, self.sample_rate, fft_size));
        let high = average(band_bin_range(HIGH_HZ, self.sample_rate, fft_size));

        self.band_state = FrequencyBands {
            bass: peak_decay(self.band_state.bass, bass, BASS_RELEASE),
            mid: peak_decay(self.band_state.mid, mid, MID_RELEASE),
            high: peak_decay(self.band_state.high, high, HIGH_RELEASE),
        };
        self.band_state
    }
}

/// Map a frequency span onto FFT bins for the live sample rate.
pub fn band_bin_range(band: (f32, f32), sample_rate: u32, fft_size: usize) -> Range<usize> {
    let bins = fft_size / 2;
    if sample_rate == 0 || fft_size == 0 {
        return 0..0;
    }
    let bin_hz = sample_rate as f32 / fft_size as f32;
    let to_bin = |hz: f32| ((hz / bin_hz).round() as usize).min(bins);
    let start = to_bin(band.0);
    let end = to_bin(band.1).max(start);
    start..end
}

fn peak_decay(previous: f32, current: f32, release: f32) -> f32 {
    if current >= previous {
        current
    } else {
        previous * release + current * (1.0 - release)
    }
}

/// Two passes of a symmetric 5-point kernel over `values`. Points within
/// half the kernel width of either edge pass through untouched; results are
/// clamped to 0.0-1.0 because the kernel has negative side lobes.
pub fn smooth_spectrum(values: &mut [f32], scratch: &mut [f32]) {
    let half = KERNEL.len() / 2;
    let len = values.len();
    if len <= half * 2 {
        return;
    }
    debug_assert!(scratch.len() >= len);

    for _ in 0..SMOOTHING_PASSES {
        scratch[..len].copy_from_slice(values);
        for i in half..len - half {
            let mut sum = 0.0;
            for (k, coeff) in KERNEL.iter().enumerate() {
                sum += coeff * scratch[i + k - half];
            }
            values[i] = sum.clamp(0.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fft_size_is_clamped_to_power_of_two() {
        assert_eq!(clamp_fft_size(2048), 2048);
        assert_eq!(clamp_fft_size(3000), 2048);
        assert_eq!(clamp_fft_size(3500), 4096);
        assert_eq!(clamp_fft_size(1), MIN_FFT_SIZE);
        assert_eq!(clamp_fft_size(1_000_000), MAX_FFT_SIZE);
    }

    #[test]
    fn patch_clamps_and_rejects_inverted_decibels() {
        let mut config = AnalyzerConfig::default();
        config.apply(&AnalyzerConfigPatch {
            smoothing_time_constant: Some(1.5),
            min_decibels: Some(-10.0),
            max_decibels: Some(-50.0),
            ..Default::default()
        });
        assert_eq!(config.smoothing_time_constant, MAX_SMOOTHING);
        assert_eq!(config.min_decibels, -90.0);
        assert_eq!(config.max_decibels, -10.0);
    }

    #[test]
    fn patch_parses_camel_case_json() {
        let patch = AnalyzerConfigPatch::from_json(r#"{"fftSize": 4096, "freqLength": 64}"#).unwrap();
        assert_eq!(patch.fft_size, Some(4096));
        assert_eq!(patch.freq_length, Some(64));
        assert_eq!(patch.min_decibels, None);
    }

    #[test]
    fn smoothing_preserves_edges_and_flattens_spikes() {
        let mut values = vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0];
        let mut scratch = vec![0.0; values.len()];
        smooth_spectrum(&mut values, &mut scratch);
        assert_eq!(values[0], 0.0);
        assert_eq!(values[1], 1.0);
        assert_eq!(values[7], 1.0);
        assert_eq!(values[8], 0.0);
        for v in &values[2..7] {
            assert!(*v > 0.0 && *v < 1.0);
        }
    }

    #[test]
    fn smoothing_keeps_constant_signal() {
        let mut values = vec![0.5; 16];
        let mut scratch = vec![0.0; 16];
        smooth_spectrum(&mut values, &mut scratch);
        for v in values {
            assert!((v - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn band_ranges_follow_sample_rate() {
        let at_48k = band_bin_range(BASS_HZ, 48_000, 2048);
        let at_44k = band_bin_range(BASS_HZ, 44_100, 2048);
        assert_eq!(at_48k, 1..11);
        assert_eq!(at_44k, 1..12);

        let mid = band_bin_range(MID_HZ, 48_000, 2048);
        let high = band_bin_range(HIGH_HZ, 48_000, 2048);
        assert_eq!(at_48k.end, mid.start);
        assert_eq!(mid.end, high.start);
        assert!(high.end <= 1024);
    }

    #[test]
    fn readable_window_clamps_to_available_bins() {
        let config = AnalyzerConfig {
            freq_start_index: 10,
            freq_length: 100,
            ..AnalyzerConfig::default()
        };
        assert_eq!(config.readable_window(64), 10..64);
        assert_eq!(config.readable_window(4), 4..4);
    }

    #[test]
    fn bands_decay_instead_of_dropping() {
        assert_eq!(peak_decay(0.2, 0.8, 0.85), 0.8);
        let decayed = peak_decay(0.8, 0.0, 0.85);
        assert!((decayed - 0.68).abs() < 1e-6);
    }
}
