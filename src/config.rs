use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::audio::features::AnalyzerConfig;
use crate::modes::AmbienceEffect;

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub visualizer: VisualizerConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
pub struct VisualizerConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub effect: AmbienceEffect,
    #[serde(default)]
    pub performance_mode: bool,
}

#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_codec")]
    pub codec: String,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            effect: AmbienceEffect::None,
            performance_mode: false,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
            crf: default_crf(),
            codec: default_codec(),
        }
    }
}

pub fn default_mode() -> String { "bars".into() }
pub fn default_width() -> u32 { 1280 }
pub fn default_height() -> u32 { 720 }
pub fn default_fps() -> u32 { 30 }
pub fn default_crf() -> u32 { 18 }
pub fn default_codec() -> String { "libx264".into() }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str::<Config>(&content) {
        Ok(mut config) => {
            config.analyzer = config.analyzer.sanitized();
            Some(config)
        }
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

/// Explicit path, else `ambience.toml` in the working directory, else
/// `~/.config/ambience/config.toml`, else the platform config directory.
pub fn find_config(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("ambience.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("ambience").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("ambience").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.analyzer, AnalyzerConfig::default());
        assert_eq!(config.visualizer.mode, "bars");
        assert_eq!(config.visualizer.effect, AmbienceEffect::None);
        assert_eq!(config.output.fps, 30);
    }

    #[test]
    fn sections_parse_with_host_field_names() {
        let config: Config = toml::from_str(
            r#"
            [analyzer]
            fftSize = 4096
            freqLength = 64

            [visualizer]
            mode = "🌀 Accretion (WebGL)"
            effect = "cherry-blossom"
            performance_mode = true

            [output]
            width = 640
            "#,
        )
        .unwrap();
        assert_eq!(config.analyzer.fft_size, 4096);
        assert_eq!(config.analyzer.freq_length, 64);
        assert_eq!(config.analyzer.min_decibels, -90.0);
        assert_eq!(config.visualizer.effect, AmbienceEffect::CherryBlossom);
        assert!(config.visualizer.performance_mode);
        assert_eq!(config.output.width, 640);
        assert_eq!(config.output.height, 720);
    }

    fn load_str(name: &str, content: &str) -> Option<Config> {
        let path = std::env::temp_dir().join(format!("ambience-{}-{}.toml", name, std::process::id()));
        std::fs::write(&path, content).unwrap();
        let config = load_config(&path);
        std::fs::remove_file(&path).unwrap();
        config
    }

    #[test]
    fn out_of_range_analyzer_values_are_clamped_on_load() {
        let zero = load_str("fft-zero", "[analyzer]\nfftSize = 0\nsmoothingTimeConstant = 5.0\n").unwrap();
        assert_eq!(zero.analyzer.fft_size, 32);
        assert_eq!(zero.analyzer.smoothing_time_constant, 0.99);

        let odd = load_str("fft-odd", "[analyzer]\nfftSize = 3000\n").unwrap();
        assert!(odd.analyzer.fft_size.is_power_of_two());
        assert_eq!(odd.analyzer.fft_size, 2048);

        let huge = load_str("fft-huge", "[analyzer]\nfftSize = 100000\n").unwrap();
        assert_eq!(huge.analyzer.fft_size, 32_768);
    }

    #[test]
    fn inverted_decibels_fall_back_to_defaults_on_load() {
        let config = load_str("db", "[analyzer]\nminDecibels = -5.0\nmaxDecibels = -50.0\n").unwrap();
        assert_eq!(config.analyzer.min_decibels, -90.0);
        assert_eq!(config.analyzer.max_decibels, -10.0);
    }

    #[test]
    fn explicit_path_wins() {
        let path = Path::new("/tmp/custom.toml");
        assert_eq!(find_config(Some(path)), Some(path.to_path_buf()));
    }
}
