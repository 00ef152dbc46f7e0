use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "ambience", about = "Audio-reactive ambience visualizer recorder")]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG). Omit with --source mic or tab.
    pub input: Option<PathBuf>,

    /// Output video file
    #[arg(short, long, default_value = "output.mp4")]
    pub output: PathBuf,

    /// Config file (defaults to ambience.toml or the user config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Capture source: file, mic or tab (system output)
    #[arg(long, default_value = "file")]
    pub source: String,

    /// Visualizer mode, by id or display name
    #[arg(short, long, default_value = "bars")]
    pub mode: String,

    /// Ambience particle layer drawn over the visualizer
    #[arg(short, long, default_value = "none")]
    pub effect: String,

    /// Half-resolution shaders and a slower visual clock
    #[arg(long)]
    pub performance: bool,

    /// Analyzer settings as a JSON patch, e.g. '{"fftSize":4096}'
    #[arg(long)]
    pub analyzer: Option<String>,

    /// Video width in pixels
    #[arg(long, default_value_t = 1280)]
    pub width: u32,

    /// Video height in pixels
    #[arg(long, default_value_t = 720)]
    pub height: u32,

    /// Frames per second
    #[arg(long, default_value_t = 30)]
    pub fps: u32,

    /// Seconds to record; defaults to the file length, required for live sources
    #[arg(short, long)]
    pub duration: Option<f32>,

    /// Seed for particle effects
    #[arg(long)]
    pub seed: Option<u64>,

    /// Render GPU modes with the headless backend instead of a real adapter
    #[arg(long)]
    pub no_gpu: bool,

    /// H.264 CRF quality (0-51, lower = better). Ignored when --bitrate is set.
    #[arg(long, default_value_t = 18)]
    pub crf: u32,

    /// Video bitrate (e.g. 2400k, 5M). When set, uses -b:v instead of -crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// List available visualizer modes and exit
    #[arg(long)]
    pub list_modes: bool,

    /// FFmpeg video codec
    #[arg(long, default_value = "libx264")]
    pub codec: String,

    /// FFmpeg pixel format
    #[arg(long, default_value = "yuv420p")]
    pub pix_fmt: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse() {
        let cli = Cli::parse_from(["ambience", "song.mp3"]);
        assert_eq!(cli.mode, "bars");
        assert_eq!(cli.effect, "none");
        assert_eq!(cli.source, "file");
        assert_eq!(cli.width, 1280);
        assert!(!cli.no_gpu);
    }

    #[test]
    fn live_source_needs_no_input() {
        let cli = Cli::parse_from(["ambience", "--source", "mic", "-d", "5", "-m", "plasma"]);
        assert!(cli.input.is_none());
        assert_eq!(cli.duration, Some(5.0));
        assert_eq!(cli.mode, "plasma");
    }
}
