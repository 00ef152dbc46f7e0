pub mod fiber;
pub mod registry;
pub mod shader;
pub mod spectrum;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::audio::features::FeatureVector;
use crate::driver::RenderToken;
use crate::particles::{EffectKind, ParticleSystem};
use crate::render::backend::GpuError;
use crate::render::broker::GpuContextBroker;
use crate::render::canvas::Canvas2d;
use crate::render::FrameInfo;

use fiber::FiberMode;
use shader::ShaderMode;
use spectrum::{SpectrumMode, SpectrumStyle};

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Gpu(#[from] GpuError),
    /// The driver was torn down while this render was in flight.
    #[error("render cancelled")]
    Cancelled,
}

/// Everything a renderer may touch during one tick.
pub struct RenderContext<'a> {
    pub features: &'a FeatureVector,
    pub frame: &'a FrameInfo,
    pub canvas: &'a mut Canvas2d,
    pub broker: &'a mut GpuContextBroker,
    pub token: &'a RenderToken,
}

/// A loaded visual mode. Implementations own all of their per-mode state.
pub trait ModeRenderer {
    fn render(&mut self, ctx: &mut RenderContext<'_>) -> Result<(), RenderError>;

    /// Release GPU resources held for this mode. CPU-side state survives so
    /// that returning to the mode does not rebuild it.
    fn cleanup(&mut self, broker: &mut GpuContextBroker);
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum VisualizerMode {
    #[default]
    Bars,
    MirrorBars,
    CircularSpectrum,
    LineSpectrum,
    Dots,
    RadialBurst,
    PulseRings,
    Mountains,
    LedMeter,
    Orbit,
    Rain,
    HeavyRain,
    Snow,
    Leaves,
    CherryBlossom,
    Fireflies,
    CloudShadows,
    Accretion,
    BlackHole,
    Cube,
    FractalPyramid,
    HoloDice,
    Plasma,
    Tunnel,
    Kaleidoscope,
    Aurora,
    Nebula,
    Warp,
    Ocean,
    LavaLamp,
    Voronoi,
    Ripples,
    Corona,
    Synthwave,
    HexPulse,
    Galaxy,
    Electric,
    Rings,
    Flower,
    WaveformGlow,
    Fiber,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModeKind {
    Spectrum,
    Particle,
    Shader,
    MultiPass,
}

/// (mode, display name, stable id)
const CATALOG: &[(VisualizerMode, &str, &str)] = &[
    (VisualizerMode::Bars, "📊 Bars", "bars"),
    (VisualizerMode::MirrorBars, "🪞 Mirror Bars", "mirror-bars"),
    (VisualizerMode::CircularSpectrum, "⭕ Circular Spectrum", "circular-spectrum"),
    (VisualizerMode::LineSpectrum, "〰️ Line Spectrum", "line-spectrum"),
    (VisualizerMode::Dots, "⚪ Dots", "dots"),
    (VisualizerMode::RadialBurst, "💥 Radial Burst", "radial-burst"),
    (VisualizerMode::PulseRings, "🔘 Pulse Rings", "pulse-rings"),
    (VisualizerMode::Mountains, "⛰️ Mountains", "mountains"),
    (VisualizerMode::LedMeter, "🎚️ LED Meter", "led-meter"),
    (VisualizerMode::Orbit, "🪐 Orbit", "orbit"),
    (VisualizerMode::Rain, "🌧️ Rain", "rain"),
    (VisualizerMode::HeavyRain, "⛈️ Heavy Rain", "heavy-rain"),
    (VisualizerMode::Snow, "❄️ Snow", "snow"),
    (VisualizerMode::Leaves, "🍂 Leaves", "leaves"),
    (VisualizerMode::CherryBlossom, "🌸 Cherry Blossom", "cherry-blossom"),
    (VisualizerMode::Fireflies, "✨ Fireflies", "fireflies"),
    (VisualizerMode::CloudShadows, "☁️ Cloud Shadows", "cloud-shadows"),
    (VisualizerMode::Accretion, "🌀 Accretion (WebGL)", "accretion"),
    (VisualizerMode::BlackHole, "🕳️ Black Hole (WebGL)", "black-hole"),
    (VisualizerMode::Cube, "🧊 Cube (WebGL)", "cube"),
    (VisualizerMode::FractalPyramid, "🔺 Fractal Pyramid (WebGL)", "fractal-pyramid"),
    (VisualizerMode::HoloDice, "🎲 Holo Dice (WebGL)", "holo-dice"),
    (VisualizerMode::Plasma, "🟣 Plasma (WebGL)", "plasma"),
    (VisualizerMode::Tunnel, "🚇 Tunnel (WebGL)", "tunnel"),
    (VisualizerMode::Kaleidoscope, "🔮 Kaleidoscope (WebGL)", "kaleidoscope"),
    (VisualizerMode::Aurora, "🌌 Aurora (WebGL)", "aurora"),
    (VisualizerMode::Nebula, "☄️ Nebula (WebGL)", "nebula"),
    (VisualizerMode::Warp, "🚀 Warp (WebGL)", "warp"),
    (VisualizerMode::Ocean, "🌊 Ocean (WebGL)", "ocean"),
    (VisualizerMode::LavaLamp, "🫧 Lava Lamp (WebGL)", "lava-lamp"),
    (VisualizerMode::Voronoi, "🔷 Voronoi (WebGL)", "voronoi"),
    (VisualizerMode::Ripples, "💧 Ripples (WebGL)", "ripples"),
    (VisualizerMode::Corona, "☀️ Corona (WebGL)", "corona"),
    (VisualizerMode::Synthwave, "🌆 Synthwave (WebGL)", "synthwave"),
    (VisualizerMode::HexPulse, "⬡ Hex Pulse (WebGL)", "hex-pulse"),
    (VisualizerMode::Galaxy, "🌠 Galaxy (WebGL)", "galaxy"),
    (VisualizerMode::Electric, "⚡ Electric (WebGL)", "electric"),
    (VisualizerMode::Rings, "💍 Rings (WebGL)", "rings"),
    (VisualizerMode::Flower, "🌺 Flower (WebGL)", "flower"),
    (VisualizerMode::WaveformGlow, "🎵 Waveform Glow (WebGL)", "waveform-glow"),
    (VisualizerMode::Fiber, "🧵 Fiber (WebGL)", "fiber"),
];

impl VisualizerMode {
    pub fn all() -> impl Iterator<Item = VisualizerMode> {
        CATALOG.iter().map(|(mode, _, _)| *mode)
    }

    fn entry(self) -> &'static (VisualizerMode, &'static str, &'static str) {
        // Every variant has a catalog row; the fallback row is never hit.
        CATALOG
            .iter()
            .find(|(mode, _, _)| *mode == self)
            .unwrap_or(&CATALOG[0])
    }

    pub fn display_name(self) -> &'static str {
        self.entry().1
    }

    /// Stable identifier, also used as the GPU program cache key.
    pub fn id(self) -> &'static str {
        self.entry().2
    }

    /// Resolve a display name or id. Emoji prefixes, the `(WebGL)` suffix,
    /// case, spaces and underscores are ignored.
    pub fn from_key(key: &str) -> Option<Self> {
        let wanted = normalize_key(key);
        if wanted.is_empty() {
            return None;
        }
        CATALOG
            .iter()
            .find(|(_, _, id)| *id == wanted)
            .map(|(mode, _, _)| *mode)
    }

    /// Like `from_key`, falling back to the default mode for unknown keys.
    pub fn from_key_or_default(key: &str) -> Self {
        Self::from_key(key).unwrap_or_else(|| {
            log::warn!("Unknown visualizer mode {:?}, using {}", key, Self::default().id());
            Self::default()
        })
    }

    pub fn kind(self) -> ModeKind {
        use VisualizerMode::*;
        match self {
            Bars | MirrorBars | CircularSpectrum | LineSpectrum | Dots | RadialBurst | PulseRings
            | Mountains | LedMeter | Orbit => ModeKind::Spectrum,
            Rain | HeavyRain | Snow | Leaves | CherryBlossom | Fireflies | CloudShadows => {
                ModeKind::Particle
            }
            Fiber => ModeKind::MultiPass,
            _ => ModeKind::Shader,
        }
    }

    pub fn is_gpu(self) -> bool {
        matches!(self.kind(), ModeKind::Shader | ModeKind::MultiPass)
    }

    pub fn effect_kind(self) -> Option<EffectKind> {
        use VisualizerMode::*;
        Some(match self {
            Rain => EffectKind::Rain,
            HeavyRain => EffectKind::HeavyRain,
            Snow => EffectKind::Snow,
            Leaves => EffectKind::Leaves,
            CherryBlossom => EffectKind::CherryBlossom,
            Fireflies => EffectKind::Fireflies,
            CloudShadows => EffectKind::CloudShadows,
            _ => return None,
        })
    }

    /// Construct this mode's renderer. Called once per activation by the
    /// registry; the result is cached until global teardown.
    pub fn load(self, seed: Option<u64>) -> Box<dyn ModeRenderer> {
        use VisualizerMode::*;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        match self {
            Bars => Box::new(SpectrumMode::new(SpectrumStyle::Bars)),
            MirrorBars => Box::new(SpectrumMode::new(SpectrumStyle::MirrorBars)),
            CircularSpectrum => Box::new(SpectrumMode::new(SpectrumStyle::Circular)),
            LineSpectrum => Box::new(SpectrumMode::new(SpectrumStyle::Line)),
            Dots => Box::new(SpectrumMode::new(SpectrumStyle::Dots)),
            RadialBurst => Box::new(SpectrumMode::new(SpectrumStyle::RadialBurst)),
            PulseRings => Box::new(SpectrumMode::new(SpectrumStyle::PulseRings)),
            Mountains => Box::new(SpectrumMode::new(SpectrumStyle::Mountains)),
            LedMeter => Box::new(SpectrumMode::new(SpectrumStyle::LedMeter)),
            Orbit => Box::new(SpectrumMode::new(SpectrumStyle::Orbit)),
            Fiber => Box::new(FiberMode::new()),
            mode => match (mode.effect_kind(), shader::shader_source(mode)) {
                (Some(kind), _) => Box::new(ParticleSystem::new(kind, rng)),
                (None, Some(source)) => Box::new(ShaderMode::new(mode.id(), source)),
                (None, None) => Box::new(SpectrumMode::new(SpectrumStyle::Bars)),
            },
        }
    }
}

impl std::fmt::Display for VisualizerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

fn normalize_key(key: &str) -> String {
    let trimmed = key
        .trim()
        .trim_start_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    let base = trimmed
        .strip_suffix("(webgl)")
        .unwrap_or(&trimmed)
        .trim();
    base.chars()
        .map(|c| if c == ' ' || c == '_' { '-' } else { c })
        .collect()
}

/// Particle layer drawn over the active visualizer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmbienceEffect {
    #[default]
    None,
    Rain,
    HeavyRain,
    Snow,
    Leaves,
    CherryBlossom,
    Fireflies,
    CloudShadows,
}

impl AmbienceEffect {
    pub fn mode(self) -> Option<VisualizerMode> {
        Some(match self {
            AmbienceEffect::None => return None,
            AmbienceEffect::Rain => VisualizerMode::Rain,
            AmbienceEffect::HeavyRain => VisualizerMode::HeavyRain,
            AmbienceEffect::Snow => VisualizerMode::Snow,
            AmbienceEffect::Leaves => VisualizerMode::Leaves,
            AmbienceEffect::CherryBlossom => VisualizerMode::CherryBlossom,
            AmbienceEffect::Fireflies => VisualizerMode::Fireflies,
            AmbienceEffect::CloudShadows => VisualizerMode::CloudShadows,
        })
    }

    /// Parse an effect name; unknown names disable the layer.
    pub fn from_key(key: &str) -> Self {
        if normalize_key(key) == "none" {
            return AmbienceEffect::None;
        }
        match VisualizerMode::from_key(key) {
            Some(VisualizerMode::Rain) => AmbienceEffect::Rain,
            Some(VisualizerMode::HeavyRain) => AmbienceEffect::HeavyRain,
            Some(VisualizerMode::Snow) => AmbienceEffect::Snow,
            Some(VisualizerMode::Leaves) => AmbienceEffect::Leaves,
            Some(VisualizerMode::CherryBlossom) => AmbienceEffect::CherryBlossom,
            Some(VisualizerMode::Fireflies) => AmbienceEffect::Fireflies,
            Some(VisualizerMode::CloudShadows) => AmbienceEffect::CloudShadows,
            _ => {
                log::warn!("Unknown ambience effect {:?}, disabling", key);
                AmbienceEffect::None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_covers_every_mode_once() {
        assert_eq!(CATALOG.len(), 41);
        let gpu = VisualizerMode::all().filter(|m| m.is_gpu()).count();
        let particle = VisualizerMode::all()
            .filter(|m| m.kind() == ModeKind::Particle)
            .count();
        assert_eq!(gpu, 24);
        assert_eq!(particle, 7);
        for (mode, _, id) in CATALOG {
            assert_eq!(mode.id(), *id);
        }
    }

    #[test]
    fn ids_match_normalized_display_names() {
        for (mode, display, id) in CATALOG {
            assert_eq!(normalize_key(display), *id, "{:?}", mode);
            assert_eq!(VisualizerMode::from_key(display), Some(*mode));
        }
    }

    #[test]
    fn lookup_is_tolerant() {
        assert_eq!(
            VisualizerMode::from_key("🌀 Accretion (WebGL)"),
            Some(VisualizerMode::Accretion)
        );
        assert_eq!(VisualizerMode::from_key("accretion"), Some(VisualizerMode::Accretion));
        assert_eq!(VisualizerMode::from_key("Heavy_Rain"), Some(VisualizerMode::HeavyRain));
        assert_eq!(VisualizerMode::from_key("BLACK HOLE"), Some(VisualizerMode::BlackHole));
        assert_eq!(VisualizerMode::from_key("nope"), None);
        assert_eq!(VisualizerMode::from_key(""), None);
    }

    #[test]
    fn unknown_key_falls_back_to_bars() {
        assert_eq!(VisualizerMode::from_key_or_default("???"), VisualizerMode::Bars);
    }

    #[test]
    fn every_shader_mode_has_a_source() {
        for mode in VisualizerMode::all().filter(|m| m.kind() == ModeKind::Shader) {
            assert!(shader::shader_source(mode).is_some(), "{:?}", mode);
        }
    }

    #[test]
    fn effect_names_parse() {
        assert_eq!(AmbienceEffect::from_key("cherry-blossom"), AmbienceEffect::CherryBlossom);
        assert_eq!(AmbienceEffect::from_key("none"), AmbienceEffect::None);
        assert_eq!(AmbienceEffect::from_key("plasma"), AmbienceEffect::None);
        assert_eq!(AmbienceEffect::Snow.mode(), Some(VisualizerMode::Snow));
    }
}
