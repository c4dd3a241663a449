use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

/// macOS system font (variable), used for both lines unless configured otherwise
pub const SYSTEM_FONT: &str = "/System/Library/Fonts/SFNS.ttf";

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub polling: PollingConfig,
    pub layout: LayoutConfig,
    pub fonts: FontConfig,
}

impl Config {
    /// Load the first config file found, falling back to defaults.
    ///
    /// Search order: `$NOWBAR_CONFIG`, `<config dir>/nowbar/config.json`, `./nowbar.json`.
    pub fn load() -> anyhow::Result<Self> {
        for path in Self::candidates() {
            if path.exists() {
                log::info!("Loading config from {}", path.display());
                return Self::from_file(&path);
            }
        }

        log::debug!("No config file found, using defaults");
        Ok(Config::default())
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_json(&data).with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn from_json(data: &str) -> anyhow::Result<Self> {
        let doc: ConfigDocument = serde_json::from_str(data)?;
        Ok(doc.into())
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates = Vec::new();

        if let Ok(path) = env::var("NOWBAR_CONFIG") {
            candidates.push(PathBuf::from(path));
        }
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join("nowbar").join("config.json"));
        }
        if let Ok(current_dir) = env::current_dir() {
            candidates.push(current_dir.join("nowbar.json"));
        }

        candidates
    }
}

/// Poll cadence and the settle delays used before re-reading after a command.
#[derive(Debug, Clone, PartialEq)]
pub struct PollingConfig {
    pub interval: Duration,
    pub play_pause_settle: Duration,
    pub track_change_settle: Duration,
    pub launch_settle: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            play_pause_settle: Duration::from_millis(200),
            track_change_settle: Duration::from_millis(500),
            launch_settle: Duration::from_millis(1000),
        }
    }
}

/// Widget geometry, in points.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutConfig {
    pub artist_font_size: f32,
    pub track_font_size: f32,
    pub text_padding: f32,
    pub icon_slot_width: f32,
    pub max_width: f32,
    pub icon_size: f32,
    pub icon_corner_radius: f32,
    pub icon_right_inset: f32,
    pub height: f32,
    /// Render multiplier for retina displays
    pub scale_factor: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            artist_font_size: 9.0,
            track_font_size: 11.0,
            text_padding: 8.0,
            icon_slot_width: 28.0,
            max_width: 180.0,
            icon_size: 18.0,
            icon_corner_radius: 3.0,
            icon_right_inset: 4.0,
            height: 22.0,
            scale_factor: 3,
        }
    }
}

impl LayoutConfig {
    /// Widest the text column may get before the icon slot would be pushed off.
    pub fn max_content_width(&self) -> f32 {
        (self.max_width - self.icon_slot_width).max(0.0)
    }

    /// Repair values that would break the width clamps.
    fn sanitized(mut self) -> Self {
        let defaults = LayoutConfig::default();

        if !(self.artist_font_size > 0.0) {
            self.artist_font_size = defaults.artist_font_size;
        }
        if !(self.track_font_size > 0.0) {
            self.track_font_size = defaults.track_font_size;
        }
        if !(self.text_padding >= 0.0) {
            self.text_padding = 0.0;
        }
        if !(self.icon_slot_width >= 0.0) {
            self.icon_slot_width = defaults.icon_slot_width;
        }
        if !(self.max_width >= self.icon_slot_width) {
            log::warn!(
                "layout.max_width {} is narrower than the icon slot, using {}",
                self.max_width,
                self.icon_slot_width
            );
            self.max_width = self.icon_slot_width;
        }
        if !(self.icon_size > 0.0) {
            self.icon_size = defaults.icon_size;
        }
        self.icon_size = self.icon_size.min(self.icon_slot_width.max(1.0));
        if !(self.icon_corner_radius >= 0.0) {
            self.icon_corner_radius = 0.0;
        }
        if !(self.icon_right_inset >= 0.0) {
            self.icon_right_inset = 0.0;
        }
        if !(self.height > 0.0) {
            self.height = defaults.height;
        }
        self.scale_factor = self.scale_factor.clamp(1, 4);

        self
    }
}

/// Font files and weights for the two lines.
///
/// Weights select a point on a variable font's `wght` axis, so one file can
/// serve both lines. A static face ignores them.
#[derive(Debug, Clone, PartialEq)]
pub struct FontConfig {
    pub artist: PathBuf,
    pub track: PathBuf,
    pub artist_weight: f32,
    pub track_weight: f32,
}

impl Default for FontConfig {
    fn default() -> Self {
        Self {
            artist: PathBuf::from(SYSTEM_FONT),
            track: PathBuf::from(SYSTEM_FONT),
            // Regular artist, medium track
            artist_weight: 400.0,
            track_weight: 500.0,
        }
    }
}

impl FontConfig {
    /// Keep weights inside the OpenType weight class range
    pub fn sanitized(mut self) -> Self {
        let defaults = FontConfig::default();

        for (weight, fallback) in [
            (&mut self.artist_weight, defaults.artist_weight),
            (&mut self.track_weight, defaults.track_weight),
        ] {
            if !weight.is_finite() {
                *weight = fallback;
            }
            *weight = weight.clamp(1.0, 1000.0);
        }

        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    polling: PollingSection,
    #[serde(default)]
    layout: LayoutSection,
    #[serde(default)]
    fonts: FontSection,
}

impl From<ConfigDocument> for Config {
    fn from(value: ConfigDocument) -> Self {
        let default_polling = PollingConfig::default();
        let default_layout = LayoutConfig::default();
        let default_fonts = FontConfig::default();

        let ms = |value: Option<u64>, fallback: Duration| {
            value.map(Duration::from_millis).unwrap_or(fallback)
        };

        let mut polling = PollingConfig {
            interval: ms(value.polling.interval_ms, default_polling.interval),
            play_pause_settle: ms(value.polling.play_pause_settle_ms, default_polling.play_pause_settle),
            track_change_settle: ms(
                value.polling.track_change_settle_ms,
                default_polling.track_change_settle,
            ),
            launch_settle: ms(value.polling.launch_settle_ms, default_polling.launch_settle),
        };
        if polling.interval.is_zero() {
            polling.interval = default_polling.interval;
        }

        let layout = LayoutConfig {
            artist_font_size: value.layout.artist_font_size.unwrap_or(default_layout.artist_font_size),
            track_font_size: value.layout.track_font_size.unwrap_or(default_layout.track_font_size),
            text_padding: value.layout.text_padding.unwrap_or(default_layout.text_padding),
            icon_slot_width: value.layout.icon_slot_width.unwrap_or(default_layout.icon_slot_width),
            max_width: value.layout.max_width.unwrap_or(default_layout.max_width),
            icon_size: value.layout.icon_size.unwrap_or(default_layout.icon_size),
            icon_corner_radius: value
                .layout
                .icon_corner_radius
                .unwrap_or(default_layout.icon_corner_radius),
            icon_right_inset: value.layout.icon_right_inset.unwrap_or(default_layout.icon_right_inset),
            height: value.layout.height.unwrap_or(default_layout.height),
            scale_factor: value.layout.scale_factor.unwrap_or(default_layout.scale_factor),
        }
        .sanitized();

        let fonts = FontConfig {
            artist: value.fonts.artist.unwrap_or(default_fonts.artist),
            track: value.fonts.track.unwrap_or(default_fonts.track),
            artist_weight: value.fonts.artist_weight.unwrap_or(default_fonts.artist_weight),
            track_weight: value.fonts.track_weight.unwrap_or(default_fonts.track_weight),
        }
        .sanitized();

        Config {
            polling,
            layout,
            fonts,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PollingSection {
    interval_ms: Option<u64>,
    play_pause_settle_ms: Option<u64>,
    track_change_settle_ms: Option<u64>,
    launch_settle_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LayoutSection {
    artist_font_size: Option<f32>,
    track_font_size: Option<f32>,
    text_padding: Option<f32>,
    icon_slot_width: Option<f32>,
    max_width: Option<f32>,
    icon_size: Option<f32>,
    icon_corner_radius: Option<f32>,
    icon_right_inset: Option<f32>,
    height: Option<f32>,
    scale_factor: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct FontSection {
    artist: Option<PathBuf>,
    track: Option<PathBuf>,
    artist_weight: Option<f32>,
    track_weight: Option<f32>,
}
