use std::sync::Arc;

use image::RgbaImage;

/// The one external player this widget mirrors.
pub const TARGET_APP: &str = "Spotify";

/// Title shown while the player process is absent
pub const NOT_RUNNING_TITLE: &str = "Spotify not running";

/// Title reported while the player is running but has nothing loaded
pub const NO_TRACK_TITLE: &str = "No track";

/// Decoded, unmasked artwork. Shared so redraws never copy pixels.
pub type Bitmap = Arc<RgbaImage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

impl PlaybackState {
    /// Parse the player's `player state as string` reply.
    /// Anything unrecognised (including an empty reply) counts as stopped.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "playing" => PlaybackState::Playing,
            "paused" => PlaybackState::Paused,
            _ => PlaybackState::Stopped,
        }
    }

    pub fn is_playing(self) -> bool {
        self == PlaybackState::Playing
    }
}

/// What the player looked like at one poll. Replaced wholesale every tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSnapshot {
    pub is_running: bool,
    pub is_playing: bool,
    pub title: String,
    pub artist: String,
    /// Artwork URL; empty means none
    pub artwork_ref: String,
}

impl PlayerSnapshot {
    /// The snapshot published whenever the player process is absent.
    pub fn not_running() -> Self {
        Self {
            is_running: false,
            is_playing: false,
            title: NOT_RUNNING_TITLE.to_string(),
            artist: String::new(),
            artwork_ref: String::new(),
        }
    }

    /// Collapse every field to its absent value if the player is not running.
    pub fn normalized(self) -> Self {
        if self.is_running {
            self
        } else {
            Self::not_running()
        }
    }

    /// True when the title is a real track rather than one of the sentinels.
    pub fn has_track(&self) -> bool {
        self.is_running
            && !self.title.is_empty()
            && self.title != NOT_RUNNING_TITLE
            && self.title != NO_TRACK_TITLE
    }
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        Self::not_running()
    }
}

/// Everything the presentation layer needs for one frame.
///
/// Always derived from scratch by [`crate::display::render`]; never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayState {
    pub visible: bool,
    pub artist_line: String,
    pub track_line: String,
    pub icon: Option<Bitmap>,
    pub content_width: f32,
    pub total_width: f32,
}

impl DisplayState {
    pub fn hidden() -> Self {
        Self {
            visible: false,
            artist_line: String::new(),
            track_line: String::new(),
            icon: None,
            content_width: 0.0,
            total_width: 0.0,
        }
    }
}

impl Default for DisplayState {
    fn default() -> Self {
        Self::hidden()
    }
}

/// State shared between the poll loop and the tray menu.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub snapshot: PlayerSnapshot,
    pub display: DisplayState,
}
