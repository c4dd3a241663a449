//! Pure derivation of what the menu bar should show.

use std::sync::Arc;

use crate::artwork::ArtworkCache;
use crate::config::LayoutConfig;
use crate::types::{DisplayState, PlayerSnapshot};

/// Which of the two text lines is being measured or drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextLine {
    /// Upper, smaller line
    Artist,
    /// Lower, heavier line
    Track,
}

impl TextLine {
    pub fn font_size(self, layout: &LayoutConfig) -> f32 {
        match self {
            TextLine::Artist => layout.artist_font_size,
            TextLine::Track => layout.track_font_size,
        }
    }
}

/// Rendered text width, in points.
pub trait TextMeasurer {
    fn measure(&self, text: &str, line: TextLine, size: f32) -> f32;
}

impl<T: TextMeasurer + ?Sized> TextMeasurer for Arc<T> {
    fn measure(&self, text: &str, line: TextLine, size: f32) -> f32 {
        (**self).measure(text, line, size)
    }
}

/// Shown only while the player is running with a real track loaded.
pub fn is_visible(snapshot: &PlayerSnapshot) -> bool {
    snapshot.has_track()
}

/// Width of the text column: widest line plus padding, never wider than the
/// space left beside the icon slot.
pub fn content_width(artist_width: f32, track_width: f32, layout: &LayoutConfig) -> f32 {
    let widest = artist_width.max(track_width).max(0.0);
    (widest + layout.text_padding).clamp(0.0, layout.max_content_width())
}

/// Text column plus icon slot, clamped again to the widget maximum.
pub fn total_width(content_width: f32, layout: &LayoutConfig) -> f32 {
    (content_width + layout.icon_slot_width).min(layout.max_width)
}

/// Build the display state for the current snapshot and artwork.
pub fn render(
    snapshot: &PlayerSnapshot,
    artwork: &ArtworkCache,
    layout: &LayoutConfig,
    measurer: &impl TextMeasurer,
) -> DisplayState {
    if !is_visible(snapshot) {
        return DisplayState::hidden();
    }

    let artist_width = measurer.measure(
        &snapshot.artist,
        TextLine::Artist,
        TextLine::Artist.font_size(layout),
    );
    let track_width = measurer.measure(
        &snapshot.title,
        TextLine::Track,
        TextLine::Track.font_size(layout),
    );

    let content_width = content_width(artist_width, track_width, layout);
    let total_width = total_width(content_width, layout);

    log::debug!(
        "Layout: artist={:.1} track={:.1} content={:.1} total={:.1}",
        artist_width,
        track_width,
        content_width,
        total_width
    );

    DisplayState {
        visible: true,
        artist_line: snapshot.artist.clone(),
        track_line: snapshot.title.clone(),
        icon: artwork.bitmap().cloned(),
        content_width,
        total_width,
    }
}
