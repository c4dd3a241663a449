use ab_glyph::{Font, FontVec, PxScale, ScaleFont, VariableFont};
use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::{GrayImage, Luma, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_ellipse_mut, draw_filled_rect_mut, draw_text_mut,
};
use imageproc::rect::Rect;

use crate::config::{Config, FontConfig, LayoutConfig};
use crate::display::{TextLine, TextMeasurer};
use crate::types::{Bitmap, DisplayState};

const ELLIPSIS: &str = "…";
const WEIGHT_AXIS: &[u8; 4] = b"wght";

/// Whether the system is currently in dark mode
pub fn is_dark_mode() -> bool {
    matches!(dark_light::detect(), dark_light::Mode::Dark)
}

/// Get appropriate text color based on system appearance
pub fn text_color(dark_mode: bool) -> Rgba<u8> {
    if dark_mode {
        Rgba([255, 255, 255, 255]) // White text for dark mode
    } else {
        Rgba([0, 0, 0, 255]) // Black text for light mode
    }
}

/// Pixel scale for a font at a given point size (em height, 1pt = 1px).
fn px_scale(font: &impl Font, pt_size: f32) -> PxScale {
    match font.units_per_em() {
        Some(units_per_em) if units_per_em > 0.0 => {
            PxScale::from(pt_size * font.height_unscaled() / units_per_em)
        }
        _ => PxScale::from(pt_size),
    }
}

/// Sum of advances (with kerning) for `text` at `scale`
fn advance_width(font: &impl Font, scale: PxScale, text: &str) -> f32 {
    let scaled = font.as_scaled(scale);
    let mut width = 0.0;
    let mut previous = None;

    for ch in text.chars() {
        let glyph_id = scaled.glyph_id(ch);
        if let Some(previous) = previous {
            width += scaled.kern(previous, glyph_id);
        }
        width += scaled.h_advance(glyph_id);
        previous = Some(glyph_id);
    }

    width
}

/// Measures text with the real font files.
pub struct GlyphMeasurer {
    artist: FontVec,
    track: FontVec,
}

impl GlyphMeasurer {
    pub fn load(fonts: &FontConfig) -> Result<Self> {
        let artist = std::fs::read(&fonts.artist)
            .with_context(|| format!("Failed to load font {}", fonts.artist.display()))?;
        let track = if fonts.track == fonts.artist {
            artist.clone()
        } else {
            std::fs::read(&fonts.track)
                .with_context(|| format!("Failed to load font {}", fonts.track.display()))?
        };

        Ok(Self::from_bytes(artist, track)?.with_weights(fonts.artist_weight, fonts.track_weight))
    }

    pub fn from_bytes(artist: Vec<u8>, track: Vec<u8>) -> Result<Self> {
        Ok(Self {
            artist: FontVec::try_from_vec(artist).context("Failed to parse artist font")?,
            track: FontVec::try_from_vec(track).context("Failed to parse track font")?,
        })
    }

    /// Pin each line to a weight on the font's `wght` axis.
    ///
    /// Static faces have no such axis and keep their own weight.
    pub fn with_weights(mut self, artist: f32, track: f32) -> Self {
        set_weight(&mut self.artist, artist);
        set_weight(&mut self.track, track);
        self
    }

    fn font(&self, line: TextLine) -> &FontVec {
        match line {
            TextLine::Artist => &self.artist,
            TextLine::Track => &self.track,
        }
    }
}

fn set_weight(font: &mut FontVec, weight: f32) {
    if font.variations().iter().any(|axis| &axis.tag == WEIGHT_AXIS) {
        font.set_variation(WEIGHT_AXIS, weight);
    } else {
        log::debug!("Font has no weight axis, ignoring weight {}", weight);
    }
}

impl TextMeasurer for GlyphMeasurer {
    fn measure(&self, text: &str, line: TextLine, size: f32) -> f32 {
        let font = self.font(line);
        advance_width(font, px_scale(font, size), text)
    }
}

/// Rough metrics for when no font could be loaded: every character is a
/// fixed fraction of an em wide.
#[derive(Debug, Clone, Copy)]
pub struct AverageAdvance {
    pub em_ratio: f32,
}

impl Default for AverageAdvance {
    fn default() -> Self {
        Self { em_ratio: 0.55 }
    }
}

impl TextMeasurer for AverageAdvance {
    fn measure(&self, text: &str, _line: TextLine, size: f32) -> f32 {
        text.chars().count() as f32 * size * self.em_ratio
    }
}

/// Draws the menu bar image: two right-aligned text lines and the icon.
pub struct Compositor {
    layout: LayoutConfig,
    glyphs: Option<GlyphMeasurer>,
    fallback: AverageAdvance,
}

impl Compositor {
    /// A font that fails to load only costs us the text; the icon still renders.
    pub fn new(config: &Config) -> Self {
        let glyphs = match GlyphMeasurer::load(&config.fonts) {
            Ok(glyphs) => Some(glyphs),
            Err(e) => {
                log::warn!("{:#}; falling back to approximate text metrics", e);
                None
            }
        };

        Self::with_glyphs(config.layout.clone(), glyphs)
    }

    pub fn with_glyphs(layout: LayoutConfig, glyphs: Option<GlyphMeasurer>) -> Self {
        Self {
            layout,
            glyphs,
            fallback: AverageAdvance::default(),
        }
    }

    /// Render the display state as PNG bytes, coloured for the current appearance.
    pub fn compose(&self, display: &DisplayState) -> Result<Vec<u8>> {
        self.compose_with_color(display, text_color(is_dark_mode()))
    }

    pub fn compose_with_color(&self, display: &DisplayState, color: Rgba<u8>) -> Result<Vec<u8>> {
        let canvas = self.render(display, color);
        encode_png(&canvas)
    }

    fn render(&self, display: &DisplayState, color: Rgba<u8>) -> RgbaImage {
        let layout = &self.layout;
        let factor = layout.scale_factor as f32;

        // A hidden state still gets an icon-sized image
        let width_pt = display.total_width.max(layout.icon_slot_width);
        let canvas_width = ((width_pt * factor).ceil() as u32).max(1);
        let canvas_height = ((layout.height * factor).ceil() as u32).max(1);

        // Create transparent canvas with dynamic width
        let mut canvas = RgbaImage::from_pixel(canvas_width, canvas_height, Rgba([0, 0, 0, 0]));

        if display.visible {
            if let Some(glyphs) = &self.glyphs {
                self.draw_lines(&mut canvas, glyphs, display, color);
            }
        }

        let icon = self.icon_image(display.icon.as_ref(), color);
        let (icon_x, icon_y) = icon_origin(width_pt, layout);
        image::imageops::overlay(
            &mut canvas,
            &icon,
            (icon_x * factor).round() as i64,
            (icon_y * factor).round() as i64,
        );

        canvas
    }

    fn draw_lines(
        &self,
        canvas: &mut RgbaImage,
        glyphs: &GlyphMeasurer,
        display: &DisplayState,
        color: Rgba<u8>,
    ) {
        let layout = &self.layout;
        let factor = layout.scale_factor as f32;
        let inset = layout.text_padding / 2.0;
        let available = (display.content_width - layout.text_padding).max(0.0);

        for (line, text) in [
            (TextLine::Artist, display.artist_line.as_str()),
            (TextLine::Track, display.track_line.as_str()),
        ] {
            if text.is_empty() {
                continue;
            }

            let size = line.font_size(layout);
            let text = truncate_text(text, available, |candidate| {
                glyphs.measure(candidate, line, size)
            });
            let width = glyphs.measure(&text, line, size);

            let font = glyphs.font(line);
            let scale = px_scale(font, size * factor);
            let line_height = font.as_scaled(scale).height();

            // Right-aligned against the icon slot
            let x = ((display.content_width - inset - width) * factor).max(0.0);
            let y = match line {
                TextLine::Artist => 0.0,
                TextLine::Track => (canvas.height() as f32 - line_height).max(0.0),
            };

            draw_text_mut(canvas, color, x as i32, y as i32, scale, font, &text);
        }
    }

    /// The icon at its final pixel size: masked artwork, or the note glyph.
    ///
    /// The mask is applied on every call; the cached bitmap stays unmasked.
    pub fn icon_image(&self, bitmap: Option<&Bitmap>, color: Rgba<u8>) -> RgbaImage {
        let factor = self.layout.scale_factor as f32;
        let size = ((self.layout.icon_size * factor).round() as u32).max(1);

        match bitmap {
            Some(bitmap) => {
                let mut icon =
                    image::imageops::resize(bitmap.as_ref(), size, size, FilterType::Lanczos3);
                let radius = (self.layout.icon_corner_radius * factor).round() as u32;
                apply_rounded_mask(&mut icon, radius);
                icon
            }
            None => music_note(size, color),
        }
    }
}

impl TextMeasurer for Compositor {
    fn measure(&self, text: &str, line: TextLine, size: f32) -> f32 {
        match &self.glyphs {
            Some(glyphs) => glyphs.measure(text, line, size),
            None => self.fallback.measure(text, line, size),
        }
    }
}

/// What a redraw request needs to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FramePlan {
    pub redraw: bool,
    pub rebuild_menu: bool,
    pub appearance_changed: bool,
}

/// Remembers the last frame that actually reached the status item, so
/// identical frames are skipped and failed ones are retried.
#[derive(Debug, Default)]
pub struct FrameTracker {
    display: Option<DisplayState>,
    dark_mode: Option<bool>,
    menu_key: Option<(bool, bool)>,
}

impl FrameTracker {
    /// `menu_key` is `(is_running, is_playing)`, the inputs the menu depends on.
    pub fn plan(&self, display: &DisplayState, dark_mode: bool, menu_key: (bool, bool)) -> FramePlan {
        FramePlan {
            redraw: self.display.as_ref() != Some(display) || self.dark_mode != Some(dark_mode),
            rebuild_menu: self.menu_key != Some(menu_key),
            appearance_changed: self.dark_mode.is_some_and(|previous| previous != dark_mode),
        }
    }

    /// Record a frame that was drawn successfully.
    pub fn drawn(&mut self, display: &DisplayState, dark_mode: bool) {
        self.display = Some(display.clone());
        self.dark_mode = Some(dark_mode);
    }

    pub fn menu_built(&mut self, menu_key: (bool, bool)) {
        self.menu_key = Some(menu_key);
    }
}

/// Top-left of the icon, in points, for a widget `total_width` wide.
pub fn icon_origin(total_width: f32, layout: &LayoutConfig) -> (f32, f32) {
    let x = (total_width - layout.icon_size - layout.icon_right_inset).max(0.0);
    let y = ((layout.height - layout.icon_size) / 2.0).max(0.0);
    (x, y)
}

/// Truncate text from the tail so it fits within `max_width`
fn truncate_text(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> String {
    if measure(text) <= max_width {
        return text.to_string();
    }

    let available_for_text = max_width - measure(ELLIPSIS);
    let mut truncated = String::new();

    for ch in text.chars() {
        truncated.push(ch);
        if measure(&truncated) > available_for_text {
            truncated.pop();
            break;
        }
    }

    format!("{}{}", truncated.trim_end(), ELLIPSIS)
}

/// Clear everything outside a rounded rectangle of `radius` pixels
pub fn apply_rounded_mask(image: &mut RgbaImage, radius: u32) {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return;
    }

    let r = radius.min((width - 1) / 2).min((height - 1) / 2);
    if r == 0 {
        return;
    }

    let on = Luma([255u8]);
    let mut mask = GrayImage::new(width, height);
    draw_filled_rect_mut(&mut mask, Rect::at(r as i32, 0).of_size(width - 2 * r, height), on);
    draw_filled_rect_mut(&mut mask, Rect::at(0, r as i32).of_size(width, height - 2 * r), on);
    for (cx, cy) in [
        (r, r),
        (width - 1 - r, r),
        (r, height - 1 - r),
        (width - 1 - r, height - 1 - r),
    ] {
        draw_filled_circle_mut(&mut mask, (cx as i32, cy as i32), r as i32, on);
    }

    for (pixel, coverage) in image.pixels_mut().zip(mask.pixels()) {
        pixel[3] = ((pixel[3] as u16 * coverage[0] as u16) / 255) as u8;
    }
}

/// Fallback glyph shown when there is no artwork
fn music_note(size: u32, color: Rgba<u8>) -> RgbaImage {
    let mut icon = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
    let s = size as f32;
    let px = |v: f32| ((v * s).round() as i32).max(1);

    // Head
    draw_filled_ellipse_mut(&mut icon, (px(0.36), px(0.72)), px(0.17), px(0.13), color);
    // Stem
    let stem_x = px(0.45);
    let stem_top = px(0.16);
    draw_filled_rect_mut(
        &mut icon,
        Rect::at(stem_x, stem_top).of_size(px(0.08) as u32, (px(0.72) - stem_top).max(1) as u32),
        color,
    );
    // Flag
    draw_filled_rect_mut(
        &mut icon,
        Rect::at(stem_x, stem_top).of_size(px(0.30) as u32, px(0.10) as u32),
        color,
    );

    icon
}

/// Encode image as PNG bytes
fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    use image::codecs::png::PngEncoder;
    use image::ImageEncoder;

    let mut buffer = Vec::new();
    let encoder = PngEncoder::new(&mut buffer);

    encoder
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ExtendedColorType::Rgba8,
        )
        .context("Failed to encode PNG")?;

    Ok(buffer)
}
