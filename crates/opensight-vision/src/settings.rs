//! Video pipeline settings.

use serde::{Deserialize, Serialize};

/// An RGB colour triple.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Squared Euclidean distance to another colour in RGB space.
    pub fn squared_distance_to(self, other: Rgb) -> u32 {
        let dr = self.r as i32 - other.r as i32;
        let dg = self.g as i32 - other.g as i32;
        let db = self.b as i32 - other.b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }
}

/// Which hand the gun is held in, as it affects the orientation of the
/// screen quadrilateral seen by the barrel camera.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handedness {
    /// Decide per frame from the previous aim point.
    #[default]
    Auto,
    Left,
    Right,
}

/// Settings for the per-frame vision pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSettings {
    /// Colour of the illuminated border the camera searches for.
    pub border_color: Rgb,
    /// Maximum Euclidean RGB distance from the border colour for a pixel to
    /// count as border.
    pub filter_radius: u32,
    pub handedness: Handedness,
    /// Reject candidate quads whose aim point falls outside the display.
    pub only_match_where_pointing: bool,
    pub use_anti_jitter: bool,
    /// Minimum movement in display percent before a new aim point is
    /// forwarded when anti-jitter is on.
    pub jitter_move_threshold: f64,
    /// Vertical sight offset in display percent, derived from the physical
    /// screen size.
    pub y_sight_offset: f64,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            border_color: Rgb::new(255, 255, 255),
            filter_radius: 50,
            handedness: Handedness::Auto,
            only_match_where_pointing: false,
            use_anti_jitter: true,
            jitter_move_threshold: 0.5,
            y_sight_offset: 0.0,
        }
    }
}
