//! Stream metadata recovered by probing payload sections.
//!
//! Section metadata is stored as a plain string map on
//! [`PayloadSection::metadata`](crate::PayloadSection) so that callers
//! (tree views, JSON output) can render it without knowing the payload kind.
//! The structs below are the typed form produced by the probers.

use std::collections::BTreeMap;

/// Summary of a video elementary stream.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMeta {
    /// Codec name (e.g. `"h264"`, `"hevc"`).
    pub codec: String,
    /// Coded width in pixels.
    pub width: u32,
    /// Coded height in pixels.
    pub height: u32,
    /// Pixel format name (e.g. `"yuv420p"`).
    pub pixel_format: String,
    /// Nominal frames per second, `0.0` when the stream does not say.
    pub frame_rate: f64,
}

impl VideoMeta {
    /// Render as the section metadata map: `codec`, `size`, `pix_fmt`,
    /// `framerate`.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("codec".to_string(), self.codec.clone()),
            ("size".to_string(), format!("{}x{}", self.width, self.height)),
            ("pix_fmt".to_string(), self.pixel_format.clone()),
            ("framerate".to_string(), format!("{:.3}", self.frame_rate)),
        ])
    }
}

/// Summary of a still-image payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageMeta {
    /// Image format name (e.g. `"jpeg"`, `"png"`).
    pub format: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl ImageMeta {
    /// Render as the section metadata map: `format`, `size`.
    pub fn to_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("format".to_string(), self.format.clone()),
            ("size".to_string(), format!("{}x{}", self.width, self.height)),
        ])
    }
}
