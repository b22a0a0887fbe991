//! Declares [PixelLayout], how the bytes of a [super::Frame] map to pixels.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// The memory layout of one pixel. All layouts are tightly packed and
/// interleaved (one pixel's channels sit next to each other).
///
/// Only [Grey8](Self::Grey8), [Rgb8](Self::Rgb8) and [Rgba8](Self::Rgba8) are
/// canonical, meaning a sink can interpret them from the channel count alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelLayout {
    Grey8,
    /// 16-bit little endian luminance.
    Grey16,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
}

impl PixelLayout {
    /// The number of channels per pixel.
    pub const fn channel_count(self) -> usize {
        match self {
            Self::Grey8 | Self::Grey16 => 1,
            Self::Rgb8 | Self::Bgr8 => 3,
            Self::Rgba8 | Self::Bgra8 => 4,
        }
    }

    /// The number of bytes one pixel takes up.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Grey16 => 2,
            other => other.channel_count(),
        }
    }
}

impl Display for PixelLayout {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Grey8 => "grey8",
            Self::Grey16 => "grey16",
            Self::Rgb8 => "rgb8",
            Self::Bgr8 => "bgr8",
            Self::Rgba8 => "rgba8",
            Self::Bgra8 => "bgra8",
        };
        f.write_str(name)
    }
}
