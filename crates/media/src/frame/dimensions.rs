//! Image sizes.

use std::fmt::{self, Display, Formatter};
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// The size of an image in pixels. Neither side can be `0`, so every frame
/// has at least one pixel.
///
/// Converting from a `(width, height)` tuple panics on a zero side, which
/// makes it handy for literals in tests:
///
/// ```
/// use media::frame::Dimensions;
///
/// let sensor: Dimensions = (640, 480).into();
/// assert_eq!(sensor.area(), 640 * 480);
/// assert_eq!(Dimensions::new(640, 0), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    width: NonZeroUsize,
    height: NonZeroUsize,
}

impl Dimensions {
    /// [None] if either side is `0`.
    pub const fn new(width: usize, height: usize) -> Option<Self> {
        let Some(width) = NonZeroUsize::new(width) else {
            return None;
        };
        let Some(height) = NonZeroUsize::new(height) else {
            return None;
        };

        Some(Self::from_non_zero(width, height))
    }

    pub const fn from_non_zero(width: NonZeroUsize, height: NonZeroUsize) -> Self {
        Self { width, height }
    }

    pub const fn width(&self) -> usize {
        self.width.get()
    }

    pub const fn height(&self) -> usize {
        self.height.get()
    }

    /// The pixel count.
    pub const fn area(&self) -> usize {
        self.width.get() * self.height.get()
    }
}

/// Formatted as `640x480`.
impl Display for Dimensions {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Panics on a zero side.
impl From<(usize, usize)> for Dimensions {
    fn from(dimensions: (usize, usize)) -> Self {
        Self::new(dimensions.0, dimensions.1).expect("Image sides can't be 0.")
    }
}

impl From<Dimensions> for (usize, usize) {
    fn from(dimensions: Dimensions) -> Self {
        (dimensions.width(), dimensions.height())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sides_are_rejected() {
        assert_eq!(Dimensions::new(0, 4), None);
        assert_eq!(Dimensions::new(4, 0), None);
        assert_eq!(Dimensions::new(4, 3).map(|d| d.area()), Some(12));
    }

    #[test]
    fn displays_as_width_by_height() {
        let d: Dimensions = (1280, 720).into();
        assert_eq!(d.to_string(), "1280x720");
    }
}
