//! This module declares the [Frame] type, an owned pixel buffer plus the
//! [FrameSpec] describing how to read it.
//!
//! A [Frame] is never shared. It moves between the reading thread, a
//! [FramePool](crate::pool::FramePool), an [ImageJob](crate::job_queue::ImageJob)
//! and a stream's worker thread, and whoever holds it may reuse its buffer.
//! Re-initializing a frame with a new spec keeps the allocation whenever it's
//! big enough, which is the whole point of pooling them.

mod dimensions;
mod pixel_layout;

use std::fmt::{self, Debug, Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use dimensions::*;
pub use pixel_layout::*;

/// The shape of a [Frame]'s pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSpec {
    pub dimensions: Dimensions,
    pub layout: PixelLayout,
}

impl FrameSpec {
    pub const fn new(dimensions: Dimensions, layout: PixelLayout) -> Self {
        Self { dimensions, layout }
    }

    /// The number of bytes in one tightly packed row, [None] if that doesn't
    /// fit in a [usize].
    pub const fn checked_row_len(&self) -> Option<usize> {
        self.dimensions
            .width()
            .checked_mul(self.layout.bytes_per_pixel())
    }

    /// The number of bytes a frame with this spec holds, [None] if that
    /// doesn't fit in a [usize].
    pub const fn checked_buffer_len(&self) -> Option<usize> {
        match self.checked_row_len() {
            Some(row_len) => row_len.checked_mul(self.dimensions.height()),
            None => None,
        }
    }

    /// The number of bytes in one tightly packed row.
    ///
    /// Panics if the size overflows, which can't happen for the spec of an
    /// existing [Frame]. Use [Self::checked_row_len] for untrusted specs.
    pub const fn row_len(&self) -> usize {
        self.dimensions.width() * self.layout.bytes_per_pixel()
    }

    /// The number of bytes a frame with this spec holds.
    ///
    /// Panics if the size overflows, which can't happen for the spec of an
    /// existing [Frame]. Use [Self::checked_buffer_len] for untrusted specs.
    pub const fn buffer_len(&self) -> usize {
        self.row_len() * self.dimensions.height()
    }
}

/// When displayed, a [FrameSpec] will look like `WxH layout` (e.g.
/// `640x480 rgb8`).
impl Display for FrameSpec {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.dimensions, self.layout)
    }
}

/// An owned pixel buffer with its [FrameSpec].
///
/// The buffer is always exactly [FrameSpec::buffer_len] bytes long with no row
/// padding.
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    spec: FrameSpec,
    data: Vec<u8>,
}

impl Frame {
    /// Creates a new frame with every byte set to `0`.
    ///
    /// `spec` must have a [buffer length](FrameSpec::checked_buffer_len) that
    /// fits in memory.
    pub fn new(spec: FrameSpec) -> Self {
        Self {
            spec,
            data: vec![0; spec.buffer_len()],
        }
    }

    /// Tries to create a frame from existing pixel data, returning an error if
    /// `data` isn't exactly as long as `spec` needs.
    pub fn from_data(spec: FrameSpec, data: Vec<u8>) -> Result<Self, FrameError> {
        check_len(spec, &data)?;
        Ok(Self { spec, data })
    }

    /// Change this frame's spec, resizing the buffer to match. The existing
    /// allocation is reused when it has enough capacity.
    ///
    /// The contents of the buffer are unspecified afterwards.
    pub fn reinit(&mut self, spec: FrameSpec) {
        self.spec = spec;
        self.data.resize(spec.buffer_len(), 0);
    }

    /// Re-initializes the frame with `spec` and copies `data` into it.
    ///
    /// Returns an error (leaving the frame untouched) if `data` doesn't match
    /// `spec`.
    pub fn assign(&mut self, spec: FrameSpec, data: &[u8]) -> Result<(), FrameError> {
        check_len(spec, data)?;

        self.spec = spec;
        self.data.clear();
        self.data.extend_from_slice(data);
        Ok(())
    }

    /// Changes the layout without touching the pixel bytes. Only layouts with
    /// the same number of bytes per pixel can be swapped this way (e.g. after
    /// reordering channels in place).
    pub fn reinterpret(&mut self, layout: PixelLayout) -> Result<(), FrameError> {
        if layout.bytes_per_pixel() != self.spec.layout.bytes_per_pixel() {
            return Err(FrameError::IncompatibleLayout {
                from: self.spec.layout,
                to: layout,
            });
        }

        self.spec.layout = layout;
        Ok(())
    }

    /// Sets every byte to `0`.
    pub fn blank(&mut self) {
        self.data.fill(0);
    }

    /// Turns this frame into a blank single channel frame with the same
    /// dimensions. Used as a stand-in before real frames are available.
    pub fn make_placeholder(&mut self) {
        self.reinit(FrameSpec::new(self.spec.dimensions, PixelLayout::Grey8));
        self.blank();
    }

    pub const fn spec(&self) -> FrameSpec {
        self.spec
    }

    pub const fn dimensions(&self) -> Dimensions {
        self.spec.dimensions
    }

    pub const fn layout(&self) -> PixelLayout {
        self.spec.layout
    }

    pub const fn width(&self) -> usize {
        self.spec.dimensions.width()
    }

    pub const fn height(&self) -> usize {
        self.spec.dimensions.height()
    }

    pub const fn channel_count(&self) -> usize {
        self.spec.layout.channel_count()
    }

    /// The raw pixel bytes, row major without padding.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The raw pixel bytes, row major without padding.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// An iterator over the rows of the frame.
    pub fn rows(&self) -> std::slice::Chunks<'_, u8> {
        self.data.chunks(self.spec.row_len())
    }
}

fn check_len(spec: FrameSpec, data: &[u8]) -> Result<(), FrameError> {
    let expected = spec
        .checked_buffer_len()
        .ok_or(FrameError::TooLarge(spec))?;

    if data.len() != expected {
        return Err(FrameError::WrongBufferLen {
            spec,
            expected,
            actual: data.len(),
        });
    }

    Ok(())
}

// The pixel data is huge and unreadable, so it's left out.
impl Debug for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("spec", &self.spec)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Indicates that pixel data didn't fit the [FrameSpec] it came with.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameError {
    #[error("A {spec} frame needs {expected} bytes but got {actual} bytes.")]
    WrongBufferLen {
        spec: FrameSpec,
        expected: usize,
        actual: usize,
    },
    #[error("A {0} frame doesn't fit in memory.")]
    TooLarge(FrameSpec),
    #[error("A {from} frame can't be reinterpreted as {to}.")]
    IncompatibleLayout { from: PixelLayout, to: PixelLayout },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(width: usize, height: usize, layout: PixelLayout) -> FrameSpec {
        FrameSpec::new((width, height).into(), layout)
    }

    #[test]
    fn from_data_checks_length() {
        let rgb = spec(2, 2, PixelLayout::Rgb8);

        assert!(Frame::from_data(rgb, vec![0; 12]).is_ok());
        assert_eq!(
            Frame::from_data(rgb, vec![0; 11]).unwrap_err(),
            FrameError::WrongBufferLen {
                spec: rgb,
                expected: 12,
                actual: 11
            }
        );
    }

    #[test]
    fn oversized_specs_are_rejected() {
        let huge = spec(usize::MAX / 2, 3, PixelLayout::Rgb8);

        assert_eq!(huge.checked_row_len(), None);
        assert_eq!(huge.checked_buffer_len(), None);
        assert_eq!(
            Frame::from_data(huge, vec![0; 4]).unwrap_err(),
            FrameError::TooLarge(huge)
        );

        let tall = spec(2, usize::MAX / 2, PixelLayout::Grey8);
        assert_eq!(tall.checked_row_len(), Some(2));
        assert_eq!(tall.checked_buffer_len(), None);
    }

    #[test]
    fn reinit_keeps_allocation() {
        let mut frame = Frame::new(spec(8, 8, PixelLayout::Rgba8));
        let ptr = frame.data().as_ptr();

        frame.reinit(spec(8, 8, PixelLayout::Grey8));

        assert_eq!(frame.data().len(), 64);
        assert_eq!(frame.data().as_ptr(), ptr);
    }

    #[test]
    fn placeholder_is_single_channel_and_zeroed() {
        let mut frame = Frame::from_data(spec(3, 2, PixelLayout::Rgb8), vec![7; 18]).unwrap();

        frame.make_placeholder();

        assert_eq!(frame.spec(), spec(3, 2, PixelLayout::Grey8));
        assert_eq!(frame.data(), &[0; 6]);
    }

    #[test]
    fn assign_rejects_short_data_without_changes() {
        let mut frame = Frame::new(spec(2, 1, PixelLayout::Grey8));

        assert!(frame.assign(spec(2, 2, PixelLayout::Grey8), &[1, 2, 3]).is_err());
        assert_eq!(frame.spec(), spec(2, 1, PixelLayout::Grey8));

        frame.assign(spec(2, 2, PixelLayout::Grey8), &[1, 2, 3, 4]).unwrap();
        assert_eq!(frame.rows().collect::<Vec<_>>(), vec![&[1, 2][..], &[3, 4][..]]);
    }
}
