//! The [PixelCodec] trait, the seam between the pipeline and whatever actually
//! understands pixel formats, plus [ImageCodec], an implementation backed by
//! the `image` crate.

use image::DynamicImage;
use thiserror::Error;

use crate::frame::{Dimensions, Frame, FrameError, FrameSpec, PixelLayout};
use crate::record::{ImageFormat, ImageSpec};

/// Turns image blocks into [Frame]s and frames into canonical pixel layouts.
///
/// Every method that produces a frame takes an optional recycled frame. An
/// implementation should write into it when it can (its buffer is already
/// allocated) and is free to drop it and allocate a new one when it can't.
///
/// Codecs get shared between a stream's reading thread and its worker, so the
/// pipeline requires `Send + Sync` implementations.
#[cfg_attr(test, mockall::automock)]
pub trait PixelCodec {
    /// Read uncompressed pixels described by `spec`.
    fn decode_raw(
        &self,
        data: &[u8],
        spec: &ImageSpec,
        frame: Option<Frame>,
    ) -> Result<Frame, CodecError>;

    /// Decode one frame of a video stream. Called in record order on the
    /// reading thread.
    fn decode_video(
        &self,
        data: &[u8],
        spec: &ImageSpec,
        frame: Option<Frame>,
    ) -> Result<Frame, CodecError>;

    /// Decode a compressed image.
    fn decode_compressed(
        &self,
        data: &[u8],
        format: &ImageFormat,
        frame: Option<Frame>,
    ) -> Result<Frame, CodecError>;

    /// Convert `frame` to a canonical [PixelLayout].
    ///
    /// Returns [None] if the conversion happened inside `frame` itself (which
    /// includes the case where there was nothing to do). Otherwise the
    /// converted pixels are returned in a second frame, which should be
    /// `spare` if one was provided (take it out of the [Option]).
    fn normalize_format(
        &self,
        frame: &mut Frame,
        spare: &mut Option<Frame>,
    ) -> Result<Option<Frame>, CodecError>;
}

/// Indicates that a [PixelCodec] couldn't produce a frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Image format \"{0}\" is not supported.")]
    UnsupportedFormat(ImageFormat),
    #[error("The image data is malformed: {0}")]
    Malformed(String),
    #[error("The image needs at least {expected} bytes but the block has {actual} bytes.")]
    WrongBufferLen { expected: usize, actual: usize },
    #[error("A row stride of {stride} bytes is shorter than a {row_len} byte row.")]
    BadStride { stride: usize, row_len: usize },
    #[error("A {0} image doesn't fit in memory.")]
    TooLarge(ImageSpec),
    #[error("Decoded images can't have a 0-length side ({0}x{1} has no area).")]
    ZeroLengthSide(u32, u32),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

impl CodecError {
    /// Whether this error means the format can't be handled at all, as opposed
    /// to this particular image being broken.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedFormat(_))
    }
}

/// A [PixelCodec] built on the `image` crate.
///
/// - Raw frames in any [PixelLayout] are read (row padding gets removed).
/// - JPEG and PNG images are decoded. Other compressed formats and video are
///   reported as [CodecError::UnsupportedFormat].
/// - Frames are normalized to [Grey8](PixelLayout::Grey8),
///   [Rgb8](PixelLayout::Rgb8) or [Rgba8](PixelLayout::Rgba8). BGR(A) is
///   swizzled in place, 16-bit grey needs a second buffer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl PixelCodec for ImageCodec {
    fn decode_raw(
        &self,
        data: &[u8],
        spec: &ImageSpec,
        frame: Option<Frame>,
    ) -> Result<Frame, CodecError> {
        let frame_spec = spec.frame_spec();
        let too_large = || CodecError::TooLarge(spec.clone());

        // Sizes come straight from the record, so nothing is trusted until
        // it's known to fit.
        let row_len = frame_spec.checked_row_len().ok_or_else(too_large)?;
        frame_spec.checked_buffer_len().ok_or_else(too_large)?;
        let height = frame_spec.dimensions.height();

        let stride = match spec.stride {
            Some(stride) if stride < row_len => {
                return Err(CodecError::BadStride { stride, row_len });
            }
            Some(stride) => stride,
            None => row_len,
        };

        // Padding after the last row is optional.
        let expected = stride
            .checked_mul(height - 1)
            .and_then(|padded| padded.checked_add(row_len))
            .ok_or_else(too_large)?;
        let len_ok = if spec.stride.is_some() {
            data.len() >= expected
        } else {
            data.len() == expected
        };
        if !len_ok {
            return Err(CodecError::WrongBufferLen {
                expected,
                actual: data.len(),
            });
        }

        let mut frame = reuse_or_allocate(frame, frame_spec);
        for (dst, src) in frame
            .data_mut()
            .chunks_exact_mut(row_len)
            .zip(data.chunks(stride))
        {
            dst.copy_from_slice(&src[..row_len]);
        }

        Ok(frame)
    }

    fn decode_video(
        &self,
        _data: &[u8],
        _spec: &ImageSpec,
        _frame: Option<Frame>,
    ) -> Result<Frame, CodecError> {
        Err(CodecError::UnsupportedFormat(ImageFormat::Video))
    }

    fn decode_compressed(
        &self,
        data: &[u8],
        format: &ImageFormat,
        frame: Option<Frame>,
    ) -> Result<Frame, CodecError> {
        let image_format = match format {
            ImageFormat::Jpg => image::ImageFormat::Jpeg,
            ImageFormat::Png => image::ImageFormat::Png,
            other => return Err(CodecError::UnsupportedFormat(other.clone())),
        };

        let decoded = image::load_from_memory_with_format(data, image_format)
            .map_err(|err| CodecError::Malformed(err.to_string()))?;

        let (width, height) = (decoded.width(), decoded.height());
        let dimensions = Dimensions::new(width as usize, height as usize)
            .ok_or(CodecError::ZeroLengthSide(width, height))?;

        let (layout, bytes) = match decoded {
            DynamicImage::ImageLuma8(buf) => (PixelLayout::Grey8, buf.into_raw()),
            DynamicImage::ImageRgb8(buf) => (PixelLayout::Rgb8, buf.into_raw()),
            DynamicImage::ImageRgba8(buf) => (PixelLayout::Rgba8, buf.into_raw()),
            DynamicImage::ImageLuma16(buf) => (
                PixelLayout::Grey16,
                buf.into_raw()
                    .into_iter()
                    .flat_map(u16::to_le_bytes)
                    .collect(),
            ),
            other => (PixelLayout::Rgba8, other.to_rgba8().into_raw()),
        };

        let spec = FrameSpec::new(dimensions, layout);

        match frame {
            Some(mut frame) => {
                frame.assign(spec, &bytes)?;
                Ok(frame)
            }
            None => Ok(Frame::from_data(spec, bytes)?),
        }
    }

    fn normalize_format(
        &self,
        frame: &mut Frame,
        spare: &mut Option<Frame>,
    ) -> Result<Option<Frame>, CodecError> {
        match frame.layout() {
            PixelLayout::Grey8 | PixelLayout::Rgb8 | PixelLayout::Rgba8 => Ok(None),

            PixelLayout::Bgr8 => {
                swap_red_blue(frame.data_mut(), 3);
                frame.reinterpret(PixelLayout::Rgb8)?;
                Ok(None)
            }

            PixelLayout::Bgra8 => {
                swap_red_blue(frame.data_mut(), 4);
                frame.reinterpret(PixelLayout::Rgba8)?;
                Ok(None)
            }

            PixelLayout::Grey16 => {
                let spec = FrameSpec::new(frame.dimensions(), PixelLayout::Grey8);
                let mut converted = reuse_or_allocate(spare.take(), spec);

                // Keep the most significant byte of each little endian sample.
                for (dst, src) in converted
                    .data_mut()
                    .iter_mut()
                    .zip(frame.data().chunks_exact(2))
                {
                    *dst = src[1];
                }

                Ok(Some(converted))
            }
        }
    }
}

fn reuse_or_allocate(frame: Option<Frame>, spec: FrameSpec) -> Frame {
    match frame {
        Some(mut frame) => {
            frame.reinit(spec);
            frame
        }
        None => Frame::new(spec),
    }
}

fn swap_red_blue(data: &mut [u8], bytes_per_pixel: usize) {
    for pixel in data.chunks_exact_mut(bytes_per_pixel) {
        pixel.swap(0, 2);
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{GrayImage, RgbImage};

    use super::*;

    fn encode(image: DynamicImage, format: image::ImageFormat) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, format).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn raw_round_trips_packed_rows() {
        let spec = ImageSpec::raw((3, 2).into(), PixelLayout::Rgb8);
        let data: Vec<u8> = (0..18).collect();

        let frame = ImageCodec.decode_raw(&data, &spec, None).unwrap();

        assert_eq!(frame.spec(), spec.frame_spec());
        assert_eq!(frame.data(), data.as_slice());
    }

    #[test]
    fn raw_strips_row_padding() {
        let spec = ImageSpec::raw((2, 3).into(), PixelLayout::Grey8).with_stride(4);
        // The last row's padding is missing, which is allowed.
        let data = [1, 2, 0xEE, 0xEE, 3, 4, 0xEE, 0xEE, 5, 6];

        let frame = ImageCodec.decode_raw(&data, &spec, None).unwrap();

        assert_eq!(frame.data(), &[1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn raw_rejects_truncated_data_and_short_strides() {
        let spec = ImageSpec::raw((4, 4).into(), PixelLayout::Grey8);
        assert_eq!(
            ImageCodec.decode_raw(&[0; 15], &spec, None),
            Err(CodecError::WrongBufferLen {
                expected: 16,
                actual: 15
            })
        );

        let spec = spec.with_stride(3);
        assert_eq!(
            ImageCodec.decode_raw(&[0; 16], &spec, None),
            Err(CodecError::BadStride {
                stride: 3,
                row_len: 4
            })
        );
    }

    #[test]
    fn raw_rejects_sizes_that_overflow() {
        let spec = ImageSpec::raw((4, 3).into(), PixelLayout::Grey8).with_stride(usize::MAX / 2);
        assert_eq!(
            ImageCodec.decode_raw(&[0; 16], &spec, None),
            Err(CodecError::TooLarge(spec))
        );

        let spec = ImageSpec::raw((usize::MAX / 2, 3).into(), PixelLayout::Rgb8);
        assert_eq!(
            ImageCodec.decode_raw(&[0; 16], &spec, None),
            Err(CodecError::TooLarge(spec))
        );

        let spec = ImageSpec::raw((1, usize::MAX).into(), PixelLayout::Grey16);
        let err = ImageCodec.decode_raw(&[0; 16], &spec, None).unwrap_err();
        assert_eq!(err, CodecError::TooLarge(spec));
        assert!(!err.is_unsupported());
    }

    #[test]
    fn raw_reuses_recycled_buffer() {
        let recycled = Frame::new(FrameSpec::new((8, 8).into(), PixelLayout::Rgba8));
        let ptr = recycled.data().as_ptr();
        let spec = ImageSpec::raw((4, 4).into(), PixelLayout::Grey8);

        let frame = ImageCodec
            .decode_raw(&[9; 16], &spec, Some(recycled))
            .unwrap();

        assert_eq!(frame.data().as_ptr(), ptr);
        assert_eq!(frame.data(), &[9; 16]);
    }

    #[test]
    fn png_decodes_to_matching_layout() {
        let rgb = RgbImage::from_fn(3, 2, |x, y| image::Rgb([x as u8, y as u8, 200]));
        let png = encode(DynamicImage::ImageRgb8(rgb.clone()), image::ImageFormat::Png);

        let frame = ImageCodec
            .decode_compressed(&png, &ImageFormat::Png, None)
            .unwrap();

        assert_eq!(
            frame.spec(),
            FrameSpec::new((3, 2).into(), PixelLayout::Rgb8)
        );
        assert_eq!(frame.data(), rgb.as_raw().as_slice());
    }

    #[test]
    fn jpeg_decodes_grey_images() {
        let grey = GrayImage::from_pixel(8, 8, image::Luma([128]));
        let jpg = encode(DynamicImage::ImageLuma8(grey), image::ImageFormat::Jpeg);

        let frame = ImageCodec
            .decode_compressed(&jpg, &ImageFormat::Jpg, None)
            .unwrap();

        assert_eq!(frame.layout(), PixelLayout::Grey8);
        assert_eq!(frame.dimensions(), (8, 8).into());
    }

    #[test]
    fn compressed_failures_are_classified() {
        let garbage = ImageCodec
            .decode_compressed(&[1, 2, 3, 4], &ImageFormat::Jpg, None)
            .unwrap_err();
        assert!(matches!(garbage, CodecError::Malformed(_)));
        assert!(!garbage.is_unsupported());

        let jxl = ImageCodec
            .decode_compressed(&[0xFF, 0x0A], &ImageFormat::Jxl, None)
            .unwrap_err();
        assert_eq!(jxl, CodecError::UnsupportedFormat(ImageFormat::Jxl));
        assert!(jxl.is_unsupported());
    }

    #[test]
    fn bgr_is_swizzled_in_place() {
        let spec = FrameSpec::new((2, 1).into(), PixelLayout::Bgr8);
        let mut frame = Frame::from_data(spec, vec![1, 2, 3, 4, 5, 6]).unwrap();

        let converted = ImageCodec.normalize_format(&mut frame, &mut None).unwrap();

        assert!(converted.is_none());
        assert_eq!(frame.layout(), PixelLayout::Rgb8);
        assert_eq!(frame.data(), &[3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn grey16_is_written_to_the_spare_frame() {
        let spec = FrameSpec::new((2, 1).into(), PixelLayout::Grey16);
        let mut frame =
            Frame::from_data(spec, [0x1234u16, 0xABCD].iter().flat_map(|v| v.to_le_bytes()).collect())
                .unwrap();
        let spare = Frame::new(FrameSpec::new((16, 16).into(), PixelLayout::Rgba8));
        let spare_ptr = spare.data().as_ptr();
        let mut spare = Some(spare);

        let converted = ImageCodec
            .normalize_format(&mut frame, &mut spare)
            .unwrap()
            .unwrap();

        assert!(spare.is_none());
        assert_eq!(converted.data().as_ptr(), spare_ptr);
        assert_eq!(converted.layout(), PixelLayout::Grey8);
        assert_eq!(converted.data(), &[0x12, 0xAB]);
    }

    #[test]
    fn canonical_layouts_are_left_alone() {
        let spec = FrameSpec::new((1, 1).into(), PixelLayout::Rgba8);
        let mut frame = Frame::from_data(spec, vec![1, 2, 3, 4]).unwrap();
        let mut spare = Some(Frame::new(spec));

        assert_eq!(ImageCodec.normalize_format(&mut frame, &mut spare), Ok(None));
        assert!(spare.is_some());
        assert_eq!(frame.data(), &[1, 2, 3, 4]);
    }

    #[test]
    fn video_is_unsupported() {
        let spec = ImageSpec::new(ImageFormat::Video, (2, 2).into(), PixelLayout::Rgb8);
        assert_eq!(
            ImageCodec.decode_video(&[], &spec, None),
            Err(CodecError::UnsupportedFormat(ImageFormat::Video))
        );
    }
}
