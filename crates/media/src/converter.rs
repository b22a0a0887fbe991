//! Turns image blocks and jobs into canonical frames using a [PixelCodec],
//! drawing buffers from and returning them to a stream's [FramePools].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;

use crate::codec::{CodecError, PixelCodec};
use crate::frame::Frame;
use crate::job_queue::ImageJob;
use crate::pool::{FramePools, PoolRole};
use crate::record::{ImageBlock, ImageFormat};

const THREAD_PANIC_MSG: &str = "Another thread panicked while holding the frame pools.";

/// A codec that can be shared with a stream's worker.
pub type SharedCodec = Arc<dyn PixelCodec + Send + Sync>;

/// Indicates that a frame couldn't be produced. Either way the stream that
/// the frame came from gets disabled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("A {0} job arrived without the frame that should have been read for it.")]
    MissingFrame(ImageFormat),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ConvertError {
    /// `true` for formats that can't be handled at all, `false` for images
    /// that were broken.
    pub fn is_unsupported(&self) -> bool {
        match self {
            Self::MissingFrame(_) => false,
            Self::Codec(err) => err.is_unsupported(),
        }
    }
}

/// How [FrameConverter::normalize] should treat a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizeMode {
    /// Replace the pixels with a blank single channel placeholder of the same
    /// size. No format conversion takes place.
    Placeholder,
    /// Convert to a canonical layout.
    Canonical,
}

/// The result of normalizing a frame.
#[derive(Debug, PartialEq, Eq)]
pub enum ConvertedFrame {
    /// The frame that went in, converted in place.
    InPlace(Frame),
    /// A second buffer holding the converted pixels. The original frame was
    /// already recycled.
    ProducedNew(Frame),
}

impl ConvertedFrame {
    pub fn frame(&self) -> &Frame {
        match self {
            Self::InPlace(frame) | Self::ProducedNew(frame) => frame,
        }
    }

    /// The pool the frame goes back to when it's no longer needed.
    pub fn pool_role(&self) -> PoolRole {
        match self {
            Self::InPlace(_) => PoolRole::Input,
            Self::ProducedNew(_) => PoolRole::Converted,
        }
    }

    pub fn into_frame(self) -> Frame {
        match self {
            Self::InPlace(frame) | Self::ProducedNew(frame) => frame,
        }
    }
}

/// Decodes and normalizes frames for one stream.
///
/// The converter is shared between the reading thread and the stream's
/// worker. The pools are only locked for acquiring or releasing a frame, never
/// while decoding.
pub struct FrameConverter {
    codec: SharedCodec,
    pools: Mutex<FramePools>,
    // Whether the last conversion needed a second buffer, in which case the
    // next one probably does too and gets a pooled spare up front.
    needs_converted_frame: AtomicBool,
}

impl FrameConverter {
    pub fn new(codec: SharedCodec, pool_capacity: usize) -> Self {
        Self {
            codec,
            pools: Mutex::new(FramePools::new(pool_capacity)),
            needs_converted_frame: AtomicBool::new(false),
        }
    }

    /// Read the pixels of an image block on the calling thread.
    pub fn read_block(&self, block: &ImageBlock<'_>) -> Result<Frame, ConvertError> {
        let recycled = self.acquire(PoolRole::Input);

        let frame = match &block.spec.format {
            ImageFormat::Raw => self.codec.decode_raw(block.data, block.spec, recycled),
            ImageFormat::Video => self.codec.decode_video(block.data, block.spec, recycled),
            compressed => self.codec.decode_compressed(block.data, compressed, recycled),
        }?;

        Ok(frame)
    }

    /// Get the pixels for a job. Raw and video jobs already carry their frame,
    /// anything else is decoded from the job's bytes.
    pub fn decode(&self, mut job: ImageJob) -> Result<Frame, ConvertError> {
        if job.format.is_read_synchronously() {
            return job.take_frame().ok_or(ConvertError::MissingFrame(job.format));
        }

        // A compressed job shouldn't carry a frame, but if it does it's a
        // perfectly good buffer.
        let recycled = job.take_frame().or_else(|| self.acquire(PoolRole::Input));

        Ok(self
            .codec
            .decode_compressed(&job.data, &job.format, recycled)?)
    }

    /// Bring a frame into a shape the sink understands.
    ///
    /// On failure the frame is recycled before the error is returned.
    pub fn normalize(
        &self,
        mut frame: Frame,
        mode: NormalizeMode,
    ) -> Result<ConvertedFrame, ConvertError> {
        if mode == NormalizeMode::Placeholder {
            frame.make_placeholder();
            return Ok(ConvertedFrame::InPlace(frame));
        }

        let mut spare = if self.needs_converted_frame.load(Ordering::Relaxed) {
            self.acquire(PoolRole::Converted)
        } else {
            None
        };

        let result = self.codec.normalize_format(&mut frame, &mut spare);

        if let Some(spare) = spare {
            self.release(spare, PoolRole::Converted);
        }

        match result {
            Ok(None) => {
                self.needs_converted_frame.store(false, Ordering::Relaxed);
                Ok(ConvertedFrame::InPlace(frame))
            }
            Ok(Some(converted)) => {
                self.needs_converted_frame.store(true, Ordering::Relaxed);
                self.release(frame, PoolRole::Input);
                Ok(ConvertedFrame::ProducedNew(converted))
            }
            Err(err) => {
                self.release(frame, PoolRole::Input);
                Err(err.into())
            }
        }
    }

    /// Return a frame that's done being used.
    pub fn recycle(&self, converted: ConvertedFrame) {
        let role = converted.pool_role();
        self.release(converted.into_frame(), role);
    }

    /// Return a frame to a specific pool.
    pub fn release(&self, frame: Frame, role: PoolRole) {
        self.pools.lock().expect(THREAD_PANIC_MSG).release(frame, role);
    }

    pub fn acquire(&self, role: PoolRole) -> Option<Frame> {
        self.pools.lock().expect(THREAD_PANIC_MSG).acquire(role)
    }

    /// The number of idle frames in each pool, `(input, converted)`.
    pub fn pool_occupancy(&self) -> (usize, usize) {
        let pools = self.pools.lock().expect(THREAD_PANIC_MSG);
        (pools.len(PoolRole::Input), pools.len(PoolRole::Converted))
    }
}
