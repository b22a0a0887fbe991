//! Bounded free lists of idle [Frame]s so buffers get reused instead of
//! reallocated for every image.

use crate::frame::Frame;

/// The default number of idle frames a [FramePool] holds on to.
pub const DEFAULT_POOL_CAPACITY: usize = 10;

/// A bounded stack of idle frames.
///
/// Pooling is best effort: acquiring from an empty pool just means the caller
/// allocates, and frames released into a full pool are dropped.
#[derive(Debug)]
pub struct FramePool {
    frames: Vec<Frame>,
    capacity: usize,
}

impl FramePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Take the most recently released frame, if there is one.
    pub fn acquire(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    /// Give a frame back. It's dropped if the pool is already full.
    pub fn release(&mut self, frame: Frame) {
        if self.frames.len() < self.capacity {
            self.frames.push(frame);
        }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_CAPACITY)
    }
}

/// Which pool a frame belongs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolRole {
    /// Frames holding pixels as they were read or decoded.
    Input,
    /// Second buffers that format conversion wrote into.
    Converted,
}

/// The pair of pools one stream's pipeline recycles into.
#[derive(Debug, Default)]
pub struct FramePools {
    input: FramePool,
    converted: FramePool,
}

impl FramePools {
    /// Both pools get the same capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            input: FramePool::new(capacity),
            converted: FramePool::new(capacity),
        }
    }

    pub fn acquire(&mut self, role: PoolRole) -> Option<Frame> {
        self.pool_mut(role).acquire()
    }

    pub fn release(&mut self, frame: Frame, role: PoolRole) {
        self.pool_mut(role).release(frame);
    }

    /// The number of idle frames in one pool.
    pub fn len(&self, role: PoolRole) -> usize {
        match role {
            PoolRole::Input => self.input.len(),
            PoolRole::Converted => self.converted.len(),
        }
    }

    fn pool_mut(&mut self, role: PoolRole) -> &mut FramePool {
        match role {
            PoolRole::Input => &mut self.input,
            PoolRole::Converted => &mut self.converted,
        }
    }
}
