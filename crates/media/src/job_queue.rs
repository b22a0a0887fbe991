//! The queue between a stream's reading thread and its decode worker.
//!
//! The worker doesn't try to keep up with every job. Each time it wakes up it
//! takes everything that's queued, throws away all but the newest job and
//! processes that one. When decoding is slower than reading, frames get
//! skipped instead of piling up. Order is never changed, only thinned out.

use std::io;

use util::channels::message_channel::{self, Inbox, Outbox};
use util::channels::{ChannelError, ChannelResult};
use util::drop_join_thread::{self, DropJoinHandle};

use crate::frame::Frame;
use crate::record::ImageFormat;

/// The record time an image should be logged at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePoint {
    pub seconds: f64,
    pub sequence: Option<i64>,
}

impl TimePoint {
    pub const fn new(seconds: f64, sequence: Option<i64>) -> Self {
        Self { seconds, sequence }
    }
}

/// One unit of decode work.
///
/// For formats read on the reading thread the pixels are already in
/// [Self::frame]. For compressed formats [Self::data] holds a copy of the
/// image block's bytes.
#[derive(Debug)]
pub struct ImageJob {
    pub format: ImageFormat,
    pub frame: Option<Frame>,
    pub data: Vec<u8>,
    pub time: TimePoint,
}

impl ImageJob {
    /// A job for pixels that were already read.
    pub fn decoded(format: ImageFormat, frame: Frame, time: TimePoint) -> Self {
        Self {
            format,
            frame: Some(frame),
            data: Vec::new(),
            time,
        }
    }

    /// A job for compressed bytes that still need decoding.
    pub fn compressed(format: ImageFormat, data: Vec<u8>, time: TimePoint) -> Self {
        Self {
            format,
            frame: None,
            data,
            time,
        }
    }

    pub fn take_frame(&mut self) -> Option<Frame> {
        self.frame.take()
    }
}

/// What a worker does with the jobs it receives.
pub trait JobHandler {
    /// Decode and log the newest job of a drain.
    fn process(&mut self, job: ImageJob);

    /// A job was superseded by a newer one before it got processed. Its frame
    /// (if any) should be recycled.
    fn skip(&mut self, job: ImageJob);
}

/// Handles one worker wake-up: waits for a job, swaps it for any newer ones
/// that are already queued (skipping the older ones) and processes the last.
///
/// Returns `false` once the queue is closed and empty.
pub fn drain_latest<H: JobHandler + ?Sized>(inbox: &Inbox<ImageJob>, handler: &mut H) -> bool {
    let Ok(mut job) = inbox.wait() else {
        return false;
    };

    // An error here means the queue was closed after `job` was sent, which
    // still leaves `job` to process.
    while let Ok(Some(newer)) = inbox.check() {
        handler.skip(std::mem::replace(&mut job, newer));
    }

    handler.process(job);
    true
}

/// Drains the queue until it's closed.
pub fn run_worker<H: JobHandler + ?Sized>(inbox: &Inbox<ImageJob>, handler: &mut H) {
    while drain_latest(inbox, handler) {}
}

/// The sending end of a job queue plus the worker thread on the other end.
///
/// Dropping the queue closes it: the worker finishes the job it's on, drains
/// whatever is left and then exits. Dropping also waits for that.
#[derive(Debug)]
pub struct JobQueue {
    outbox: Option<Outbox<ImageJob>>,
    worker: Option<DropJoinHandle<()>>,
}

impl JobQueue {
    /// Start a named worker thread running `worker` on the receiving end of a
    /// new queue. The worker usually just calls [run_worker].
    pub fn spawn<F>(name: impl Into<String>, worker: F) -> io::Result<Self>
    where
        F: FnOnce(Inbox<ImageJob>) + Send + 'static,
    {
        let (inbox, outbox) = message_channel::new();
        let worker = drop_join_thread::spawn_named(name, move || worker(inbox))?;

        Ok(Self {
            outbox: Some(outbox),
            worker: Some(worker),
        })
    }

    /// Queue a job, returning the number of jobs waiting for the worker. This
    /// never blocks.
    ///
    /// The job is dropped and an error returned if the queue was closed or the
    /// worker is gone.
    pub fn send(&self, job: ImageJob) -> ChannelResult<usize> {
        self.outbox
            .as_ref()
            .ok_or(ChannelError::ConnectionDropped)?
            .send(job)
    }

    /// The number of jobs the worker hasn't picked up yet.
    pub fn pending(&self) -> usize {
        self.outbox
            .as_ref()
            .map_or(0, |outbox| outbox.messages_in_flight())
    }

    pub fn is_open(&self) -> bool {
        self.outbox.is_some()
    }

    /// Close the queue and wait for the worker to exit. Calling this more than
    /// once does nothing.
    pub fn close(&mut self) {
        self.outbox = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("A decode worker panicked.");
            }
        }
    }
}

impl Drop for JobQueue {
    fn drop(&mut self) {
        self.close();
    }
}
