//! Contains [FramePlayer], the player for streams of images.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use util::channels::message_channel::Inbox;

use super::{StreamPlayer, log_record_metadata};
use crate::converter::{ConvertError, FrameConverter, NormalizeMode, SharedCodec};
use crate::frame::Frame;
use crate::job_queue::{self, ImageJob, JobHandler, JobQueue, TimePoint};
use crate::options::PlayerOptions;
use crate::pool::PoolRole;
use crate::record::{ImageBlock, ImageFormat, MetadataLayout, RecordInfo, RecordType, StreamId};
use crate::sink::Sink;

/// Where a [FramePlayer] is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    /// No image has been seen yet.
    Uninitialized,
    /// The first image was logged. While `blank_mode` is set the sink only
    /// has a placeholder, which the worker's first frame replaces.
    Streaming { blank_mode: bool },
    /// An image couldn't be decoded. Nothing from the stream gets logged
    /// anymore. There's no way out of this state.
    Disabled,
}

/// A snapshot of a [FramePlayer]'s counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlayerStats {
    pub images_received: u64,
    pub jobs_queued: u64,
    pub frames_decoded: u64,
    /// Jobs that a newer job replaced before the worker got to them.
    pub frames_skipped: u64,
    pub frames_logged: u64,
    pub idle_input_frames: usize,
    pub idle_converted_frames: usize,
}

#[derive(Debug, Default)]
struct Counters {
    images_received: AtomicU64,
    jobs_queued: AtomicU64,
    frames_decoded: AtomicU64,
    frames_skipped: AtomicU64,
    frames_logged: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Everything the reading thread and the worker share.
struct Pipeline {
    stream: StreamId,
    entity_path: String,
    sink: Arc<dyn Sink>,
    converter: FrameConverter,
    timestamp_timeline: String,
    sequence_timeline: String,
    enabled: AtomicBool,
    blank_mode: AtomicBool,
    counters: Counters,
}

impl Pipeline {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Turn the stream off for good. Only the first call logs.
    fn disable(&self, format: &ImageFormat, err: &ConvertError) {
        if self.enabled.swap(false, Ordering::AcqRel) {
            let reason = if err.is_unsupported() {
                "unsupported format"
            } else {
                "decode failure"
            };
            log::warn!(
                "Disabling stream {} after failing to read a {format} image ({reason}): {err}",
                self.stream
            );
        }
    }

    fn set_time(&self, time: TimePoint) {
        self.sink
            .set_time_seconds(&self.timestamp_timeline, time.seconds);
        if let Some(sequence) = time.sequence {
            self.sink.set_time_sequence(&self.sequence_timeline, sequence);
        }
    }

    fn log_frame(&self, frame: &Frame) {
        self.sink.log_image(
            &self.entity_path,
            frame.height(),
            frame.width(),
            frame.channel_count(),
            frame.data(),
        );
        bump(&self.counters.frames_logged);
    }
}

/// Runs on a stream's worker thread.
struct FrameWorker {
    pipeline: Arc<Pipeline>,
}

impl JobHandler for FrameWorker {
    fn process(&mut self, mut job: ImageJob) {
        let pipeline = &*self.pipeline;
        let converter = &pipeline.converter;

        if !pipeline.is_enabled() {
            if let Some(frame) = job.take_frame() {
                converter.release(frame, PoolRole::Input);
            }
            return;
        }

        let format = job.format.clone();
        let time = job.time;

        let converted = converter.decode(job).and_then(|frame| {
            bump(&pipeline.counters.frames_decoded);
            converter.normalize(frame, NormalizeMode::Canonical)
        });

        match converted {
            Ok(converted) => {
                if pipeline.is_enabled() {
                    pipeline.set_time(time);
                    pipeline.log_frame(converted.frame());
                    pipeline.blank_mode.store(false, Ordering::Release);
                }
                converter.recycle(converted);
            }
            Err(err) => pipeline.disable(&format, &err),
        }
    }

    fn skip(&mut self, mut job: ImageJob) {
        bump(&self.pipeline.counters.frames_skipped);
        if let Some(frame) = job.take_frame() {
            self.pipeline.converter.release(frame, PoolRole::Input);
        }
    }
}

/// Logs the images of one stream, decoding them on a background worker.
///
/// The first image is decoded right away on the calling thread so the stream
/// has something in the sink before anything asynchronous happens. Later
/// images become [ImageJob]s for the worker, which only ever works on the
/// newest job it has (see [job_queue]). Raw and video pixels are still read on
/// the calling thread since they're borrowed from the reader, compressed
/// images are copied and decoded on the worker.
///
/// If any image fails to decode the player disables itself and ignores the
/// rest of the stream.
pub struct FramePlayer {
    pipeline: Arc<Pipeline>,
    placeholder_first_frame: bool,
    sequence_field: String,
    sequence: Option<i64>,
    first_image_seen: bool,
    queue: Option<JobQueue>,
    #[cfg(test)]
    worker_gate: Option<std::sync::mpsc::Receiver<()>>,
}

impl FramePlayer {
    pub fn new(
        stream: StreamId,
        sink: Arc<dyn Sink>,
        codec: SharedCodec,
        options: &PlayerOptions,
    ) -> Self {
        let pipeline = Pipeline {
            stream,
            entity_path: stream.entity_path(),
            sink,
            converter: FrameConverter::new(codec, options.pool_capacity),
            timestamp_timeline: options.timestamp_timeline.clone(),
            sequence_timeline: options.sequence_timeline.clone(),
            enabled: AtomicBool::new(true),
            blank_mode: AtomicBool::new(false),
            counters: Counters::default(),
        };

        Self {
            pipeline: Arc::new(pipeline),
            placeholder_first_frame: options.placeholder_first_frame,
            sequence_field: options.sequence_field.clone(),
            sequence: None,
            first_image_seen: false,
            queue: None,
            #[cfg(test)]
            worker_gate: None,
        }
    }

    pub fn stream(&self) -> StreamId {
        self.pipeline.stream
    }

    pub fn state(&self) -> PlayerState {
        if !self.pipeline.is_enabled() {
            PlayerState::Disabled
        } else if !self.first_image_seen {
            PlayerState::Uninitialized
        } else {
            PlayerState::Streaming {
                blank_mode: self.pipeline.blank_mode.load(Ordering::Acquire),
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.pipeline.is_enabled()
    }

    pub fn stats(&self) -> PlayerStats {
        let counters = &self.pipeline.counters;
        let (idle_input_frames, idle_converted_frames) = self.pipeline.converter.pool_occupancy();

        PlayerStats {
            images_received: counters.images_received.load(Ordering::Relaxed),
            jobs_queued: counters.jobs_queued.load(Ordering::Relaxed),
            frames_decoded: counters.frames_decoded.load(Ordering::Relaxed),
            frames_skipped: counters.frames_skipped.load(Ordering::Relaxed),
            frames_logged: counters.frames_logged.load(Ordering::Relaxed),
            idle_input_frames,
            idle_converted_frames,
        }
    }

    /// Close the job queue and wait for the worker to finish what's left.
    pub fn shutdown(&mut self) {
        if let Some(mut queue) = self.queue.take() {
            queue.close();
        }
    }

    /// Keep the worker from taking its first job until something is sent
    /// through (or the sender is dropped).
    #[cfg(test)]
    fn hold_worker_until(&mut self, gate: std::sync::mpsc::Receiver<()>) {
        self.worker_gate = Some(gate);
    }

    fn show_first_image(&mut self, block: &ImageBlock<'_>, time: TimePoint) -> bool {
        let pipeline = &*self.pipeline;
        let converter = &pipeline.converter;

        let mode = if self.placeholder_first_frame {
            NormalizeMode::Placeholder
        } else {
            NormalizeMode::Canonical
        };

        let converted = converter.read_block(block).and_then(|frame| {
            bump(&pipeline.counters.frames_decoded);
            converter.normalize(frame, mode)
        });

        match converted {
            Ok(converted) => {
                pipeline.set_time(time);
                pipeline.log_frame(converted.frame());
                pipeline
                    .blank_mode
                    .store(mode == NormalizeMode::Placeholder, Ordering::Release);
                converter.recycle(converted);
                true
            }
            Err(err) => {
                pipeline.disable(&block.spec.format, &err);
                false
            }
        }
    }

    fn make_job(&self, block: &ImageBlock<'_>, time: TimePoint) -> Result<ImageJob, ConvertError> {
        let format = block.spec.format.clone();

        if format.is_read_synchronously() {
            let frame = self.pipeline.converter.read_block(block)?;
            bump(&self.pipeline.counters.frames_decoded);
            Ok(ImageJob::decoded(format, frame, time))
        } else {
            Ok(ImageJob::compressed(format, block.data.to_vec(), time))
        }
    }

    fn send(&mut self, job: ImageJob) -> bool {
        if self.queue.is_none() {
            match self.start_worker() {
                Ok(queue) => self.queue = Some(queue),
                Err(err) => {
                    log::warn!(
                        "Failed to start a decode worker for stream {}: {err}",
                        self.pipeline.stream
                    );
                    self.pipeline.enabled.store(false, Ordering::Release);
                    return false;
                }
            }
        }

        let Some(queue) = &self.queue else {
            return false;
        };

        match queue.send(job) {
            Ok(_) => {
                bump(&self.pipeline.counters.jobs_queued);
                true
            }
            Err(err) => {
                log::warn!(
                    "The decode worker for stream {} is gone: {err}",
                    self.pipeline.stream
                );
                false
            }
        }
    }

    fn start_worker(&mut self) -> std::io::Result<JobQueue> {
        let mut worker = FrameWorker {
            pipeline: Arc::clone(&self.pipeline),
        };

        #[cfg(test)]
        let gate = self.worker_gate.take();

        JobQueue::spawn(
            format!("decode {}", self.pipeline.stream),
            move |inbox: Inbox<ImageJob>| {
                #[cfg(test)]
                if let Some(gate) = gate {
                    _ = gate.recv();
                }

                job_queue::run_worker(&inbox, &mut worker);
                worker.pipeline.sink.clear_time();
            },
        )
    }
}

impl StreamPlayer for FramePlayer {
    fn on_metadata_read(
        &mut self,
        record: &RecordInfo,
        _block_index: usize,
        layout: &MetadataLayout,
    ) -> bool {
        if !self.pipeline.is_enabled() {
            return false;
        }

        let pipeline = &*self.pipeline;
        log_record_metadata(
            &*pipeline.sink,
            &pipeline.entity_path,
            &pipeline.timestamp_timeline,
            record,
            layout,
        );

        if record.record_type == RecordType::Data {
            match layout
                .get_u64(&self.sequence_field)
                .and_then(|n| i64::try_from(n).ok())
            {
                Some(sequence) => {
                    self.sequence = Some(sequence);
                    pipeline
                        .sink
                        .set_time_sequence(&pipeline.sequence_timeline, sequence);
                }
                None => log::debug!(
                    "Stream {} data record has no usable \"{}\" field.",
                    pipeline.stream,
                    self.sequence_field
                ),
            }

            pipeline.sink.log_text(
                &format!("{}/data", pipeline.entity_path),
                &layout.to_string(),
            );
        }

        true
    }

    fn on_image_read(
        &mut self,
        record: &RecordInfo,
        _block_index: usize,
        block: &ImageBlock<'_>,
    ) -> bool {
        bump(&self.pipeline.counters.images_received);

        if !self.pipeline.is_enabled() {
            return false;
        }

        let time = TimePoint::new(record.timestamp, self.sequence);

        if !self.first_image_seen {
            self.first_image_seen = true;
            return self.show_first_image(block, time);
        }

        match self.make_job(block, time) {
            Ok(job) => self.send(job),
            Err(err) => {
                self.pipeline.disable(&block.spec.format, &err);
                false
            }
        }
    }

    fn shutdown(&mut self) {
        FramePlayer::shutdown(self);
    }
}

impl Drop for FramePlayer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
