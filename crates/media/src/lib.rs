//! This library replays the streams of a sensor recording into a [Sink].
//!
//! Records are handed to a [RecordDispatcher], which forwards each record's
//! blocks to the [StreamPlayer] registered for its stream. Camera streams get
//! a [FramePlayer], which decodes images on a per-stream worker thread and
//! only ever keeps the newest pending image when decoding falls behind.
//!
//! [Sink]: sink::Sink
//! [RecordDispatcher]: dispatch::RecordDispatcher
//! [StreamPlayer]: player::StreamPlayer
//! [FramePlayer]: player::FramePlayer

pub mod codec;
pub mod converter;
pub mod dispatch;
pub mod frame;
pub mod job_queue;
pub mod options;
pub mod player;
pub mod pool;
pub mod record;
pub mod sink;
