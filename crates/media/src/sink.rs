//! The [Sink] trait, where everything a player decodes ends up, plus two
//! implementations: [MemorySink] and [JsonLinesSink].
//!
//! Sinks have a notion of "current time" on any number of named timelines.
//! Every logged value (except static text) is stamped with the time that was
//! set last. Players on different threads log into the same sink, so the
//! concrete sinks here keep a separate time cursor for each calling thread.

use std::collections::{BTreeMap, HashMap};
use std::io::{self, Write};
use std::sync::Mutex;
use std::thread::{self, ThreadId};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const THREAD_PANIC_MSG: &str = "Another thread panicked while logging.";

/// Receives decoded data from players. Every call is fire and forget.
///
/// Sinks are shared between a reading thread and any number of worker threads.
pub trait Sink: Send + Sync {
    /// Set the calling thread's position on a timeline measured in seconds.
    fn set_time_seconds(&self, timeline: &str, seconds: f64);

    /// Set the calling thread's position on a timeline of sequence numbers.
    fn set_time_sequence(&self, timeline: &str, sequence: i64);

    /// Log an image with tightly packed, interleaved 8-bit channels.
    fn log_image(&self, path: &str, height: usize, width: usize, channels: usize, data: &[u8]);

    /// Log a text document at the current time.
    fn log_text(&self, path: &str, text: &str);

    /// Log a text document that applies regardless of time.
    fn log_static_text(&self, path: &str, text: &str);

    /// Log a series of scalars (e.g. a 3-axis sensor reading) at the current
    /// time.
    fn log_scalars(&self, path: &str, values: &[f64]);

    /// Forget the calling thread's time. Threads that are about to exit call
    /// this so the sink doesn't keep state for them around.
    fn clear_time(&self) {}
}

/// A position on one timeline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeValue {
    Seconds(f64),
    Sequence(i64),
}

/// The current position on every timeline that has been set, by timeline
/// name.
pub type TimeCursor = BTreeMap<String, TimeValue>;

/// Everything a [Sink] can receive (other than time changes), stamped with
/// the time it was logged at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SinkEvent {
    Image {
        path: String,
        time: TimeCursor,
        height: usize,
        width: usize,
        channels: usize,
        data: Vec<u8>,
    },
    Text {
        path: String,
        time: TimeCursor,
        text: String,
    },
    StaticText {
        path: String,
        text: String,
    },
    Scalars {
        path: String,
        time: TimeCursor,
        values: Vec<f64>,
    },
}

impl SinkEvent {
    pub fn path(&self) -> &str {
        match self {
            Self::Image { path, .. }
            | Self::Text { path, .. }
            | Self::StaticText { path, .. }
            | Self::Scalars { path, .. } => path,
        }
    }

    pub fn is_image(&self) -> bool {
        matches!(self, Self::Image { .. })
    }

    /// The time the event was logged at. Static text has none.
    pub fn time(&self) -> Option<&TimeCursor> {
        match self {
            Self::Image { time, .. } | Self::Text { time, .. } | Self::Scalars { time, .. } => {
                Some(time)
            }
            Self::StaticText { .. } => None,
        }
    }
}

/// One [TimeCursor] per thread.
#[derive(Debug, Default)]
struct ThreadCursors {
    cursors: Mutex<HashMap<ThreadId, TimeCursor>>,
}

impl ThreadCursors {
    fn set(&self, timeline: &str, value: TimeValue) {
        self.cursors
            .lock()
            .expect(THREAD_PANIC_MSG)
            .entry(thread::current().id())
            .or_default()
            .insert(timeline.to_owned(), value);
    }

    fn clear(&self) {
        self.cursors
            .lock()
            .expect(THREAD_PANIC_MSG)
            .remove(&thread::current().id());
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.cursors.lock().expect(THREAD_PANIC_MSG).len()
    }

    fn current(&self) -> TimeCursor {
        self.cursors
            .lock()
            .expect(THREAD_PANIC_MSG)
            .get(&thread::current().id())
            .cloned()
            .unwrap_or_default()
    }

    fn image(
        &self,
        path: &str,
        height: usize,
        width: usize,
        channels: usize,
        data: &[u8],
    ) -> SinkEvent {
        SinkEvent::Image {
            path: path.to_owned(),
            time: self.current(),
            height,
            width,
            channels,
            data: data.to_vec(),
        }
    }

    fn text(&self, path: &str, text: &str) -> SinkEvent {
        SinkEvent::Text {
            path: path.to_owned(),
            time: self.current(),
            text: text.to_owned(),
        }
    }

    fn scalars(&self, path: &str, values: &[f64]) -> SinkEvent {
        SinkEvent::Scalars {
            path: path.to_owned(),
            time: self.current(),
            values: values.to_vec(),
        }
    }
}

fn static_text(path: &str, text: &str) -> SinkEvent {
    SinkEvent::StaticText {
        path: path.to_owned(),
        text: text.to_owned(),
    }
}

/// A [Sink] that keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<SinkEvent>>,
    cursors: ThreadCursors,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of every event so far, in the order they were logged.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.lock().clone()
    }

    /// Removes and returns every event so far.
    pub fn take_events(&self) -> Vec<SinkEvent> {
        std::mem::take(&mut *self.lock())
    }

    /// Only the image events.
    pub fn images(&self) -> Vec<SinkEvent> {
        self.lock().iter().filter(|e| e.is_image()).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(&self, event: SinkEvent) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SinkEvent>> {
        self.events.lock().expect(THREAD_PANIC_MSG)
    }

    /// How many threads currently have a time cursor.
    #[cfg(test)]
    pub(crate) fn timed_thread_count(&self) -> usize {
        self.cursors.len()
    }
}

impl Sink for MemorySink {
    fn set_time_seconds(&self, timeline: &str, seconds: f64) {
        self.cursors.set(timeline, TimeValue::Seconds(seconds));
    }

    fn set_time_sequence(&self, timeline: &str, sequence: i64) {
        self.cursors.set(timeline, TimeValue::Sequence(sequence));
    }

    fn log_image(&self, path: &str, height: usize, width: usize, channels: usize, data: &[u8]) {
        self.push(self.cursors.image(path, height, width, channels, data));
    }

    fn log_text(&self, path: &str, text: &str) {
        self.push(self.cursors.text(path, text));
    }

    fn log_static_text(&self, path: &str, text: &str) {
        self.push(static_text(path, text));
    }

    fn log_scalars(&self, path: &str, values: &[f64]) {
        self.push(self.cursors.scalars(path, values));
    }

    fn clear_time(&self) {
        self.cursors.clear();
    }
}

/// Indicates that a concrete sink couldn't write an event.
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("Failed to write a sink event: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to serialize a sink event: {0}")]
    Json(#[from] serde_json::Error),
}

/// A [Sink] that writes each event as one line of JSON.
///
/// Write failures can't be returned through [Sink], so they're logged instead.
/// Only the first failure is reported as a warning.
#[derive(Debug)]
pub struct JsonLinesSink<W> {
    writer: Mutex<JsonWriter<W>>,
    cursors: ThreadCursors,
}

#[derive(Debug)]
struct JsonWriter<W> {
    inner: W,
    failed: bool,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(JsonWriter {
                inner: writer,
                failed: false,
            }),
            cursors: ThreadCursors::default(),
        }
    }

    /// Write one event, bypassing the [Sink] interface.
    pub fn write_event(&self, event: &SinkEvent) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().expect(THREAD_PANIC_MSG);
        serde_json::to_writer(&mut writer.inner, event)?;
        writer.inner.write_all(b"\n")?;
        Ok(())
    }

    /// Consumes the sink, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner().expect(THREAD_PANIC_MSG).inner
    }

    fn emit(&self, event: SinkEvent) {
        if let Err(err) = self.write_event(&event) {
            let mut writer = self.writer.lock().expect(THREAD_PANIC_MSG);
            if !writer.failed {
                writer.failed = true;
                log::warn!("JSON lines sink stopped working at {}: {err}", event.path());
            }
        }
    }
}

impl<W: Write + Send> Sink for JsonLinesSink<W> {
    fn set_time_seconds(&self, timeline: &str, seconds: f64) {
        self.cursors.set(timeline, TimeValue::Seconds(seconds));
    }

    fn set_time_sequence(&self, timeline: &str, sequence: i64) {
        self.cursors.set(timeline, TimeValue::Sequence(sequence));
    }

    fn log_image(&self, path: &str, height: usize, width: usize, channels: usize, data: &[u8]) {
        self.emit(self.cursors.image(path, height, width, channels, data));
    }

    fn log_text(&self, path: &str, text: &str) {
        self.emit(self.cursors.text(path, text));
    }

    fn log_static_text(&self, path: &str, text: &str) {
        self.emit(static_text(path, text));
    }

    fn log_scalars(&self, path: &str, values: &[f64]) {
        self.emit(self.cursors.scalars(path, values));
    }

    fn clear_time(&self) {
        self.cursors.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn events_are_stamped_with_the_current_time() {
        let sink = MemorySink::new();

        sink.log_text("a", "before");
        sink.set_time_seconds("timestamp", 1.5);
        sink.set_time_sequence("frame_number", 7);
        sink.log_scalars("b", &[1.0, 2.0, 3.0]);
        sink.log_static_text("c", "always");

        let events = sink.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].time(), Some(&TimeCursor::new()));

        let time = events[1].time().unwrap();
        assert_eq!(time.get("timestamp"), Some(&TimeValue::Seconds(1.5)));
        assert_eq!(time.get("frame_number"), Some(&TimeValue::Sequence(7)));

        assert_eq!(events[2].time(), None);
        assert_eq!(events[2].path(), "c");
    }

    #[test]
    fn each_thread_has_its_own_time() {
        let sink = Arc::new(MemorySink::new());
        sink.set_time_seconds("timestamp", 1.0);

        let other = Arc::clone(&sink);
        std::thread::spawn(move || {
            other.set_time_seconds("timestamp", 2.0);
            other.log_text("worker", "");
        })
        .join()
        .unwrap();

        sink.log_text("reader", "");

        let times: Vec<_> = sink
            .take_events()
            .iter()
            .map(|e| e.time().and_then(|t| t.get("timestamp")).copied())
            .collect();
        assert_eq!(
            times,
            vec![Some(TimeValue::Seconds(2.0)), Some(TimeValue::Seconds(1.0))]
        );
        assert!(sink.is_empty());
    }

    #[test]
    fn cleared_threads_leave_no_time_behind() {
        let sink = Arc::new(MemorySink::new());
        sink.set_time_seconds("timestamp", 1.0);

        let workers: Vec<_> = (0..4)
            .map(|i| {
                let sink = Arc::clone(&sink);
                std::thread::spawn(move || {
                    sink.set_time_sequence("frame_number", i);
                    sink.log_text("worker", "");
                    sink.clear_time();
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(sink.timed_thread_count(), 1);

        sink.clear_time();
        sink.log_text("reader", "");
        assert_eq!(sink.timed_thread_count(), 0);
        assert_eq!(sink.events().last().unwrap().time(), Some(&TimeCursor::new()));
    }

    #[test]
    fn json_lines_round_trip() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.set_time_sequence("frame_number", 3);
        sink.log_image("\"camera-1\"", 1, 2, 1, &[10, 20]);
        sink.log_static_text("\"camera-1\"/configuration", "x: 1\n");

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let events: Vec<SinkEvent> = output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();

        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0],
            SinkEvent::Image {
                path: "\"camera-1\"".into(),
                time: TimeCursor::from([("frame_number".into(), TimeValue::Sequence(3))]),
                height: 1,
                width: 2,
                channels: 1,
                data: vec![10, 20],
            }
        );
        assert!(matches!(events[1], SinkEvent::StaticText { .. }));
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_failures_do_not_panic() {
        let _ = env_logger::builder().is_test(true).try_init();
        let sink = JsonLinesSink::new(BrokenWriter);

        sink.log_text("a", "1");
        sink.log_text("a", "2");

        assert!(matches!(
            sink.write_event(&static_text("a", "3")),
            Err(SinkError::Json(_) | SinkError::Io(_))
        ));
    }
}
