//! This module defines the [Inbox] and [Outbox] types for working with a
//! one-way SPSC (single producer single consumer) queue.
//!
//! The queue is unbounded: sending never blocks the producer. Closing happens
//! by dropping one of the two ends. Messages that were sent before the outbox
//! was dropped can still be received, only after those run out does the inbox
//! report [ChannelError::ConnectionDropped].

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

use super::{ChannelError, ChannelResult, THREAD_PANIC_MSG};

/// The inbox (message receiver) of a one-way message channel. Also see
/// [Outbox].
///
/// See [new] and [with_capacity] to construct.
#[derive(Debug)]
pub struct Inbox<T> {
    channel: Arc<OneWayChannel<T>>,
}

impl<T> Inbox<T> {
    /// Waits for a message from the outbox until one appears, returning the
    /// oldest message in the queue.
    ///
    /// A [ChannelError::ConnectionDropped] error is returned if the outbox was
    /// dropped and there are no more messages in the queue.
    ///
    /// Also see [Self::check].
    pub fn wait(&self) -> ChannelResult<T> {
        let mut state = self.channel.lock();

        loop {
            if let Some(msg) = state.queue.pop_front() {
                return Ok(msg);
            }

            if state.outbox_dropped {
                return Err(ChannelError::ConnectionDropped);
            }

            // Spurious wakeups just take us around the loop again.
            state = self.channel.notifier.wait(state).expect(THREAD_PANIC_MSG);
        }
    }

    /// Receives the oldest message from the outbox if one is waiting, returning
    /// [None] otherwise. This never waits for a message to be sent, it only
    /// waits for the queue's lock.
    ///
    /// A [ChannelError::ConnectionDropped] error is returned if the outbox was
    /// dropped and there are no more messages in the queue.
    ///
    /// Also see [Self::wait].
    pub fn check(&self) -> ChannelResult<Option<T>> {
        let mut state = self.channel.lock();

        match state.queue.pop_front() {
            Some(msg) => Ok(Some(msg)),
            None if state.outbox_dropped => Err(ChannelError::ConnectionDropped),
            None => Ok(None),
        }
    }

    /// The number of messages that have been sent but not received yet.
    pub fn pending(&self) -> usize {
        self.channel.lock().queue.len()
    }

    /// Whether the outbox is still alive.
    pub fn connection_open(&self) -> bool {
        !self.channel.lock().outbox_dropped
    }
}

impl<T> Drop for Inbox<T> {
    fn drop(&mut self) {
        let mut state = self.channel.lock();
        state.inbox_dropped = true;

        // Nobody will ever read these, so there's no reason to hold onto them
        // until the outbox goes away too.
        state.queue.clear();
    }
}

/// The outbox (message sender) of a one-way message channel. Also see
/// [Inbox].
///
/// See [new] and [with_capacity] to construct.
#[derive(Debug)]
pub struct Outbox<T> {
    channel: Arc<OneWayChannel<T>>,
}

impl<T> Outbox<T> {
    /// Sends a message to the inbox, returning the number of messages that have
    /// been sent but not received (after sending the message). This function
    /// never blocks waiting on the inbox.
    ///
    /// A [ChannelError::ConnectionDropped] error is returned if the inbox was
    /// dropped. The message is dropped along with the error.
    pub fn send(&self, msg: T) -> ChannelResult<usize> {
        let mut state = self.channel.lock();

        if state.inbox_dropped {
            return Err(ChannelError::ConnectionDropped);
        }

        state.queue.push_back(msg);
        let in_flight = state.queue.len();

        self.channel.notifier.notify_one();

        Ok(in_flight)
    }

    /// The number of messages that have been sent but not received.
    pub fn messages_in_flight(&self) -> usize {
        self.channel.lock().queue.len()
    }

    /// Whether the inbox is still alive.
    pub fn connection_open(&self) -> bool {
        !self.channel.lock().inbox_dropped
    }
}

// The inbox may be blocked in `wait`. The flag has to be set while holding the
// lock, otherwise the inbox could check the flag, miss the notification and
// sleep forever.
impl<T> Drop for Outbox<T> {
    fn drop(&mut self) {
        let mut state = self.channel.lock();
        state.outbox_dropped = true;
        drop(state);

        self.channel.notifier.notify_one();
    }
}

/// Create a one-way message channel's [Inbox] and [Outbox].
///
/// - The inbox will be able to receive messages as long as the outbox hasn't
///   been dropped or while there are still pending messages.
/// - The outbox will be able to send messages as long as the inbox hasn't been
///   dropped.
pub fn new<T>() -> (Inbox<T>, Outbox<T>) {
    with_capacity(0)
}

/// Create a one-way message channel's [Inbox] and [Outbox] with space to store
/// `capacity` messages without reallocating memory. More messages than
/// `capacity` can still sit in the inbox at a time (the channel is not
/// bounded).
pub fn with_capacity<T>(capacity: usize) -> (Inbox<T>, Outbox<T>) {
    let channel = Arc::new(OneWayChannel {
        state: Mutex::new(ChannelState {
            queue: VecDeque::with_capacity(capacity),
            inbox_dropped: false,
            outbox_dropped: false,
        }),
        notifier: Condvar::new(),
    });

    (
        Inbox {
            channel: channel.clone(),
        },
        Outbox { channel },
    )
}

#[derive(Debug)]
struct OneWayChannel<T> {
    state: Mutex<ChannelState<T>>,
    notifier: Condvar,
}

impl<T> OneWayChannel<T> {
    fn lock(&self) -> MutexGuard<'_, ChannelState<T>> {
        self.state.lock().expect(THREAD_PANIC_MSG)
    }
}

#[derive(Debug)]
struct ChannelState<T> {
    queue: VecDeque<T>,
    inbox_dropped: bool,
    outbox_dropped: bool,
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn messages_arrive_in_order() {
        let (inbox, outbox) = new::<i32>();

        let thread = thread::spawn(move || {
            assert!(outbox.send(1).is_ok());
            assert!(outbox.send(2).is_ok());
            assert!(outbox.send(3).is_ok());
        });

        assert_eq!(inbox.wait(), Ok(1));
        assert_eq!(inbox.wait(), Ok(2));
        assert_eq!(inbox.wait(), Ok(3));

        thread.join().unwrap();
    }

    #[test]
    fn check_does_not_wait() {
        let (inbox, outbox) = new::<i32>();

        assert_eq!(inbox.check(), Ok(None));

        assert_eq!(outbox.send(1), Ok(1));
        assert_eq!(outbox.send(2), Ok(2));

        assert_eq!(inbox.check(), Ok(Some(1)));
        assert_eq!(inbox.check(), Ok(Some(2)));
        assert_eq!(inbox.check(), Ok(None));
    }

    #[test]
    fn pending_messages_survive_outbox_drop() {
        let (inbox, outbox) = new::<i32>();

        outbox.send(1).unwrap();
        outbox.send(2).unwrap();
        drop(outbox);

        assert!(!inbox.connection_open());
        assert_eq!(inbox.wait(), Ok(1));
        assert_eq!(inbox.check(), Ok(Some(2)));
        assert_eq!(inbox.check(), Err(ChannelError::ConnectionDropped));
        assert_eq!(inbox.wait(), Err(ChannelError::ConnectionDropped));
    }

    #[test]
    fn dropping_outbox_wakes_waiting_inbox() {
        let (inbox, outbox) = new::<i32>();

        let thread = thread::spawn(move || inbox.wait());

        thread::sleep(Duration::from_millis(50));
        drop(outbox);

        assert_eq!(thread.join().unwrap(), Err(ChannelError::ConnectionDropped));
    }

    #[test]
    fn send_fails_after_inbox_drop() {
        let (inbox, outbox) = with_capacity::<i32>(4);

        assert_eq!(outbox.send(1), Ok(1));
        drop(inbox);

        assert!(!outbox.connection_open());
        assert_eq!(outbox.messages_in_flight(), 0);
        assert_eq!(outbox.send(2), Err(ChannelError::ConnectionDropped));
    }

    #[test]
    fn lots_of_messages_are_ok() {
        let (inbox, outbox) = new::<i32>();

        let thread = thread::spawn(move || {
            for i in 1..=10_000 {
                assert!(outbox.send(i).is_ok());
            }
        });

        for i in 1..=10_000 {
            assert_eq!(inbox.wait(), Ok(i));
        }

        thread.join().unwrap();
        assert_eq!(inbox.pending(), 0);
    }
}
