//! This module contains the [DropJoinHandle] type, a thin wrapper type around
//! [JoinHandle] that joins the thread when the handle is dropped (RAII style).

use std::io;
use std::ops::Deref;
use std::thread::{self, JoinHandle};

/// A thin wrapper around [JoinHandle] that joins the thread when the handle is
/// dropped (RAII style).
///
/// A panic on the joined thread is ignored when joining happens on drop. Use
/// [Self::join] to observe it.
#[derive(Debug)]
pub struct DropJoinHandle<T>(Option<JoinHandle<T>>);

impl<T> DropJoinHandle<T> {
    /// Create from an existing join handle.
    pub fn new(handle: JoinHandle<T>) -> Self {
        Self(Some(handle))
    }

    /// Join the thread now, returning what it returned (or the panic payload
    /// if it panicked).
    pub fn join(mut self) -> thread::Result<T> {
        self.0.take().expect(EXPECT_MSG).join()
    }
}

impl<T> Deref for DropJoinHandle<T> {
    type Target = JoinHandle<T>;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref().expect(EXPECT_MSG)
    }
}

impl<T> From<JoinHandle<T>> for DropJoinHandle<T> {
    fn from(handle: JoinHandle<T>) -> Self {
        Self::new(handle)
    }
}

impl<T> Drop for DropJoinHandle<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            _ = handle.join();
        }
    }
}

/// The same as [thread::spawn], but a [DropJoinHandle] is returned instead.
pub fn spawn<F, T>(f: F) -> DropJoinHandle<T>
where
    F: FnOnce() -> T,
    F: Send + 'static,
    T: Send + 'static,
{
    DropJoinHandle::new(thread::spawn(f))
}

/// Spawn a thread with a name (visible in debuggers and panic messages).
///
/// Fails only if the OS refuses to create the thread.
pub fn spawn_named<F, T>(name: impl Into<String>, f: F) -> io::Result<DropJoinHandle<T>>
where
    F: FnOnce() -> T,
    F: Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .map(DropJoinHandle::new)
}

const EXPECT_MSG: &str = "The handle should be present.";
