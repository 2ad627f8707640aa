//! The execution context on which outcomes are delivered.
//!
//! # Design
//! Transports complete on arbitrary threads. Every caller-visible callback
//! and every completion hook is posted to a single `MainContext` instead, so
//! code running there can touch UI state without further synchronization.
//!
//! `MainQueue` is a channel the host drains from its own loop.
//! `SerialContext` owns a dedicated delivery thread and is the default for
//! hosts with no UI thread: callbacks never run on the caller's stack and
//! never run concurrently. `InlineContext` runs jobs immediately on the
//! posting thread; it only suits transports that complete on the caller's
//! thread, such as test doubles.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait MainContext: Send + Sync {
    fn dispatch(&self, job: Job);
}

/// Runs jobs on whichever thread posts them.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineContext;

impl MainContext for InlineContext {
    fn dispatch(&self, job: Job) {
        job();
    }
}

/// Runs jobs one at a time, in posting order, on a thread of its own.
///
/// The thread exits once the context is dropped and the queued jobs ran.
pub struct SerialContext {
    sender: Mutex<Sender<Job>>,
    thread: ThreadId,
}

impl SerialContext {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::spawn(move || {
            for job in receiver {
                job();
            }
            tracing::trace!("delivery thread finished");
        });
        Self {
            sender: Mutex::new(sender),
            thread: handle.thread().id(),
        }
    }

    /// The thread every job runs on.
    pub fn thread_id(&self) -> ThreadId {
        self.thread
    }
}

impl Default for SerialContext {
    fn default() -> Self {
        Self::new()
    }
}

impl MainContext for SerialContext {
    fn dispatch(&self, job: Job) {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        if sender.send(job).is_err() {
            tracing::error!("delivery thread is gone, dropping job");
        }
    }
}

/// FIFO queue of jobs, drained by the owner of the main thread.
pub struct MainQueue {
    sender: Sender<Job>,
    receiver: Mutex<Receiver<Job>>,
}

impl MainQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
        }
    }

    /// Run every job already queued. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Some(job) = self.try_next() {
            job();
            ran += 1;
        }
        ran
    }

    /// Wait up to `timeout` for one job and run it. Returns `false` on
    /// timeout.
    pub fn run_next(&self, timeout: Duration) -> bool {
        let job = {
            let receiver = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.recv_timeout(timeout)
        };
        match job {
            Ok(job) => {
                job();
                true
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => false,
        }
    }

    fn try_next(&self) -> Option<Job> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .try_recv()
            .ok()
    }
}

impl Default for MainQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MainContext for MainQueue {
    fn dispatch(&self, job: Job) {
        // The receiver lives as long as `self`, so sending cannot fail.
        let _ = self.sender.send(job);
    }
}
