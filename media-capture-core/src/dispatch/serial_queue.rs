use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread::{self, ThreadId};

use parking_lot::Mutex;

use crate::models::error::CaptureError;

/// A unit of work submitted to an executor.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs jobs, in submission order, somewhere else.
///
/// The UI/main-thread marshalling point is an `Executor` injected into the
/// controllers; `SerialQueue` is the default implementation.
pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// A named single-worker execution context.
///
/// Jobs run strictly one after another on a dedicated thread, like a serial
/// dispatch queue. Each component that needs serialization owns its own
/// queue; there is no process-wide shared queue.
///
/// A job that panics is logged and skipped; the worker keeps serving the
/// rest of the queue.
///
/// Dropping the queue closes its channel; the worker finishes any queued
/// jobs and exits. Drop never joins, so a queue may be dropped from its own
/// worker.
pub struct SerialQueue {
    label: String,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    worker: ThreadId,
}

impl SerialQueue {
    pub fn new(label: &str) -> Result<Self, CaptureError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let worker_label = label.to_string();
        let handle = thread::Builder::new()
            .name(label.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
                        log::error!("{worker_label}: job panicked: {}", panic_message(payload.as_ref()));
                    }
                }
            })
            .map_err(|e| CaptureError::DeviceConfigurationFailed(format!("failed to spawn {label} thread: {e}")))?;

        Ok(Self {
            label: label.to_string(),
            worker: handle.thread().id(),
            sender: Mutex::new(Some(sender)),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Whether the calling thread is this queue's worker.
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.worker
    }

    /// Run `f` on the queue and wait for its result.
    ///
    /// Runs inline when called from the queue's own worker. If the worker is
    /// gone, `f` runs on the caller. A panic in `f` resumes on the caller
    /// and leaves the queue usable.
    pub fn sync<R, F>(&self, f: F) -> R
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        if self.is_current() {
            return f();
        }

        let (tx, rx) = mpsc::sync_channel::<thread::Result<R>>(1);
        let job: Job = Box::new(move || {
            let _ = tx.send(panic::catch_unwind(AssertUnwindSafe(f)));
        });

        let rejected = {
            let guard = self.sender.lock();
            match guard.as_ref() {
                Some(sender) => sender.send(job).err().map(|e| e.0),
                None => Some(job),
            }
        };

        if let Some(job) = rejected {
            log::warn!("{}: worker unavailable, running job on caller", self.label);
            job();
        }

        // The worker drains its channel before exiting, so an accepted job
        // always reports back.
        let outcome = rx.recv().unwrap_or_else(|_| {
            let lost: Box<dyn Any + Send> = Box::new(format!("{}: job dropped unexecuted", self.label));
            Err(lost)
        });
        match outcome {
            Ok(value) => value,
            Err(payload) => panic::resume_unwind(payload),
        }
    }

    /// Enqueue `f` without waiting.
    pub fn dispatch<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let guard = self.sender.lock();
        if let Some(sender) = guard.as_ref() {
            if sender.send(Box::new(f)).is_err() {
                log::warn!("{}: worker gone, job dropped", self.label);
            }
        }
    }

    /// Block until every job submitted before this call has run.
    pub fn flush(&self) {
        self.sync(|| ());
    }
}

impl Executor for SerialQueue {
    fn execute(&self, job: Job) {
        self.dispatch(job);
    }
}

impl Drop for SerialQueue {
    fn drop(&mut self) {
        self.sender.lock().take();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
