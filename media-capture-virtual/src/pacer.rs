//! Fixed-period worker thread shared by the virtual devices.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use media_capture_core::CaptureError;

/// Runs a tick closure on a named thread once per period until stopped.
///
/// Ticks are scheduled against the start instant, not the previous tick,
/// so a slow consumer delays frames but does not stretch the timeline.
pub(crate) struct PacedWorker {
    running: Arc<AtomicBool>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl PacedWorker {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(false)),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn start<F>(&self, name: &str, period: Duration, mut tick: F) -> Result<(), CaptureError>
    where
        F: FnMut(u64) + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CaptureError::DeviceConfigurationFailed(format!("{name} already running")));
        }

        let running = Arc::clone(&self.running);
        let spawned = thread::Builder::new().name(name.to_string()).spawn(move || {
            let origin = Instant::now();
            let mut index: u64 = 0;
            while running.load(Ordering::SeqCst) {
                tick(index);
                index += 1;
                let deadline = origin + period.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX));
                let now = Instant::now();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
            }
        });

        match spawned {
            Ok(handle) => {
                *self.handle.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(CaptureError::DeviceUnavailable(format!("failed to spawn {name} thread: {e}")))
            }
        }
    }

    /// Stop ticking. Joins the worker unless called from the worker itself,
    /// in which case the loop exits after the current tick returns.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            log::error!("virtual device thread panicked");
        }
    }
}

impl Drop for PacedWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn ticks_until_stopped() {
        let worker = PacedWorker::new();
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);
        worker
            .start("pacer-test", Duration::from_millis(5), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        thread::sleep(Duration::from_millis(60));
        worker.stop();

        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 2);
        assert!(!worker.is_running());
        thread::sleep(Duration::from_millis(30));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn second_start_is_rejected() {
        let worker = PacedWorker::new();
        worker.start("pacer-test", Duration::from_millis(10), |_| {}).unwrap();
        assert!(matches!(
            worker.start("pacer-test", Duration::from_millis(10), |_| {}),
            Err(CaptureError::DeviceConfigurationFailed(_))
        ));
        worker.stop();
    }

    #[test]
    fn stop_from_worker_thread_does_not_join() {
        let worker = Arc::new(PacedWorker::new());
        let inner = Arc::clone(&worker);
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);
        worker
            .start("pacer-test", Duration::from_millis(2), move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                inner.stop();
            })
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while worker.is_running() {
            assert!(Instant::now() < deadline, "worker did not stop");
            thread::sleep(Duration::from_millis(2));
        }
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
    }
}
