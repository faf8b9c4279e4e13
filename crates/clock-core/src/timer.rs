//! Periodic timer (C2): fires a caller-supplied action on a fixed interval
//! until stopped.
//!
//! Unlike the originating C++ timer (whose worker loop never re-checks its
//! stop flag once started), this timer checks its active flag at the top of
//! every iteration so `stop()` deterministically ends the worker within one
//! sleep interval.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// A periodic callback running on a dedicated worker thread.
///
/// Created stopped; call [`PeriodicTimer::start`] to begin firing. Dropping an
/// active timer stops it first, so the worker never leaks.
pub struct PeriodicTimer {
    active: Arc<AtomicBool>,
    interval_ms: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
    name: &'static str,
}

impl PeriodicTimer {
    /// Creates a stopped timer. `name` is used to label the worker thread.
    pub fn new(name: &'static str) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            interval_ms: Arc::new(AtomicU64::new(0)),
            worker: None,
            name,
        }
    }

    /// Returns the current firing interval in milliseconds.
    pub fn interval(&self) -> u64 {
        self.interval_ms.load(Ordering::Acquire)
    }

    /// Sets the firing interval. Takes effect from the next sleep onward.
    pub fn set_interval(&self, interval_ms: u64) {
        self.interval_ms.store(interval_ms, Ordering::Release);
    }

    /// Adds `delta_ms` to the current interval.
    pub fn increment_interval(&self, delta_ms: i64) {
        self.interval_ms
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |cur| {
                Some((cur as i64 + delta_ms).max(0) as u64)
            })
            .ok();
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire) && self.worker.is_some()
    }

    /// Starts firing `action` every `interval_ms`. If already running, the prior
    /// worker is stopped first. Returns immediately; `action` runs on a new thread.
    pub fn start<F>(&mut self, interval_ms: u64, action: F)
    where
        F: Fn() + Send + 'static,
    {
        if self.is_running() {
            self.stop();
        }
        self.set_interval(interval_ms);
        self.active.store(true, Ordering::Release);

        let active = self.active.clone();
        let interval_ms = self.interval_ms.clone();
        let handle = std::thread::Builder::new()
            .name(self.name.into())
            .spawn(move || {
                while active.load(Ordering::Acquire) {
                    let wait = Duration::from_millis(interval_ms.load(Ordering::Acquire));
                    std::thread::sleep(wait);
                    if !active.load(Ordering::Acquire) {
                        break;
                    }
                    action();
                }
            })
            .expect("failed to spawn timer thread");

        self.worker = Some(handle);
    }

    /// Stops the timer and blocks until the worker has exited. A no-op if not running.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        if self.is_running() {
            self.stop();
        }
    }
}
