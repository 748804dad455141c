//! Optional wall-clock watchdog (spec §5): arms a single background timer
//! at pipeline start; if the main thread doesn't cancel it before the
//! deadline, the process aborts with a fatal diagnostic.
//!
//! Grounded on the spec's own Design Note: "single timer task with a
//! one-shot cancellation signal; the main thread must always signal
//! cancellation on every exit path. A scoped helper guarantees this" — the
//! scope guard here is [`WatchdogGuard`]'s `Drop` impl.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

/// Armed for the duration of one compilation. Dropping it always sends the
/// cancellation signal, so every early return (including panics that
/// unwind) disarms the timer.
pub struct WatchdogGuard {
    cancel: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl WatchdogGuard {
    /// Spawns the timer thread when `timeout_ms` is `Some`; `on_timeout` is
    /// invoked from the timer thread if the deadline is reached before
    /// cancellation.
    pub fn arm(timeout_ms: Option<u64>, on_timeout: impl FnOnce() + Send + 'static) -> Self {
        let Some(timeout_ms) = timeout_ms else {
            return Self { cancel: None, handle: None };
        };
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            if rx.recv_timeout(Duration::from_millis(timeout_ms)).is_err() {
                on_timeout();
            }
        });
        Self { cancel: Some(tx), handle: Some(handle) }
    }

    /// No-op watchdog for callers (library embedders, tests) that never
    /// want the timer.
    pub fn disarmed() -> Self {
        Self { cancel: None, handle: None }
    }
}

impl Drop for WatchdogGuard {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn cancelling_before_deadline_suppresses_timeout() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        {
            let _guard = WatchdogGuard::arm(Some(500), move || fired_clone.store(true, Ordering::SeqCst));
        }
        thread::sleep(Duration::from_millis(50));
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn missed_deadline_invokes_callback() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        let guard = WatchdogGuard::arm(Some(10), move || fired_clone.store(true, Ordering::SeqCst));
        thread::sleep(Duration::from_millis(80));
        drop(guard);
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn disabled_watchdog_never_fires() {
        let fired = Arc::new(AtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        let guard = WatchdogGuard::arm(None, move || fired_clone.store(true, Ordering::SeqCst));
        drop(guard);
        assert!(!fired.load(Ordering::SeqCst));
    }
}
