//! Signal handling: SIGTERM/SIGINT request a graceful shutdown.
//!
//! Uses `signal-hook` flag registration. Loops poll [`SignalHandler`] instead
//! of blocking on signals, and sleeps are sliced so a request is noticed
//! within one slice.

#![allow(missing_docs)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use signal_hook::consts::{SIGINT, SIGTERM};

/// Longest uninterrupted nap inside [`SignalHandler::sleep`].
pub const SLEEP_SLICE: Duration = Duration::from_millis(200);

/// Shutdown flag shared between the OS signal hooks and the polling loop.
#[derive(Debug, Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a handler with SIGTERM and SIGINT hooked to the shutdown flag.
    ///
    /// Registration failures are reported on stderr and are not fatal.
    pub fn new() -> Self {
        let handler = Self::detached();
        for (signal, name) in [(SIGTERM, "SIGTERM"), (SIGINT, "SIGINT")] {
            if let Err(e) = signal_hook::flag::register(signal, Arc::clone(&handler.shutdown_flag))
            {
                eprintln!("[OPS-SIGNAL] failed to register {name}: {e}");
            }
        }
        handler
    }

    /// Handler that only reacts to [`SignalHandler::request_shutdown`].
    #[must_use]
    pub fn detached() -> Self {
        Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    /// Sleep up to `duration`. Returns `false` as soon as shutdown is requested.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.should_shutdown() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handler_starts_clear() {
        let handler = SignalHandler::detached();
        assert!(!handler.should_shutdown());
    }

    #[test]
    fn request_is_visible_through_clones() {
        let handler = SignalHandler::detached();
        let clone = handler.clone();
        clone.request_shutdown();
        assert!(handler.should_shutdown());
    }

    #[test]
    fn sleep_completes_without_request() {
        let handler = SignalHandler::detached();
        let started = Instant::now();
        assert!(handler.sleep(Duration::from_millis(50)));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn sleep_is_cut_short_by_request() {
        let handler = SignalHandler::detached();
        let remote = handler.clone();
        let waker = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            remote.request_shutdown();
        });
        let started = Instant::now();
        assert!(!handler.sleep(Duration::from_secs(30)));
        assert!(started.elapsed() < Duration::from_secs(5));
        waker.join().unwrap();
    }

    #[test]
    fn handler_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SignalHandler>();
    }
}
