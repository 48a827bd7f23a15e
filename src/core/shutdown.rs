//! Cancellation handle dan worker accounting
//!
//! `Shutdown` adalah sinyal satu arah (sekali trigger, tidak bisa di-reset)
//! yang bisa ditunggu dari thread mana pun. `WorkerGauge` menghitung worker
//! thread yang masih hidup.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct ShutdownInner {
    triggered: Mutex<bool>,
    signal: Condvar,
}

/// Clonable one-shot cancellation handle.
#[derive(Clone)]
pub struct Shutdown {
    inner: Arc<ShutdownInner>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownInner {
                triggered: Mutex::new(false),
                signal: Condvar::new(),
            }),
        }
    }

    /// Returns `true` for the call that actually flipped the flag.
    pub fn trigger(&self) -> bool {
        let mut triggered = self.inner.triggered.lock();
        if *triggered {
            return false;
        }
        *triggered = true;
        self.inner.signal.notify_all();
        true
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.triggered.lock()
    }

    /// Block sampai trigger.
    pub fn wait(&self) {
        let mut triggered = self.inner.triggered.lock();
        while !*triggered {
            self.inner.signal.wait(&mut triggered);
        }
    }

    /// Block sampai trigger atau timeout. Returns whether it was triggered.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut triggered = self.inner.triggered.lock();
        if !*triggered {
            self.inner.signal.wait_for(&mut triggered, timeout);
        }
        *triggered
    }
}

/// Jumlah worker thread yang masih berjalan
#[derive(Clone, Default)]
pub struct WorkerGauge {
    live: Arc<AtomicUsize>,
}

struct GaugeGuard(Arc<AtomicUsize>);

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl WorkerGauge {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    /// Spawn named OS thread yang terhitung di gauge selama berjalan.
    ///
    /// The count is taken before the thread starts, so `live()` never under-reports
    /// a worker that has been spawned but not scheduled yet.
    pub fn spawn<F, T>(&self, name: String, f: F) -> io::Result<JoinHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.live.fetch_add(1, Ordering::AcqRel);
        let guard = GaugeGuard(Arc::clone(&self.live));
        thread::Builder::new().name(name).spawn(move || {
            let _guard = guard;
            f()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_once() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.is_triggered());
        assert!(shutdown.trigger());
        assert!(!shutdown.trigger());
        assert!(shutdown.is_triggered());
        shutdown.wait();
    }

    #[test]
    fn test_wait_from_other_thread() {
        let shutdown = Shutdown::new();
        let waiter = {
            let shutdown = shutdown.clone();
            thread::spawn(move || shutdown.wait_timeout(Duration::from_secs(5)))
        };
        shutdown.trigger();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_wait_timeout_untriggered() {
        let shutdown = Shutdown::new();
        assert!(!shutdown.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_gauge_counts_live_workers() {
        let gauge = WorkerGauge::new();
        let gate = Shutdown::new();

        let handle = {
            let gate = gate.clone();
            gauge
                .spawn("gauge-test".to_string(), move || gate.wait())
                .unwrap()
        };
        assert_eq!(gauge.live(), 1);
        assert_eq!(handle.thread().name(), Some("gauge-test"));

        gate.trigger();
        handle.join().unwrap();
        assert_eq!(gauge.live(), 0);
    }
}
