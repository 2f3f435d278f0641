//! One-shot signals shared between the controller and the monitor.
//!
//! A [`Latch`] is set at most once and can be awaited by any number of
//! tasks, before or after it fires. Later `set` calls are ignored, so the
//! first value sticks.

use std::sync::Arc;
use tokio::sync::watch;

use crate::utils::current_timestamp_secs;

#[derive(Debug)]
pub struct Latch<T: Clone> {
    tx: watch::Sender<Option<T>>,
}

impl<T: Clone> Latch<T> {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Fire the latch. Returns `false` if it had already fired.
    pub fn set(&self, value: T) -> bool {
        self.tx.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
            true
        })
    }

    pub fn get(&self) -> Option<T> {
        self.tx.borrow().clone()
    }

    pub fn is_set(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// Wait until the latch fires and return its value.
    pub async fn wait(&self) -> T {
        let mut rx = self.tx.subscribe();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(value) = current {
                return value;
            }
            // The sender lives in `self`, so the channel cannot close here.
            let _ = rx.changed().await;
        }
    }
}

impl<T: Clone> Default for Latch<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the supervised process, as seen by everyone but its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: u32,
    /// The process leads its own group, so this equals `pid`
    pub pgid: u32,
}

/// Payload of the `started` signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Started {
    pub process: ProcessHandle,
    /// Seconds since the Unix epoch
    pub start_time: f64,
}

/// Why `stop` was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TimedOut,
    MonitorFailed,
    Cancelled,
}

/// The three lifecycle signals of one operation.
#[derive(Debug, Default)]
pub struct Signals {
    pub started: Latch<Started>,
    pub stop: Latch<StopReason>,
    /// Seconds since the Unix epoch at which exit was observed
    pub ended: Latch<f64>,
}

impl Signals {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn mark_started(&self, process: ProcessHandle) -> Started {
        let started = Started {
            process,
            start_time: current_timestamp_secs(),
        };
        self.started.set(started);
        started
    }

    pub fn mark_ended(&self) -> f64 {
        let now = current_timestamp_secs();
        self.ended.set(now);
        self.ended.get().unwrap_or(now)
    }

    /// Ask the controller to terminate the process group.
    pub fn request_stop(&self, reason: StopReason) {
        self.stop.set(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_latch_fires_once() {
        let latch = Latch::new();
        assert!(!latch.is_set());
        assert!(latch.set(1));
        assert!(!latch.set(2));
        assert_eq!(latch.get(), Some(1));
    }

    #[tokio::test]
    async fn test_latch_wakes_every_waiter() {
        let latch: Arc<Latch<u32>> = Arc::new(Latch::new());

        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let latch = latch.clone();
                tokio::spawn(async move { latch.wait().await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(20)).await;
        latch.set(7);

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), 7);
        }

        // Waiting after the fact returns immediately.
        assert_eq!(latch.wait().await, 7);
    }

    #[test]
    fn test_mark_ended_keeps_first_time() {
        let signals = Signals::new();
        let first = signals.mark_ended();
        let second = signals.mark_ended();
        assert_eq!(first, second);
    }
}
