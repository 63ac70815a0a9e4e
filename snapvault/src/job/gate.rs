//! Cooperative pause/stop gate checked between units of work.
//!
//! The archive loops run on the blocking thread pool, so the gate exposes
//! a synchronous [`WorkGate::checkpoint`] built on a condition variable: a
//! paused worker sleeps on the condvar instead of polling, and a stop
//! request wakes it immediately. The async side of the controller waits on
//! the cancellation token instead.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;

/// Outcome of a checkpoint between two units of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFlow {
    /// Proceed with the next unit.
    Continue,
    /// Stop was requested; abandon the remaining units.
    Cancelled,
}

pub struct WorkGate {
    paused: Mutex<bool>,
    resumed: Condvar,
    cancel: CancellationToken,
}

impl WorkGate {
    pub fn new() -> Self {
        Self {
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn pause(&self) {
        *lock(&self.paused) = true;
    }

    pub fn resume(&self) {
        *lock(&self.paused) = false;
        self.resumed.notify_all();
    }

    /// Request a stop. Wakes any worker blocked in a paused checkpoint;
    /// stop always wins over pause.
    pub fn cancel(&self) {
        self.cancel.cancel();
        let _guard = lock(&self.paused);
        self.resumed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Resolve once a stop has been requested.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    /// Called between units of work. Returns immediately while running;
    /// blocks on the condvar while paused, re-checking the stop flag on
    /// every wakeup.
    pub fn checkpoint(&self) -> UnitFlow {
        if self.cancel.is_cancelled() {
            return UnitFlow::Cancelled;
        }

        let mut paused = lock(&self.paused);
        while *paused {
            if self.cancel.is_cancelled() {
                return UnitFlow::Cancelled;
            }
            paused = self
                .resumed
                .wait(paused)
                .unwrap_or_else(PoisonError::into_inner);
        }

        UnitFlow::Continue
    }
}

impl Default for WorkGate {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_checkpoint_passes_while_running() {
        let gate = WorkGate::new();
        assert_eq!(gate.checkpoint(), UnitFlow::Continue);
    }

    #[test]
    fn test_checkpoint_reports_cancellation() {
        let gate = WorkGate::new();
        gate.cancel();
        assert_eq!(gate.checkpoint(), UnitFlow::Cancelled);
    }

    #[test]
    fn test_pause_blocks_until_resume() {
        let gate = Arc::new(WorkGate::new());
        gate.pause();

        let (tx, rx) = mpsc::channel();
        let worker_gate = Arc::clone(&gate);
        let worker = thread::spawn(move || {
            tx.send(worker_gate.checkpoint()).unwrap();
        });

        // The worker should be parked on the condvar, not finishing.
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());

        gate.resume();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            UnitFlow::Continue
        );
        worker.join().unwrap();
    }

    #[test]
    fn test_stop_wins_over_pause() {
        let gate = Arc::new(WorkGate::new());
        gate.pause();

        let (tx, rx) = mpsc::channel();
        let worker_gate = Arc::clone(&gate);
        let worker = thread::spawn(move || {
            tx.send(worker_gate.checkpoint()).unwrap();
        });

        gate.cancel();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            UnitFlow::Cancelled
        );
        worker.join().unwrap();
    }

    #[tokio::test]
    async fn test_async_cancelled_resolves() {
        let gate = Arc::new(WorkGate::new());
        let waiter_gate = Arc::clone(&gate);
        let waiter = tokio::spawn(async move { waiter_gate.cancelled().await });

        gate.cancel();
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("cancelled() never resolved")
            .unwrap();
    }
}
