//! Task bookkeeping shared by transformers and the router.

use crate::bus::BusMetrics;
use crate::error::{Result, TransmissionError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::AbortHandle;

/// How a transformer runs its signal and effect handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One task per message
    #[default]
    Concurrent,
    /// One worker draining a mailbox, one message at a time
    Sequential,
}

const PRUNE_THRESHOLD: usize = 64;

struct ScopeState {
    handles: Vec<AbortHandle>,
    cancelled: bool,
}

/// Registry of every task spawned on behalf of one owner
pub(crate) struct TaskScope {
    state: Mutex<ScopeState>,
    closed: TransmissionError,
}

impl TaskScope {
    /// `closed` is the error returned by `spawn` after cancellation
    pub(crate) fn new(closed: TransmissionError) -> Self {
        Self {
            state: Mutex::new(ScopeState {
                handles: Vec::new(),
                cancelled: false,
            }),
            closed,
        }
    }

    pub(crate) fn spawn<F>(&self, future: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransmissionError::NoRuntime(e.to_string()))?;

        // Spawning under the lock keeps a concurrent cancel from missing the task
        let mut state = self.state.lock();
        if state.cancelled {
            return Err(self.closed.clone());
        }
        if state.handles.len() >= PRUNE_THRESHOLD {
            state.handles.retain(|handle| !handle.is_finished());
        }
        let handle = runtime.spawn(future);
        state.handles.push(handle.abort_handle());
        Ok(())
    }

    /// Abort every task. Idempotent.
    pub(crate) fn cancel(&self) -> usize {
        let handles = {
            let mut state = self.state.lock();
            state.cancelled = true;
            std::mem::take(&mut state.handles)
        };
        let mut aborted = 0;
        for handle in handles {
            if !handle.is_finished() {
                aborted += 1;
            }
            handle.abort();
        }
        aborted
    }

    #[cfg(test)]
    pub(crate) fn is_cancelled(&self) -> bool {
        self.state.lock().cancelled
    }

    #[cfg(test)]
    pub(crate) fn live_tasks(&self) -> usize {
        self.state
            .lock()
            .handles
            .iter()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

/// Progress of one bus subscription owned by a collector task
pub(crate) struct Intake {
    metrics: Arc<BusMetrics>,
    baseline: u64,
    acknowledged: AtomicU64,
}

impl Intake {
    pub(crate) fn new(metrics: Arc<BusMetrics>, baseline: u64) -> Self {
        Self {
            metrics,
            baseline,
            acknowledged: AtomicU64::new(0),
        }
    }

    fn backlog(&self) -> u64 {
        let sent = self.metrics.sent.load(Ordering::SeqCst);
        sent.saturating_sub(self.baseline)
            .saturating_sub(self.acknowledged.load(Ordering::SeqCst))
    }
}

/// Counts handler invocations in flight and bus items not yet picked up.
///
/// Collectors begin tracking an invocation before acknowledging the item
/// that caused it, and `is_idle` reads backlogs before the in-flight count,
/// so a message is always visible in one of the two.
pub(crate) struct ProcessingTracker {
    in_flight: AtomicUsize,
    intakes: Mutex<Vec<Arc<Intake>>>,
    changed: Notify,
}

/// Marks one handler invocation as running until dropped
pub(crate) struct InFlight {
    tracker: Arc<ProcessingTracker>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.tracker.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.tracker.changed.notify_waiters();
        }
    }
}

impl ProcessingTracker {
    pub(crate) fn new() -> Self {
        Self {
            in_flight: AtomicUsize::new(0),
            intakes: Mutex::new(Vec::new()),
            changed: Notify::new(),
        }
    }

    pub(crate) fn begin(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight {
            tracker: self.clone(),
        }
    }

    pub(crate) fn register_intake(&self, intake: Arc<Intake>) {
        self.intakes.lock().push(intake);
    }

    /// Record that a collector has moved past `position` items
    pub(crate) fn acknowledge(&self, intake: &Intake, position: u64) {
        intake.acknowledged.store(position, Ordering::SeqCst);
        self.changed.notify_waiters();
    }

    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub(crate) fn is_idle(&self) -> bool {
        let drained = self.intakes.lock().iter().all(|intake| intake.backlog() == 0);
        drained && self.in_flight() == 0
    }

    /// Wake every waiter so it can re-check; used on teardown
    pub(crate) fn release(&self) {
        self.changed.notify_waiters();
    }

    /// Wait until idle, or until `stop` reports the owner is gone
    pub(crate) async fn wait_idle(&self, stop: impl Fn() -> bool) {
        loop {
            let changed = self.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();
            if stop() || self.is_idle() {
                return;
            }
            changed.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_aborts_tasks_and_refuses_new_ones() {
        let scope = TaskScope::new(TransmissionError::RouterCleared);
        scope
            .spawn(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
            .unwrap();
        assert_eq!(scope.live_tasks(), 1);
        assert_eq!(scope.cancel(), 1);
        assert_eq!(scope.cancel(), 0);
        assert!(scope.is_cancelled());
        assert_eq!(
            scope.spawn(async {}),
            Err(TransmissionError::RouterCleared)
        );
    }

    #[test]
    fn test_spawn_without_runtime_fails() {
        let scope = TaskScope::new(TransmissionError::RouterCleared);
        assert!(matches!(
            scope.spawn(async {}),
            Err(TransmissionError::NoRuntime(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_idle_follows_in_flight_guards() {
        let tracker = Arc::new(ProcessingTracker::new());
        let guard = tracker.begin();
        assert!(!tracker.is_idle());

        let waiter = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.wait_idle(|| false).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tracker.in_flight(), 0);
    }
}
