//! Single-consumer dispatch queue.
//!
//! # Why a dispatch queue? (for beginners)
//!
//! Socket reads complete on Tokio worker threads, possibly several at once.
//! Application code (game logic, registries, event handlers) is much simpler
//! when it only ever runs on one thread.  I/O tasks therefore never call
//! application code directly: they [`schedule`](DispatchQueue::schedule) a
//! callback, and one designated thread runs all pending callbacks when it
//! calls [`drain`](DispatchQueue::drain) from its fixed-rate tick.
//!
//! # Two buffers
//!
//! `schedule` appends to an *intake* list under a lock.  `drain` swaps the
//! intake into a *working* list while holding the lock, releases it, and runs
//! the working list in enqueue order.  A callback that schedules more work
//! therefore lands in the fresh intake list and runs on the **next** drain,
//! never inline and never extending the current one.
//!
//! # Context parameter
//!
//! Callbacks receive `&C`, the object that owns the queue (the server or the
//! client).  This keeps callbacks from having to capture a reference-counted
//! handle to their own owner.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// A deferred unit of work run on the tick thread.
pub type Callback<C> = Box<dyn FnOnce(&C) + Send + 'static>;

/// Queue of callbacks filled from any thread and drained by one.
///
/// # Examples
///
/// ```rust
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use tandem_core::DispatchQueue;
///
/// let ticks = AtomicUsize::new(0);
/// let queue: DispatchQueue<AtomicUsize> = DispatchQueue::new();
/// queue.schedule(|n| { n.fetch_add(1, Ordering::Relaxed); });
///
/// assert_eq!(queue.drain(&ticks), 1);
/// assert_eq!(ticks.load(Ordering::Relaxed), 1);
/// ```
pub struct DispatchQueue<C = ()> {
    intake: Mutex<Vec<Callback<C>>>,
    /// Working list reused across drains so its allocation is kept.
    working: Mutex<Vec<Callback<C>>>,
    pending: AtomicBool,
}

impl<C> DispatchQueue<C> {
    pub fn new() -> Self {
        Self {
            intake: Mutex::new(Vec::new()),
            working: Mutex::new(Vec::new()),
            pending: AtomicBool::new(false),
        }
    }

    /// Queues `callback` for the next drain.  Never blocks on a drain in
    /// progress for longer than one vector push.
    pub fn schedule<F>(&self, callback: F)
    where
        F: FnOnce(&C) + Send + 'static,
    {
        let mut intake = self.intake.lock();
        intake.push(Box::new(callback));
        self.pending.store(true, Ordering::Release);
    }

    /// Runs every callback scheduled before this call, in enqueue order, and
    /// returns how many ran.
    ///
    /// Callbacks execute with no queue lock held.  Work they schedule is
    /// deferred to the next drain.
    pub fn drain(&self, ctx: &C) -> usize {
        if !self.pending.load(Ordering::Acquire) {
            return 0;
        }

        let mut batch = std::mem::take(&mut *self.working.lock());
        {
            let mut intake = self.intake.lock();
            std::mem::swap(&mut *intake, &mut batch);
            self.pending.store(false, Ordering::Release);
        }

        let count = batch.len();
        for callback in batch.drain(..) {
            callback(ctx);
        }

        // Hand the (now empty) allocation back for the next drain.
        *self.working.lock() = batch;
        count
    }

    /// Returns `true` if callbacks are waiting for the next drain.
    pub fn has_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Number of callbacks waiting for the next drain.
    pub fn len(&self) -> usize {
        self.intake.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<C> Default for DispatchQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for DispatchQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use std::sync::Arc;
    use std::thread;

    type Log = PlMutex<Vec<&'static str>>;

    #[test]
    fn test_drain_on_empty_queue_runs_nothing() {
        let queue: DispatchQueue<Log> = DispatchQueue::new();
        assert_eq!(queue.drain(&Log::default()), 0);
        assert!(!queue.has_pending());
    }

    #[test]
    fn test_callbacks_from_different_threads_run_in_schedule_order() {
        // Arrange: A, B, C scheduled from three threads, strictly one after
        // another.
        let queue: Arc<DispatchQueue<Log>> = Arc::new(DispatchQueue::new());
        for name in ["A", "B", "C"] {
            let q = Arc::clone(&queue);
            thread::spawn(move || q.schedule(move |log: &Log| log.lock().push(name)))
                .join()
                .unwrap();
        }
        let log = Log::default();

        // Act
        let ran = queue.drain(&log);

        // Assert
        assert_eq!(ran, 3);
        assert_eq!(*log.lock(), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_callback_scheduled_during_drain_runs_on_next_drain() {
        // Arrange
        let queue: Arc<DispatchQueue<Log>> = Arc::new(DispatchQueue::new());
        let q = Arc::clone(&queue);
        queue.schedule(move |log: &Log| {
            log.lock().push("outer");
            q.schedule(|log: &Log| log.lock().push("inner"));
        });
        let log = Log::default();

        // Act
        let first = queue.drain(&log);

        // Assert: the inner callback is deferred, not run inline.
        assert_eq!(first, 1);
        assert_eq!(*log.lock(), vec!["outer"]);
        assert!(queue.has_pending());

        assert_eq!(queue.drain(&log), 1);
        assert_eq!(*log.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_concurrent_producers_lose_nothing() {
        let queue: Arc<DispatchQueue<PlMutex<usize>>> = Arc::new(DispatchQueue::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let q = Arc::clone(&queue);
                thread::spawn(move || {
                    for _ in 0..250 {
                        q.schedule(|n: &PlMutex<usize>| *n.lock() += 1);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let total = PlMutex::new(0);

        assert_eq!(queue.len(), 2000);
        assert_eq!(queue.drain(&total), 2000);
        assert_eq!(*total.lock(), 2000);
        assert!(queue.is_empty());
    }
}
