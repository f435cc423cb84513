//! Bounded-concurrency task runner.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct SchedulerInner {
    running: usize,
    waiting: VecDeque<Task>,
}

/// Runs at most `limit` tasks at once; the rest wait in FIFO order.
///
/// When a task finishes and others are waiting, its slot is handed to the
/// next one after a random delay of up to `jitter`. A task that panics
/// still frees its slot. Tasks are never retried or cancelled here.
#[derive(Clone)]
pub struct TaskScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
    limit: usize,
    jitter: Duration,
}

impl TaskScheduler {
    /// Creates a scheduler. A `limit` of zero is treated as one.
    pub fn new(limit: usize, jitter: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SchedulerInner {
                running: 0,
                waiting: VecDeque::new(),
            })),
            limit: limit.max(1),
            jitter,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SchedulerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Number of tasks holding a slot.
    pub fn running(&self) -> usize {
        self.lock().running
    }

    /// Number of tasks waiting for a slot.
    pub fn queued(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Starts `task` now if a slot is free, otherwise queues it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let task: Task = Box::pin(task);
        let admitted = {
            let mut inner = self.lock();
            if inner.running < self.limit {
                inner.running += 1;
                Some(task)
            } else {
                inner.waiting.push_back(task);
                debug!(queued = inner.waiting.len(), "task queued");
                None
            }
        };
        if let Some(task) = admitted {
            self.spawn(task);
        }
    }

    fn spawn(&self, task: Task) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut next = Some(task);
            while let Some(task) = next.take() {
                if let Err(e) = tokio::spawn(task).await {
                    warn!(error = %e, "scheduled task failed");
                }
                next = this.hand_over().await;
            }
        });
    }

    /// Passes the finished task's slot to the next waiting task, or frees it.
    async fn hand_over(&self) -> Option<Task> {
        let idle = self.lock().waiting.is_empty();
        if idle {
            return self.release();
        }

        let delay = random_delay(self.jitter);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.release()
    }

    fn release(&self) -> Option<Task> {
        let mut inner = self.lock();
        match inner.waiting.pop_front() {
            Some(task) => Some(task),
            None => {
                inner.running -= 1;
                None
            }
        }
    }
}

fn random_delay(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    #[tokio::test]
    async fn never_exceeds_limit() {
        let scheduler = TaskScheduler::new(2, Duration::from_millis(5));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            let done = Arc::clone(&done);
            scheduler.submit(async move {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                current.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(scheduler.running(), 2);
        assert_eq!(scheduler.queued(), 4);

        while done.load(Ordering::SeqCst) < 6 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
        // Let the last hand-over release its slot.
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(scheduler.running(), 0);
        assert_eq!(scheduler.queued(), 0);
    }

    #[tokio::test]
    async fn waiting_tasks_start_in_fifo_order() {
        let scheduler = TaskScheduler::new(1, Duration::ZERO);
        let order = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(Notify::new());

        let g = Arc::clone(&gate);
        scheduler.submit(async move { g.notified().await });
        for i in 0..4 {
            let order = Arc::clone(&order);
            scheduler.submit(async move { order.lock().unwrap().push(i) });
        }
        assert_eq!(scheduler.queued(), 4);

        gate.notify_one();
        while order.lock().unwrap().len() < 4 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(*order.lock().unwrap(), [0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn panicking_task_frees_its_slot() {
        let scheduler = TaskScheduler::new(1, Duration::ZERO);
        let ran = Arc::new(AtomicUsize::new(0));

        scheduler.submit(async { panic!("task blew up") });
        let r = Arc::clone(&ran);
        scheduler.submit(async move {
            r.fetch_add(1, Ordering::SeqCst);
        });

        while ran.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[test]
    fn zero_limit_is_one() {
        assert_eq!(TaskScheduler::new(0, Duration::ZERO).limit(), 1);
    }
}
