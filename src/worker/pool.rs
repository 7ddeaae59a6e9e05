//! Bounded task pool: caps concurrent jobs and how many may wait.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::JobError;

/// Runs at most `concurrency` jobs at once, with at most `max_queued`
/// more waiting for a permit. Anything beyond that is refused.
pub struct TaskPool {
    name: String,
    capacity: usize,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

/// Decrements the in-flight count when the job ends, even on panic.
struct InFlight {
    count: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl TaskPool {
    pub fn new(name: impl Into<String>, concurrency: usize, max_queued: usize) -> Self {
        let concurrency = concurrency.max(1);
        Self {
            name: name.into(),
            capacity: concurrency + max_queued,
            permits: Arc::new(Semaphore::new(concurrency)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Jobs running or waiting.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Queue a job. Fails fast when running + waiting jobs hit capacity.
    pub fn spawn<F>(&self, job: F) -> Result<JoinHandle<()>, JobError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let admitted = self
            .in_flight
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n < self.capacity).then_some(n + 1)
            })
            .is_ok();
        if !admitted {
            return Err(JobError::QueueFull {
                pool: self.name.clone(),
                capacity: self.capacity,
            });
        }

        let guard = InFlight {
            count: Arc::clone(&self.in_flight),
            idle: Arc::clone(&self.idle),
        };
        let permits = Arc::clone(&self.permits);
        let name = self.name.clone();

        Ok(tokio::spawn(async move {
            let _guard = guard;
            let Ok(_permit) = permits.acquire_owned().await else {
                warn!(pool = %name, "Pool closed; job dropped");
                return;
            };
            job.await;
        }))
    }

    /// Wait for queued and running jobs to finish, then refuse new work.
    ///
    /// Returns `false` if the wait timed out.
    pub async fn drain(&self, wait: Duration) -> bool {
        let idle = async {
            loop {
                let notified = self.idle.notified();
                tokio::pin!(notified);
                // Register before checking so a wakeup between the two is kept.
                notified.as_mut().enable();
                if self.in_flight() == 0 {
                    return;
                }
                notified.await;
            }
        };
        let drained = tokio::time::timeout(wait, idle).await.is_ok();
        self.permits.close();

        if drained {
            debug!(pool = %self.name, "Pool drained");
        } else {
            warn!(pool = %self.name, in_flight = self.in_flight(), "Pool drain timed out");
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn runs_jobs() {
        let pool = TaskPool::new("test", 2, 2);
        let (tx, rx) = oneshot::channel();
        pool.spawn(async move {
            tx.send(42).unwrap();
        })
        .unwrap();
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn refuses_beyond_capacity() {
        let pool = TaskPool::new("test", 1, 1);
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);

        for _ in 0..2 {
            let mut rx = release_rx.clone();
            pool.spawn(async move {
                let _ = rx.wait_for(|go| *go).await;
            })
            .unwrap();
        }
        assert_eq!(pool.in_flight(), 2);

        let err = pool.spawn(async {}).unwrap_err();
        assert!(matches!(err, JobError::QueueFull { capacity: 2, .. }));

        release_tx.send(true).unwrap();
        assert!(pool.drain(Duration::from_secs(2)).await);
        assert_eq!(pool.in_flight(), 0);
    }

    #[tokio::test]
    async fn concurrency_is_capped() {
        let pool = TaskPool::new("test", 2, 10);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            pool.spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        assert!(pool.drain(Duration::from_secs(5)).await);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn drained_pool_drops_new_jobs() {
        let pool = TaskPool::new("test", 1, 1);
        assert!(pool.drain(Duration::from_millis(100)).await);

        let ran = Arc::new(AtomicUsize::new(0));
        let flag = Arc::clone(&ran);
        let handle = pool
            .spawn(async move {
                flag.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        handle.await.unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
