//! Bounded pool of report worker tasks.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, watch};
use tracing::{debug, warn};

/// Why a worker could not be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("worker pool is closed")]
    Closed,
    #[error("no tokio runtime available to run the worker")]
    NoRuntime,
}

struct PoolInner {
    name: String,
    size: usize,
    permits: Arc<Semaphore>,
    in_flight: watch::Sender<usize>,
    closed: AtomicBool,
}

/// Runs scheduled workers as tokio tasks, at most `size` at a time.
///
/// Every scheduled task is spawned immediately but waits for a permit before
/// running, so a large batch never opens more than `size` storage sessions.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

/// Decrements the in-flight count even if the task panics.
struct InFlightGuard(Arc<PoolInner>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.in_flight.send_modify(|n| *n = n.saturating_sub(1));
    }
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self::named("report-workers", size)
    }

    pub fn named(name: impl Into<String>, size: usize) -> Self {
        let size = size.max(1);
        let (in_flight, _) = watch::channel(0);
        Self {
            inner: Arc::new(PoolInner {
                name: name.into(),
                size,
                permits: Arc::new(Semaphore::new(size)),
                in_flight,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Scheduled tasks that have not finished yet (running or waiting).
    pub fn in_flight(&self) -> usize {
        *self.inner.in_flight.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Reject further scheduling. Already scheduled tasks still run.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!(pool = %self.inner.name, "worker pool closed");
        }
    }

    /// Spawn `work`; it starts once a permit is free.
    pub fn schedule<F>(&self, work: F) -> Result<(), ScheduleError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(None, work)
    }

    /// Spawn `work` to start after `delay`. The task counts as in flight
    /// while it waits but holds no permit until the delay has passed.
    pub fn schedule_after<F>(&self, delay: Duration, work: F) -> Result<(), ScheduleError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn(Some(delay), work)
    }

    fn spawn<F>(&self, delay: Option<Duration>, work: F) -> Result<(), ScheduleError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_closed() {
            return Err(ScheduleError::Closed);
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| ScheduleError::NoRuntime)?;

        self.inner.in_flight.send_modify(|n| *n += 1);
        let guard = InFlightGuard(Arc::clone(&self.inner));
        let permits = Arc::clone(&self.inner.permits);
        let name = self.inner.name.clone();

        handle.spawn(async move {
            let _guard = guard;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!(pool = %name, "worker permit semaphore closed; task dropped");
                    return;
                }
            };
            work.await;
        });
        Ok(())
    }

    /// Resolve once no scheduled task is left.
    pub async fn wait_idle(&self) {
        let mut rx = self.inner.in_flight.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = rx.wait_for(|n| *n == 0).await;
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.inner.name)
            .field("size", &self.inner.size)
            .field("in_flight", &self.in_flight())
            .field("closed", &self.is_closed())
            .finish()
    }
}
