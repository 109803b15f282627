use super::config::BridgeConfig;
use crate::core::{PersistenceError, Result};
use crate::reactive::subscription::{CancelFlag, Outcome, Subscription};
use lazy_static::lazy_static;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, oneshot};
use tracing::{Instrument, debug, debug_span, warn};

/// A blocking job as the scheduler sees it: no arguments, a value, nothing, or an error.
pub type Job<T> = Arc<dyn Fn() -> Outcome<T> + Send + Sync>;

lazy_static! {
    static ref GLOBAL_SCHEDULER: BlockingScheduler = BlockingScheduler::build(BridgeConfig::default());
}

/// Dedicated execution context for blocking persistence work
///
/// Jobs run on the tokio blocking pool, never on async worker threads. A semaphore sized by
/// `max_concurrency` bounds how many run at once; permits are awaited asynchronously so a
/// queued job holds no thread.
#[derive(Clone)]
pub struct BlockingScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    acquire_timeout: Duration,
    runtime: Option<Handle>,
    next_job_id: AtomicU64,
    in_flight: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
}

impl BlockingScheduler {
    /// Create a scheduler from a validated configuration
    pub fn new(config: &BridgeConfig) -> Result<Self> {
        config.validate().map_err(PersistenceError::ExecutionError)?;
        Ok(Self::build(config.clone()))
    }

    /// Process-wide default scheduler, running on the subscriber's runtime
    pub fn global() -> &'static BlockingScheduler {
        &GLOBAL_SCHEDULER
    }

    fn build(config: BridgeConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                permits: Arc::new(Semaphore::new(config.max_concurrency)),
                max_concurrency: config.max_concurrency,
                acquire_timeout: config.acquire_timeout,
                runtime: config.runtime,
                next_job_id: AtomicU64::new(1),
                in_flight: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                cancelled: AtomicU64::new(0),
            }),
        }
    }

    /// Start `job` and return a subscription to its outcome.
    ///
    /// Never blocks and never fails synchronously: a missing runtime or an exhausted pool is
    /// delivered through the subscription.
    pub fn submit<T: Send + 'static>(&self, job: Job<T>) -> Subscription<T> {
        let handle = match self.runtime_handle() {
            Ok(handle) => handle,
            Err(err) => return Subscription::ready(Err(err)),
        };

        let (sender, receiver) = oneshot::channel();
        let cancel = CancelFlag::new();
        let job_id = self.inner.next_job_id.fetch_add(1, Ordering::SeqCst);
        let span = debug_span!("blocking_job", job_id);

        let inner = Arc::clone(&self.inner);
        let flag = cancel.clone();
        handle.spawn(inner.run(job, flag, sender).instrument(span));

        Subscription::new(receiver, cancel)
    }

    fn runtime_handle(&self) -> Result<Handle> {
        match &self.inner.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| {
                PersistenceError::ExecutionError(
                    "No tokio runtime available to schedule blocking work".into(),
                )
            }),
        }
    }

    /// Get scheduler statistics
    pub fn stats(&self) -> SchedulerStats {
        let inner = &self.inner;
        SchedulerStats {
            max_concurrency: inner.max_concurrency,
            available_permits: inner.permits.available_permits(),
            in_flight: inner.in_flight.load(Ordering::SeqCst),
            completed: inner.completed.load(Ordering::SeqCst),
            failed: inner.failed.load(Ordering::SeqCst),
            cancelled: inner.cancelled.load(Ordering::SeqCst),
        }
    }
}

impl SchedulerInner {
    async fn run<T: Send + 'static>(
        self: Arc<Self>,
        job: Job<T>,
        cancel: CancelFlag,
        mut sender: oneshot::Sender<Outcome<T>>,
    ) {
        let acquire = tokio::time::timeout(
            self.acquire_timeout,
            Arc::clone(&self.permits).acquire_owned(),
        );

        let permit = tokio::select! {
            _ = sender.closed() => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                debug!("subscription cancelled while waiting for a worker");
                return;
            }
            acquired = acquire => match acquired {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => {
                    self.failed.fetch_add(1, Ordering::SeqCst);
                    let _ = sender.send(Err(PersistenceError::ExecutionError(
                        "Blocking scheduler is shut down".into(),
                    )));
                    return;
                }
                Err(_) => {
                    self.failed.fetch_add(1, Ordering::SeqCst);
                    let _ = sender.send(Err(PersistenceError::Timeout(format!(
                        "No blocking worker available after {:?}",
                        self.acquire_timeout
                    ))));
                    return;
                }
            },
        };

        if cancel.is_cancelled() || sender.is_closed() {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            debug!("subscription cancelled before work started");
            return;
        }

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let flag = cancel.clone();
        let joined = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            if flag.is_cancelled() {
                return None;
            }
            Some(job())
        })
        .await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let outcome = match joined {
            Ok(Some(outcome)) => outcome,
            Ok(None) => {
                self.cancelled.fetch_add(1, Ordering::SeqCst);
                debug!("subscription cancelled before work started");
                return;
            }
            Err(join_error) => {
                warn!(error = %join_error, "blocking worker panicked");
                Err(PersistenceError::ExecutionError(format!(
                    "Blocking worker failed: {}",
                    join_error
                )))
            }
        };

        match &outcome {
            Ok(_) => self.completed.fetch_add(1, Ordering::SeqCst),
            Err(_) => self.failed.fetch_add(1, Ordering::SeqCst),
        };

        if sender.send(outcome).is_err() {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
            debug!("subscriber went away; result discarded");
        }
    }
}

/// Scheduler statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerStats {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub in_flight: usize,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
}

impl std::fmt::Display for SchedulerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Scheduler Stats: {}/{} in flight, {} completed, {} failed, {} cancelled",
            self.in_flight, self.max_concurrency, self.completed, self.failed, self.cancelled
        )
    }
}
