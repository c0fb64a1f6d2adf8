//! # Scheduler
//!
//! Every mutating SDK call goes through the [`Scheduler`], which runs in one of
//! two modes:
//!
//! - **Immediate** (sequential): the call is executed at once and its
//!   finalizers run right after it.
//! - **Batched**: the call is captured as a [`Job`] together with a snapshot of
//!   its arguments and queued in the [`ExecutionContext`]. Nothing reaches the
//!   remote until [`Scheduler::flush`].
//!
//! ## Flush barrier
//!
//! ```text
//! flush()
//!   ├── phase 1: every queued job, concurrently (bounded by a semaphore)
//!   │            ... all settle, successes and failures alike ...
//!   └── phase 2: every registered finalizer, concurrently, once each
//! ```
//!
//! Finalizers never overlap a queued job. When jobs fail, the remaining jobs
//! still settle and the finalizers still run; the first failure in enqueue order
//! is returned and the others are logged.
//!
//! ## Conflicts
//!
//! A call may carry a [`ConflictKey`]. Queueing a second call with a key that is
//! already claimed in the pending batch discards the **entire** batch and
//! returns [`ConflictError::DuplicateKey`](crate::framework::ConflictError).
//!
//! ## Reads and immediate calls
//!
//! Reads, and calls marked [`Call::always_execute`], first flush whatever is
//! pending so they observe every queued write. Jobs running inside a flush may
//! issue further reads; those do not try to flush again.

use crate::framework::context::{ConflictKey, ExecutionContext, Job};
use crate::framework::error::{SdkError, SdkResult};
use crate::framework::resource::lock;
use futures::future::join_all;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

tokio::task_local! {
    static IN_JOB: ();
}

/// True while polling a job or finalizer started by this scheduler.
fn in_job() -> bool {
    IN_JOB.try_with(|_| ()).is_ok()
}

/// What happened to a submitted call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The call ran to completion.
    Completed,
    /// The call was queued and will run on the next flush.
    Queued,
}

/// A mutating call on its way into the scheduler.
#[derive(Debug)]
pub struct Call {
    job: Job,
    conflict_key: Option<ConflictKey>,
    finalizers: Vec<Job>,
    always_execute: bool,
}

impl Call {
    /// `snapshot` is everything the operation needs, captured now.
    pub fn new<S, F, Fut>(name: impl Into<String>, snapshot: S, operation: F) -> Self
    where
        S: Send + 'static,
        F: FnOnce(S) -> Fut + Send + 'static,
        Fut: Future<Output = SdkResult<()>> + Send + 'static,
    {
        Self {
            job: Job::new(name, snapshot, operation),
            conflict_key: None,
            finalizers: Vec::new(),
            always_execute: false,
        }
    }

    pub fn conflict_key(mut self, key: ConflictKey) -> Self {
        self.conflict_key = Some(key);
        self
    }

    /// Registers a finalizer. Finalizers are deduplicated by name within a batch.
    pub fn finalizer(mut self, finalizer: Job) -> Self {
        self.finalizers.push(finalizer);
        self
    }

    /// Runs the call immediately even in batched mode.
    pub fn always_execute(mut self) -> Self {
        self.always_execute = true;
        self
    }

    pub fn name(&self) -> &str {
        self.job.name()
    }
}

struct SchedulerInner {
    sequential: AtomicBool,
    context: Mutex<ExecutionContext>,
    flushing: tokio::sync::Mutex<()>,
    permits: Semaphore,
    max_concurrency: usize,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        let context = lock(&self.context);
        if !context.is_empty() {
            warn!(
                pending = context.len(),
                finalizers = context.finalizer_names().len(),
                "Scheduler dropped with unflushed operations"
            );
        }
    }
}

/// Dual-mode executor shared by every client of one session.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<SchedulerInner>,
}

impl Scheduler {
    pub fn new(sequential: bool, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            inner: Arc::new(SchedulerInner {
                sequential: AtomicBool::new(sequential),
                context: Mutex::new(ExecutionContext::new()),
                flushing: tokio::sync::Mutex::new(()),
                permits: Semaphore::new(max_concurrency),
                max_concurrency,
            }),
        }
    }

    pub fn is_sequential(&self) -> bool {
        self.inner.sequential.load(Ordering::SeqCst)
    }

    /// Switches mode. Switching to sequential does not flush by itself; the
    /// next call does.
    pub fn set_sequential(&self, sequential: bool) {
        let previous = self.inner.sequential.swap(sequential, Ordering::SeqCst);
        if previous != sequential {
            info!(sequential, "Scheduler mode changed");
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.inner.max_concurrency
    }

    /// Number of queued operations.
    pub fn pending(&self) -> usize {
        lock(&self.inner.context).len()
    }

    pub fn pending_finalizers(&self) -> Vec<String> {
        lock(&self.inner.context).finalizer_names()
    }

    pub fn claimed_keys(&self) -> usize {
        lock(&self.inner.context).claimed_keys()
    }

    pub fn is_claimed(&self, key: &ConflictKey) -> bool {
        lock(&self.inner.context).is_claimed(key)
    }

    /// Runs or queues `call` depending on the mode.
    #[instrument(skip_all, fields(call = call.name()))]
    pub async fn submit(&self, call: Call) -> SdkResult<Outcome> {
        let Call {
            job,
            conflict_key,
            finalizers,
            always_execute,
        } = call;

        if always_execute || self.is_sequential() {
            self.flush().await?;
            let settled = self.run(job).await;
            let finalized = self.run_all(finalizers).await;
            report(vec![settled], finalized)?;
            return Ok(Outcome::Completed);
        }

        lock(&self.inner.context).enqueue(conflict_key, job, finalizers)?;
        Ok(Outcome::Queued)
    }

    /// Runs a read after flushing pending writes.
    pub async fn execute<T, Fut>(&self, read: Fut) -> SdkResult<T>
    where
        Fut: Future<Output = SdkResult<T>>,
    {
        self.flush().await?;
        read.await
    }

    /// Drains the queue: all jobs, then all finalizers.
    ///
    /// Returns the first job failure in enqueue order, else the first finalizer
    /// failure. Flushing an empty context is a no-op.
    pub async fn flush(&self) -> SdkResult<()> {
        if in_job() {
            return Ok(());
        }
        let _flushing = self.inner.flushing.lock().await;
        self.drain().await
    }

    async fn drain(&self) -> SdkResult<()> {
        // Work queued while this flush runs goes to the next one, finalizers included
        let (batch, finalizers) = {
            let mut context = lock(&self.inner.context);
            (context.take_batch(), context.take_finalizers())
        };
        if batch.is_empty() && finalizers.is_empty() {
            return Ok(());
        }
        info!(jobs = batch.len(), "Flushing");
        let settled = self.run_all(batch).await;

        debug!(finalizers = finalizers.len(), "Running finalizers");
        let finalized = self.run_all(finalizers).await;

        let failed = settled.iter().chain(&finalized).filter(|(_, r)| r.is_err()).count();
        info!(jobs = settled.len(), finalizers = finalized.len(), failed, "Flushed");
        report(settled, finalized)
    }

    async fn run_all(&self, jobs: Vec<Job>) -> Vec<(String, SdkResult<()>)> {
        join_all(jobs.into_iter().map(|job| self.run(job))).await
    }

    /// Nested calls issued by a running job reuse its permit.
    async fn run(&self, job: Job) -> (String, SdkResult<()>) {
        let name = job.name().to_string();
        if in_job() {
            return (name, job.start().await);
        }
        let result = match self.inner.permits.acquire().await {
            Ok(_permit) => IN_JOB.scope((), job.start()).await,
            Err(_) => Err(SdkError::usage("scheduler is closed")),
        };
        (name, result)
    }
}

/// Keeps the first failure, logs the rest.
fn report(
    settled: Vec<(String, SdkResult<()>)>,
    finalized: Vec<(String, SdkResult<()>)>,
) -> SdkResult<()> {
    let mut first = None;
    for (name, result) in settled.into_iter().chain(finalized) {
        if let Err(e) = result {
            if first.is_none() {
                first = Some(e);
            } else {
                warn!(job = %name, error = %e, "Operation failed");
            }
        }
    }
    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("sequential", &self.is_sequential())
            .field("pending", &self.pending())
            .field("max_concurrency", &self.inner.max_concurrency)
            .finish()
    }
}
