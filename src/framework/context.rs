//! # Execution Context
//!
//! Session-scoped mutable state behind the [`Scheduler`](crate::framework::Scheduler):
//!
//! - the **queue** of operations captured in batched mode,
//! - the **conflict keys** claimed by the operations of the current batch,
//! - the **finalizers** to run once after the batch, keyed by name.
//!
//! The context is plain data. It never awaits and never runs a job; the
//! scheduler takes jobs out of it and drives them.

use crate::framework::error::{ConflictError, SdkResult};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::future::Future;
use tracing::{debug, warn};

/// Future produced when a [`Job`] is started.
pub type JobFuture = BoxFuture<'static, SdkResult<()>>;

/// A named unit of deferred work.
///
/// The job owns a snapshot of everything it needs, captured when it was built.
/// Later changes to the caller's own values cannot leak into an already queued
/// job.
pub struct Job {
    name: String,
    run: Box<dyn FnOnce() -> JobFuture + Send>,
}

impl Job {
    /// Builds a job from a snapshot and the operation to run on it.
    pub fn new<S, F, Fut>(name: impl Into<String>, snapshot: S, operation: F) -> Self
    where
        S: Send + 'static,
        F: FnOnce(S) -> Fut + Send + 'static,
        Fut: Future<Output = SdkResult<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            run: Box::new(move || Box::pin(operation(snapshot))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn start(self) -> JobFuture {
        (self.run)()
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job").field("name", &self.name).finish()
    }
}

/// Identifies the remote slot a queued write targets: a container path and an
/// ordinal position, optionally qualified by a tab or modal name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConflictKey {
    pub target: String,
    pub order: u32,
    pub tab: Option<String>,
}

impl ConflictKey {
    pub fn new(target: impl Into<String>, order: u32) -> Self {
        Self {
            target: target.into(),
            order,
            tab: None,
        }
    }

    pub fn with_tab(mut self, tab: impl Into<String>) -> Self {
        self.tab = Some(tab.into());
        self
    }
}

impl fmt::Display for ConflictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.target, self.order)?;
        if let Some(tab) = &self.tab {
            write!(f, "@{}", tab)?;
        }
        Ok(())
    }
}

/// Queue, conflict set and finalizer map of one session.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    queue: Vec<Job>,
    conflict_keys: HashSet<ConflictKey>,
    finalizers: BTreeMap<String, Job>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of queued operations.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.finalizers.is_empty()
    }

    pub fn claimed_keys(&self) -> usize {
        self.conflict_keys.len()
    }

    pub fn is_claimed(&self, key: &ConflictKey) -> bool {
        self.conflict_keys.contains(key)
    }

    pub fn finalizer_names(&self) -> Vec<String> {
        self.finalizers.keys().cloned().collect()
    }

    /// Claims `key` (if any), queues `job` and registers its finalizers.
    ///
    /// A key already claimed in this batch aborts the **whole** batch: queue,
    /// conflict set and finalizers are all cleared before the error is returned.
    pub fn enqueue(
        &mut self,
        key: Option<ConflictKey>,
        job: Job,
        finalizers: Vec<Job>,
    ) -> Result<(), ConflictError> {
        if let Some(key) = key {
            if self.conflict_keys.contains(&key) {
                let discarded = self.abort();
                warn!(%key, discarded, job = job.name(), "Conflicting operation, batch aborted");
                return Err(ConflictError::DuplicateKey { key, discarded });
            }
            self.conflict_keys.insert(key);
        }
        debug!(job = job.name(), queued = self.queue.len() + 1, "Queued");
        self.queue.push(job);
        for finalizer in finalizers {
            self.register_finalizer(finalizer);
        }
        Ok(())
    }

    /// Registers a finalizer unless one with the same name is already pending.
    /// Returns whether it was registered.
    pub fn register_finalizer(&mut self, finalizer: Job) -> bool {
        if self.finalizers.contains_key(finalizer.name()) {
            return false;
        }
        self.finalizers.insert(finalizer.name().to_string(), finalizer);
        true
    }

    /// Discards everything pending. Returns how many queued operations were dropped.
    pub fn abort(&mut self) -> usize {
        let discarded = self.queue.len();
        self.queue.clear();
        self.conflict_keys.clear();
        self.finalizers.clear();
        discarded
    }

    /// Takes the queued operations and releases their conflict keys.
    pub fn take_batch(&mut self) -> Vec<Job> {
        self.conflict_keys.clear();
        std::mem::take(&mut self.queue)
    }

    /// Takes the pending finalizers.
    pub fn take_finalizers(&mut self) -> Vec<Job> {
        std::mem::take(&mut self.finalizers).into_values().collect()
    }
}
