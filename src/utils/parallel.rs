//! Bounded-worker map-reduce over a slice of work items.
//!
//! Each item runs `task(item, ctx)` on a dedicated rayon pool. Results come
//! back in input order. A failing or panicking item is recorded in
//! `MapReduceOutcome::failures` and leaves a `None` hole in `results`; the
//! remaining items still complete.
use rayon::prelude::*;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};

use crate::errors::TaskError;

#[derive(Debug)]
pub struct TaskFailure<E: Display> {
    pub index: usize,
    pub error: TaskError<E>,
}

#[derive(Debug)]
pub struct MapReduceOutcome<R, E: Display> {
    /// `results[i]` belongs to `items[i]`; `None` when that item failed.
    pub results: Vec<Option<R>>,
    pub failures: Vec<TaskFailure<E>>,
}

impl<R, E: Display> MapReduceOutcome<R, E> {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_some()).count()
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct ParallelTaskRunner {
    workers: usize,
}

impl Default for ParallelTaskRunner {
    fn default() -> Self {
        Self::new(None)
    }
}

impl ParallelTaskRunner {
    /// `None` or `Some(0)` means one worker per available CPU.
    #[must_use]
    pub fn new(workers: Option<usize>) -> Self {
        let workers = workers
            .filter(|&w| w > 0)
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get));
        Self { workers }
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Map `task` over `items` with a shared read-only `ctx`.
    ///
    /// `batch_size` is the minimum number of consecutive items one worker
    /// claims at a time.
    pub fn run<T, C, R, E, F>(&self, task: F, items: &[T], ctx: &C, batch_size: usize) -> MapReduceOutcome<R, E>
    where
        T: Sync,
        C: Sync,
        R: Send,
        E: Send + Display,
        F: Fn(&T, &C) -> Result<R, E> + Sync,
    {
        if items.is_empty() {
            return MapReduceOutcome { results: Vec::new(), failures: Vec::new() };
        }
        tracing::info!(items = items.len(), workers = self.workers, batch_size, "Starting parallel batch");

        let batch = batch_size.max(1);
        let exec = || -> Vec<Result<R, TaskError<E>>> {
            items.par_iter().with_min_len(batch).map(|item| run_one(&task, item, ctx)).collect()
        };
        let outcomes = match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => pool.install(exec),
            Err(e) => {
                tracing::warn!(error = %e, "Could not build worker pool, using the global pool");
                exec()
            }
        };

        let mut results = Vec::with_capacity(outcomes.len());
        let mut failures = Vec::new();
        for (index, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(r) => results.push(Some(r)),
                Err(error) => {
                    tracing::warn!(index, error = %error, "Work item failed");
                    results.push(None);
                    failures.push(TaskFailure { index, error });
                }
            }
        }
        tracing::debug!(done = results.len() - failures.len(), failed = failures.len(), "Parallel batch finished");
        MapReduceOutcome { results, failures }
    }
}

fn run_one<T, C, R, E, F>(task: &F, item: &T, ctx: &C) -> Result<R, TaskError<E>>
where
    E: Display,
    F: Fn(&T, &C) -> Result<R, E>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| task(item, ctx))) {
        Ok(Ok(r)) => Ok(r),
        Ok(Err(e)) => Err(TaskError::Failed(e)),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(TaskError::Panicked(msg))
        }
    }
}
