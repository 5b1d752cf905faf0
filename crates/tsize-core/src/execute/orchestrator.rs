//! Worker pool orchestration.
//!
//! Spawns the pool, drives one pull loop per worker over the shared queue,
//! and tears every worker down before returning, whatever the outcome.

use std::sync::Arc;
use std::time::Duration;

use rustc_hash::FxHashMap;
use tokio::task::JoinSet;

use super::cancel::{CancelToken, CompletionGuard, InterruptGuard};
use super::pool_size;
use super::queue::TaskQueue;
use crate::compiler::SharedCompilers;
use crate::config::RunOptions;
use crate::error::{Error, Result};
use crate::report::CompileResult;
use crate::worker::WorkerHandle;

/// Compile every queued template with every loaded compiler version.
///
/// Results are concatenated in worker completion order. Any task failure,
/// worker exit, deadline or interrupt cancels the whole run; every worker is
/// still terminated before this returns. When too few tasks exist for a
/// single worker, nothing is compiled and the result is empty.
///
/// `cancel` is left cancelled with [`CancelReason::Completed`](super::CancelReason::Completed) (or the
/// earlier cause) once the run is over.
pub async fn compile_templates(
    queue: Arc<TaskQueue>,
    shared: SharedCompilers,
    cancel: CancelToken,
    options: &RunOptions,
) -> Result<Vec<CompileResult>> {
    let _completion = CompletionGuard::new(&cancel);
    let tasks = queue.total();
    let workers = pool_size(tasks, options.parallelism);
    if workers == 0 {
        if tasks > 0 {
            tracing::warn!(tasks, "Too few templates for a worker pool, nothing compiled");
        }
        return Ok(Vec::new());
    }

    let _interrupt = options
        .handle_interrupt
        .then(|| InterruptGuard::install(&cancel));

    tracing::info!(
        workers,
        tasks,
        versions = shared.len(),
        "Starting worker pool"
    );

    let mut set = JoinSet::new();
    let mut worker_ids = FxHashMap::default();
    let mut failure: Option<Error> = None;

    for id in 0..workers {
        let worker = match WorkerHandle::spawn(id, shared.clone()) {
            Ok(worker) => worker,
            Err(e) => {
                cancel.cancel(e.cancel_reason());
                failure = Some(e);
                break;
            }
        };
        let handle = set.spawn(drive_worker(
            worker,
            queue.clone(),
            cancel.clone(),
            options.task_timeout,
        ));
        worker_ids.insert(handle.id(), id);
    }

    let mut results = Vec::with_capacity(tasks * shared.len());
    while let Some(joined) = set.join_next_with_id().await {
        let outcome = match joined {
            Ok((_, outcome)) => outcome,
            Err(e) => Err(Error::Worker {
                id: worker_ids.get(&e.id()).copied().unwrap_or_default(),
                message: format!("worker loop aborted: {}", e),
            }),
        };
        match outcome {
            Ok(mut batch) => results.append(&mut batch),
            Err(e) => {
                cancel.cancel(e.cancel_reason());
                failure = Some(prefer_error(failure, e));
            }
        }
    }

    if let Some(e) = failure {
        tracing::debug!(error = %e, "Worker pool stopped");
        return Err(e);
    }

    tracing::info!(results = results.len(), "Worker pool finished");
    Ok(results)
}

/// Run one worker's pull loop, then terminate it.
async fn drive_worker(
    mut worker: WorkerHandle,
    queue: Arc<TaskQueue>,
    cancel: CancelToken,
    timeout: Option<Duration>,
) -> Result<Vec<CompileResult>> {
    let outcome = serve(&mut worker, &queue, &cancel, timeout).await;
    if let Err(e) = &outcome {
        cancel.cancel(e.cancel_reason());
    }

    let terminated = worker.terminate().await;
    match (outcome, terminated) {
        (Err(e), _) => Err(e),
        (Ok(_), Err(e)) => {
            cancel.cancel(e.cancel_reason());
            Err(e)
        }
        (Ok(results), Ok(())) => Ok(results),
    }
}

async fn serve(
    worker: &mut WorkerHandle,
    queue: &TaskQueue,
    cancel: &CancelToken,
    timeout: Option<Duration>,
) -> Result<Vec<CompileResult>> {
    worker.handshake(cancel).await?;

    let mut results = Vec::new();
    let mut served = 0usize;
    loop {
        cancel.check()?;
        let Some(task) = queue.pop() else {
            break;
        };
        let batch = worker.compile(&task, cancel, timeout).await?;
        results.extend(batch);
        served += 1;
    }

    tracing::debug!(worker = worker.id(), served, "Queue drained");
    Ok(results)
}

/// Keep the most informative error: a real failure beats a cancellation.
fn prefer_error(current: Option<Error>, next: Error) -> Error {
    match current {
        Some(existing) if !existing.is_cancelled() || next.is_cancelled() => existing,
        _ => next,
    }
}
