//! Orchestrator-side handle to a worker thread.

use std::path::Path;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::protocol::{WorkerEvent, WorkerPort, WorkerRequest, WorkerResponse};
use super::runtime;
use crate::compiler::SharedCompilers;
use crate::error::{Error, Result};
use crate::execute::CancelToken;
use crate::report::CompileResult;

/// Interval at which a stalled worker is checked for exit.
const STALL_POLL: Duration = Duration::from_millis(10);

/// Handle to one worker thread.
///
/// Lifecycle: spawned, ready after [`handshake`](Self::handshake), serving
/// through [`compile`](Self::compile), and finally [`terminate`](Self::terminate)d.
pub struct WorkerHandle {
    id: usize,
    /// The worker thread, until joined or detached.
    thread: Option<JoinHandle<()>>,
    /// Lifecycle events, until the handshake completes.
    events: Option<mpsc::Receiver<WorkerEvent>>,
    /// Private channel, once the handshake completes.
    port: Option<WorkerPort>,
    /// A task outlived this deadline; the thread is only joined if it
    /// finishes within the same grace period.
    stalled: Option<Duration>,
}

impl WorkerHandle {
    /// Start a worker thread over the shared compiler state.
    pub fn spawn(id: usize, shared: SharedCompilers) -> Result<Self> {
        let (event_tx, events) = mpsc::channel(1);
        let thread = thread::Builder::new()
            .name(format!("tsize-worker-{}", id))
            .spawn(move || runtime::run(id, shared, event_tx))
            .map_err(|e| Error::Worker {
                id,
                message: format!("failed to spawn thread: {}", e),
            })?;

        tracing::debug!(worker = id, "Spawned worker");
        Ok(Self {
            id,
            thread: Some(thread),
            events: Some(events),
            port: None,
            stalled: None,
        })
    }

    /// Worker index within the pool.
    pub fn id(&self) -> usize {
        self.id
    }

    /// Whether the handshake has completed.
    #[cfg(test)]
    fn is_ready(&self) -> bool {
        self.port.is_some()
    }

    /// Wait for the worker to publish its channel.
    pub async fn handshake(&mut self, cancel: &CancelToken) -> Result<()> {
        let id = self.id;
        let events = self.events.as_mut().ok_or_else(|| Error::Worker {
            id,
            message: "handshake already performed".to_string(),
        })?;

        match cancel.race(events.recv()).await? {
            Some(WorkerEvent::Ready(port)) => {
                self.port = Some(port);
                self.events = None;
                Ok(())
            }
            Some(WorkerEvent::SetupFailed { message }) => Err(Error::Worker { id, message }),
            None => Err(Error::WorkerExited { id }),
        }
    }

    /// Send one task and wait for its results.
    ///
    /// Both waits race `cancel`. With a `timeout`, a late response fails the
    /// task with [`Error::TaskTimeout`].
    pub async fn compile(
        &mut self,
        filename: &Path,
        cancel: &CancelToken,
        timeout: Option<Duration>,
    ) -> Result<Vec<CompileResult>> {
        let id = self.id;
        let port = self.port.as_mut().ok_or_else(|| Error::Worker {
            id,
            message: "compile requested before handshake".to_string(),
        })?;

        let request = WorkerRequest::Compile {
            filename: filename.to_path_buf(),
        };
        cancel
            .race(port.requests.send(request))
            .await?
            .map_err(|_| Error::WorkerExited { id })?;

        let response = match timeout {
            Some(limit) => match cancel
                .race(tokio::time::timeout(limit, port.responses.recv()))
                .await?
            {
                Ok(response) => response,
                Err(_) => {
                    self.stalled = Some(limit);
                    return Err(Error::TaskTimeout {
                        id,
                        filename: filename.to_path_buf(),
                        timeout: limit,
                    });
                }
            },
            None => cancel.race(port.responses.recv()).await?,
        };

        match response {
            Some(WorkerResponse::Results(results)) => Ok(results),
            Some(WorkerResponse::Failed { filename, message }) => {
                Err(Error::TaskFailed { filename, message })
            }
            None => Err(Error::WorkerExited { id }),
        }
    }

    /// Stop the worker and wait for its thread to finish.
    ///
    /// A worker busy with a task finishes that task first. A stalled worker
    /// gets one more task timeout to finish and is detached if it does not.
    pub async fn terminate(mut self) -> Result<()> {
        let id = self.id;
        self.close();

        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        if let Some(grace) = self.stalled {
            let deadline = Instant::now() + grace;
            while !thread.is_finished() {
                if Instant::now() >= deadline {
                    tracing::warn!(worker = id, ?grace, "Detaching stalled worker");
                    return Ok(());
                }
                tokio::time::sleep(STALL_POLL).await;
            }
        }

        let joined = tokio::task::spawn_blocking(move || thread.join())
            .await
            .map_err(|e| Error::Worker {
                id,
                message: format!("failed to join: {}", e),
            })?;
        if joined.is_err() {
            return Err(Error::Worker {
                id,
                message: "thread panicked".to_string(),
            });
        }

        tracing::debug!(worker = id, "Worker terminated");
        Ok(())
    }

    /// Ask the worker to stop and drop every channel end it may block on.
    fn close(&mut self) {
        if let Some(port) = self.port.take() {
            let _ = port.requests.try_send(WorkerRequest::Shutdown);
        }
        self.events = None;
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        // Dropping the channels makes the thread exit once its current task
        // is done; it is left detached.
        self.close();
    }
}
