//! Worker thread body.
//!
//! Runs on a dedicated OS thread and talks to the async side with the
//! blocking halves of tokio channels.

use std::any::Any;
use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use tokio::sync::mpsc;

use super::protocol::{WorkerEvent, WorkerPort, WorkerRequest, WorkerResponse};
use crate::compiler::{LoadedCompiler, SharedCompilers};
use crate::error::Result;
use crate::measure::{Algorithm, compressed_len};
use crate::report::CompileResult;

/// Serve compile requests until shutdown, a closed channel, or a failed task.
pub(crate) fn run(id: usize, shared: SharedCompilers, events: mpsc::Sender<WorkerEvent>) {
    let compilers = match panic::catch_unwind(AssertUnwindSafe(|| shared.instantiate(id))) {
        Ok(Ok(compilers)) => compilers,
        Ok(Err(e)) => {
            let _ = events.blocking_send(WorkerEvent::SetupFailed {
                message: e.to_string(),
            });
            return;
        }
        Err(payload) => {
            let _ = events.blocking_send(WorkerEvent::SetupFailed {
                message: format!("panicked during setup: {}", panic_message(payload.as_ref())),
            });
            return;
        }
    };

    let (request_tx, mut requests) = mpsc::channel(1);
    let (responses, response_rx) = mpsc::channel(1);
    let port = WorkerPort {
        requests: request_tx,
        responses: response_rx,
    };
    if events.blocking_send(WorkerEvent::Ready(port)).is_err() {
        tracing::debug!(worker = id, "Parent went away before handshake");
        return;
    }
    drop(events);
    tracing::debug!(worker = id, versions = compilers.len(), "Worker ready");

    let mut served = 0usize;
    while let Some(request) = requests.blocking_recv() {
        let filename = match request {
            WorkerRequest::Compile { filename } => filename,
            WorkerRequest::Shutdown => break,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| measure_file(&filename, &compilers)));
        let response = match outcome {
            Ok(Ok(results)) => WorkerResponse::Results(results),
            Ok(Err(e)) => WorkerResponse::Failed {
                filename,
                message: e.to_string(),
            },
            Err(payload) => WorkerResponse::Failed {
                filename,
                message: format!("worker panicked: {}", panic_message(payload.as_ref())),
            },
        };

        let failed = matches!(response, WorkerResponse::Failed { .. });
        if responses.blocking_send(response).is_err() || failed {
            break;
        }
        served += 1;
    }

    tracing::debug!(worker = id, served, "Worker stopped");
}

/// Compile one template with every version and measure the output.
fn measure_file(filename: &Path, compilers: &[LoadedCompiler]) -> Result<Vec<CompileResult>> {
    let bytes = fs::read(filename)?;
    let source = String::from_utf8_lossy(&bytes);
    let display = filename.to_string_lossy().into_owned();

    compilers
        .iter()
        .map(|loaded| -> Result<CompileResult> {
            let compiled = loaded.compiler.precompile(&source)?;
            Ok(CompileResult {
                filename: display.clone(),
                version: loaded.version.clone(),
                original: bytes.len() as u64,
                compiled: compiled.len() as u64,
                gzip: compressed_len(compiled.as_bytes(), Algorithm::Gzip)?,
                brotli: compressed_len(compiled.as_bytes(), Algorithm::Brotli)?,
            })
        })
        .collect()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
