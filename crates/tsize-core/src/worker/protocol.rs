//! Messages exchanged between the orchestrator and a worker thread.
//!
//! Every channel is bounded to one slot: a worker has at most one task in
//! flight and at most one response waiting to be read.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::report::CompileResult;

/// Command sent from the orchestrator to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerRequest {
    /// Compile and measure one template across every loaded version.
    Compile {
        /// Absolute template path.
        filename: PathBuf,
    },

    /// Stop serving and release the compilers.
    Shutdown,
}

/// Reply to a [`WorkerRequest::Compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerResponse {
    /// One result per loaded version, in version order.
    Results(Vec<CompileResult>),

    /// The task failed. The worker stops serving after sending this.
    Failed {
        /// Template that caused the failure.
        filename: PathBuf,
        /// Error or panic message.
        message: String,
    },
}

/// Lifecycle event published by a worker to its parent.
#[derive(Debug)]
pub enum WorkerEvent {
    /// Compilers are ready; the port is the worker's private channel.
    Ready(WorkerPort),

    /// Compilers could not be reconstructed; the worker has exited.
    SetupFailed {
        /// Error message.
        message: String,
    },
}

/// Parent side of a worker's private channel.
#[derive(Debug)]
pub struct WorkerPort {
    /// Requests into the worker.
    pub requests: mpsc::Sender<WorkerRequest>,
    /// Responses out of the worker.
    pub responses: mpsc::Receiver<WorkerResponse>,
}
