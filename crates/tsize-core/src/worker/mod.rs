//! Worker threads that compile and measure templates.
//!
//! Each worker owns one OS thread and one private channel. On startup it
//! rebuilds a compiler per version from the shared execution caches, then
//! publishes its channel to the orchestrator and serves one task at a time.
//! A task failure is sent back as [`WorkerResponse::Failed`] and ends the
//! worker.

pub mod protocol;
mod handle;
mod runtime;

pub use handle::WorkerHandle;
pub use protocol::{WorkerEvent, WorkerPort, WorkerRequest, WorkerResponse};
