//! Core engine for measuring compiled template sizes.
//!
//! This crate provides:
//! - Template discovery with glob and ignore patterns
//! - Versioned compiler loading with shared, read-only execution caches
//! - A bounded pool of worker threads fed by a pull-based task queue
//! - Cooperative cancellation merged from interrupts, worker failures and completion
//! - Per-version size aggregation and JSON report output

pub mod compiler;
pub mod config;
pub mod discover;
pub mod error;
pub mod execute;
pub mod measure;
pub mod report;
pub mod worker;

pub use compiler::{
    CompilerBackend, CompilerVersionState, MustacheBackend, Restored, SharedCompilers,
    TemplateCompiler, load_compilers,
};
pub use config::{RunConfig, RunOptions};
pub use discover::find_templates;
pub use error::{Error, Result};
pub use execute::{CancelReason, CancelToken, Progress, TaskQueue, compile_templates, pool_size};
pub use report::{CompileResult, Report, SizeTotals, Summary, summarize};
