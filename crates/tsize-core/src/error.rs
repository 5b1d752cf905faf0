//! Error types for tsize-core.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::execute::CancelReason;

/// Result type for tsize-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tsize-core.
#[derive(Debug, Error)]
pub enum Error {
    /// No compiler versions were found.
    #[error("no template compilers found in {}", .0.display())]
    NoCompilers(PathBuf),

    /// A compiler version failed to load or warm up.
    #[error("failed to load compiler {version} from {}: {message}", filename.display())]
    CompilerSetup {
        version: String,
        filename: PathBuf,
        message: String,
    },

    /// The template compiler rejected its input.
    #[error("template error: {0}")]
    Template(String),

    /// A worker failed while processing a specific file.
    #[error("failed to compile {}: {message}", filename.display())]
    TaskFailed { filename: PathBuf, message: String },

    /// A worker failed outside of a task (setup, handshake, join).
    #[error("worker {id} failed: {message}")]
    Worker { id: usize, message: String },

    /// A worker closed its channel before the orchestrator was done with it.
    #[error("worker {id} exited early")]
    WorkerExited { id: usize },

    /// A worker did not answer within the per-task deadline.
    #[error("worker {id} timed out after {}s compiling {}", timeout.as_secs_f64(), filename.display())]
    TaskTimeout {
        id: usize,
        filename: PathBuf,
        timeout: Duration,
    },

    /// The run was cancelled before it completed.
    #[error("run cancelled: {0}")]
    Cancelled(CancelReason),

    /// Execution cache could not be produced or decoded.
    #[error("execution cache error: {0}")]
    Cache(String),

    /// Compression of compiled output failed.
    #[error("compression failed: {0}")]
    Compression(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid glob or ignore pattern.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] globset::Error),

    /// Directory walk failed.
    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a cancellation outcome rather than a root cause.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }

    /// The cancellation cause this error triggers when it unwinds a worker loop.
    pub fn cancel_reason(&self) -> CancelReason {
        match self {
            Error::Cancelled(reason) => *reason,
            Error::WorkerExited { .. } => CancelReason::WorkerExited,
            Error::TaskTimeout { .. } => CancelReason::TimedOut,
            _ => CancelReason::WorkerFailed,
        }
    }

    /// Short recovery hint for the user, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Error::NoCompilers(_) => Some(
                "add files named template-compiler_<version>.json to the directory, \
                 or point --compilers / TSIZE_COMPILERS_DIR at another one",
            ),
            Error::TaskFailed { .. } | Error::Template(_) => {
                Some("fix or --ignore the offending template and run again")
            }
            Error::TaskTimeout { .. } => Some("raise --task-timeout or drop it to wait indefinitely"),
            Error::Pattern(_) => Some("check the --glob and --ignore patterns"),
            _ => None,
        }
    }

    /// Render the error followed by its hint.
    pub fn with_hint(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{}\n  hint: {}", self, hint),
            None => self.to_string(),
        }
    }
}
