//! Run configuration.
//!
//! `RunConfig` describes what to measure and where to write the report;
//! `RunOptions` tunes how the worker pool runs.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

/// Default template glob.
pub const DEFAULT_GLOB: &[&str] = &["**/*.hbs"];

/// Default ignore patterns, relative to the search root.
pub const DEFAULT_IGNORE: &[&str] = &["**/node_modules", ".git", "tmp", "dist", "config", "build"];

/// Default report path.
pub const DEFAULT_OUTPUT: &str = "template-size-report.json";

/// Default directory holding versioned compilers.
pub const DEFAULT_COMPILERS_DIR: &str = "compilers";

/// Environment variable overriding the compilers directory.
pub const COMPILERS_DIR_ENV: &str = "TSIZE_COMPILERS_DIR";

/// What to measure and where to put the result.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Root directory searched for templates.
    pub root: PathBuf,
    /// Glob patterns selecting templates.
    pub globs: Vec<String>,
    /// Patterns pruned from the walk.
    pub ignore: Vec<String>,
    /// Report output path.
    pub output: PathBuf,
    /// Directory of `template-compiler_<version>.<ext>` files.
    pub compilers_dir: PathBuf,
    /// Pool tuning.
    pub options: RunOptions,
}

impl RunConfig {
    /// Create a config for `root` with defaults for everything else.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Compilers directory from `TSIZE_COMPILERS_DIR`, falling back to `compilers`.
    pub fn compilers_dir_from_env() -> PathBuf {
        std::env::var_os(COMPILERS_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_COMPILERS_DIR))
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            globs: DEFAULT_GLOB.iter().map(|s| s.to_string()).collect(),
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
            output: PathBuf::from(DEFAULT_OUTPUT),
            compilers_dir: Self::compilers_dir_from_env(),
            options: RunOptions::default(),
        }
    }
}

/// Worker pool tuning.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upper bound on worker threads.
    pub parallelism: usize,
    /// Deadline for a single task's result; `None` waits indefinitely.
    pub task_timeout: Option<Duration>,
    /// Observe the process interrupt signal for the duration of the run.
    pub handle_interrupt: bool,
}

impl RunOptions {
    /// Number of CPUs the process may use.
    pub fn available_parallelism() -> usize {
        std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1)
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            parallelism: Self::available_parallelism(),
            task_timeout: None,
            handle_interrupt: true,
        }
    }
}
