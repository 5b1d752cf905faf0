//! Versioned template compilers.
//!
//! The compiler itself is an opaque capability: a [`CompilerBackend`] turns a
//! compiler's source into a runnable [`TemplateCompiler`], either cold or from
//! a previously serialized execution cache. This module loads every version
//! once per run and publishes the result as [`SharedCompilers`], read-only
//! buffers that every worker reconstructs its compilers from.
//!
//! # Module Structure
//!
//! - `state` - Version discovery, warm-up and the shared, frozen compiler state
//! - `mustache` - Built-in backend driven by a JSON compiler definition

mod mustache;
mod state;

use std::path::Path;

use crate::error::Result;

pub use mustache::MustacheBackend;
pub use state::{
    COMPILER_FILE_PREFIX, CompilerVersionState, LoadedCompiler, SharedCompilers, WARMUP_TEMPLATE,
    discover_versions, load_compilers,
};

/// A runnable template compiler for one version.
pub trait TemplateCompiler {
    /// Compile template source into its wire format.
    fn precompile(&self, template: &str) -> Result<String>;

    /// Serialize the execution cache accumulated so far.
    ///
    /// Called after a warm-up compile so the cache reflects real work.
    fn create_cached_data(&self) -> Result<Vec<u8>>;
}

/// A compiler reconstructed from an execution cache.
pub struct Restored {
    /// The reconstructed compiler.
    pub compiler: Box<dyn TemplateCompiler>,
    /// The cache did not match the source and the compiler was built cold.
    pub cache_rejected: bool,
}

/// Pluggable compiler implementation.
pub trait CompilerBackend: Send + Sync {
    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Extension of compiler source files, without the dot.
    fn file_extension(&self) -> &str;

    /// Build a compiler from source, paying the full cold-compile cost.
    fn compile(&self, source: &[u8], filename: &Path) -> Result<Box<dyn TemplateCompiler>>;

    /// Rebuild a compiler from source and its execution cache.
    ///
    /// A cache that does not belong to `source` is not an error: the backend
    /// falls back to a cold compile and reports `cache_rejected`.
    fn restore(&self, source: &[u8], cached_data: &[u8], filename: &Path) -> Result<Restored>;
}
