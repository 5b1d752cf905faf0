//! Shared compiler state.
//!
//! Each version is read and warmed up exactly once per run. The resulting
//! buffers are frozen behind `Arc<[u8]>` and handed to every worker.

use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;

use super::{CompilerBackend, TemplateCompiler};
use crate::error::{Error, Result};

/// File name prefix of versioned compilers: `template-compiler_<version>.<ext>`.
pub const COMPILER_FILE_PREFIX: &str = "template-compiler_";

/// Representative input run through every compiler before its cache is taken.
pub const WARMUP_TEMPLATE: &str = r#"
<section class="profile">
  {{#if user}}
    {{#with (format-name user.first user.last) as |name|}}
      <h1 title={{name}}>{{name}}</h1>
      {{user-badge user size="large" tone=(theme-color "primary")}}
    {{/with}}
    <ProfileCard @user={{this.user}} @onSave={{action "save"}} class="card" as |card|>
      {{card.body}}
      <button {{on "click" this.refresh}}>Refresh</button>
    </ProfileCard>
    {{! profile footer }}
    {{{user.bio}}}
  {{else}}
    Nobody is signed in.
  {{/if}}
</section>
"#;

/// Immutable, shareable state for one compiler version.
#[derive(Clone)]
pub struct CompilerVersionState {
    /// Version identifier.
    pub version: String,
    /// Compiler source path.
    pub filename: PathBuf,
    /// Raw compiler source.
    pub source: Arc<[u8]>,
    /// Serialized execution cache produced after warm-up.
    pub cached_data: Arc<[u8]>,
}

impl CompilerVersionState {
    /// Read, compile and warm up one compiler version.
    ///
    /// Any failure here is a setup error for the whole run.
    pub fn load(backend: &dyn CompilerBackend, version: &str, filename: &Path) -> Result<Self> {
        let setup_error = |message: String| Error::CompilerSetup {
            version: version.to_string(),
            filename: filename.to_path_buf(),
            message,
        };

        let source = read_source(filename).map_err(|e| setup_error(e.to_string()))?;
        let compiler = backend
            .compile(&source, filename)
            .map_err(|e| setup_error(e.to_string()))?;
        compiler
            .precompile(WARMUP_TEMPLATE)
            .map_err(|e| setup_error(format!("warm-up compile failed: {}", e)))?;
        let cached_data = compiler
            .create_cached_data()
            .map_err(|e| setup_error(e.to_string()))?;

        tracing::debug!(
            version,
            source_bytes = source.len(),
            cache_bytes = cached_data.len(),
            "Loaded compiler"
        );

        Ok(Self {
            version: version.to_string(),
            filename: filename.to_path_buf(),
            source: Arc::from(source),
            cached_data: Arc::from(cached_data),
        })
    }
}

impl fmt::Debug for CompilerVersionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilerVersionState")
            .field("version", &self.version)
            .field("filename", &self.filename)
            .field("source_bytes", &self.source.len())
            .field("cache_bytes", &self.cached_data.len())
            .finish()
    }
}

/// Read a file into a buffer sized exactly to it.
fn read_source(filename: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(filename)?;
    let size = file.metadata()?.len() as usize;
    let mut buffer = vec![0u8; size];
    file.read_exact(&mut buffer)?;
    Ok(buffer)
}

/// A compiler instance owned by a single worker.
pub struct LoadedCompiler {
    pub version: String,
    pub compiler: Box<dyn TemplateCompiler>,
}

/// Every loaded version plus the backend that can rebuild them.
///
/// Cloning is cheap and never copies the underlying buffers.
#[derive(Clone)]
pub struct SharedCompilers {
    backend: Arc<dyn CompilerBackend>,
    versions: Arc<[CompilerVersionState]>,
}

impl SharedCompilers {
    /// Freeze a set of loaded versions.
    pub fn new(backend: Arc<dyn CompilerBackend>, versions: Vec<CompilerVersionState>) -> Self {
        Self {
            backend,
            versions: Arc::from(versions),
        }
    }

    /// The loaded versions, in report order.
    pub fn versions(&self) -> &[CompilerVersionState] {
        &self.versions
    }

    /// Version identifiers, in report order.
    pub fn version_names(&self) -> Vec<&str> {
        self.versions.iter().map(|v| v.version.as_str()).collect()
    }

    /// Number of versions.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Whether no versions are loaded.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Rebuild one compiler per version from the shared buffers.
    ///
    /// Called once per worker. A rejected cache is logged and otherwise ignored.
    pub fn instantiate(&self, worker_id: usize) -> Result<Vec<LoadedCompiler>> {
        self.versions
            .iter()
            .map(|state| -> Result<LoadedCompiler> {
                let restored =
                    self.backend
                        .restore(&state.source, &state.cached_data, &state.filename)?;
                if restored.cache_rejected {
                    tracing::warn!(
                        worker = worker_id,
                        version = %state.version,
                        "Execution cache rejected, compiled cold"
                    );
                }
                Ok(LoadedCompiler {
                    version: state.version.clone(),
                    compiler: restored.compiler,
                })
            })
            .collect()
    }
}

impl fmt::Debug for SharedCompilers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCompilers")
            .field("backend", &self.backend.name())
            .field("versions", &self.versions)
            .finish()
    }
}

/// List `template-compiler_<version>.<extension>` files in `dir`, sorted by version.
pub fn discover_versions(dir: &Path, extension: &str) -> Result<Vec<(String, PathBuf)>> {
    let suffix = format!(".{}", extension);
    let mut versions = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        let version = name
            .strip_prefix(COMPILER_FILE_PREFIX)
            .and_then(|rest| rest.strip_suffix(suffix.as_str()));
        if let Some(version) = version {
            if !version.is_empty() {
                versions.push((version.to_string(), entry.path()));
            }
        }
    }
    versions.sort();
    Ok(versions)
}

/// Discover and load every compiler version in `dir`.
///
/// Versions are loaded in parallel; the first failure aborts setup.
pub fn load_compilers(backend: Arc<dyn CompilerBackend>, dir: &Path) -> Result<SharedCompilers> {
    let found = discover_versions(dir, backend.file_extension())?;
    if found.is_empty() {
        return Err(Error::NoCompilers(dir.to_path_buf()));
    }

    let states = found
        .par_iter()
        .map(|(version, filename)| CompilerVersionState::load(backend.as_ref(), version, filename))
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(
        backend = backend.name(),
        versions = states.len(),
        "Loaded template compilers"
    );
    Ok(SharedCompilers::new(backend, states))
}
