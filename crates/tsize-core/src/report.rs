//! Per-file results, per-version totals and the JSON report.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::ops::{Add, AddAssign};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sizes of one template compiled by one compiler version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileResult {
    /// Absolute path of the template.
    pub filename: String,
    /// Compiler version.
    pub version: String,
    /// Template size in bytes.
    pub original: u64,
    /// Compiled output size in bytes.
    pub compiled: u64,
    /// Compiled output size after gzip.
    pub gzip: u64,
    /// Compiled output size after brotli.
    pub brotli: u64,
}

/// Summed sizes for one compiler version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeTotals {
    pub original: u64,
    pub compiled: u64,
    pub gzip: u64,
    pub brotli: u64,
}

impl From<&CompileResult> for SizeTotals {
    fn from(result: &CompileResult) -> Self {
        Self {
            original: result.original,
            compiled: result.compiled,
            gzip: result.gzip,
            brotli: result.brotli,
        }
    }
}

impl AddAssign for SizeTotals {
    fn add_assign(&mut self, rhs: Self) {
        self.original += rhs.original;
        self.compiled += rhs.compiled;
        self.gzip += rhs.gzip;
        self.brotli += rhs.brotli;
    }
}

impl Add for SizeTotals {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

/// Totals keyed by compiler version.
pub type Summary = BTreeMap<String, SizeTotals>;

/// Fold results into per-version totals, each field summed on its own.
pub fn summarize(results: &[CompileResult]) -> Summary {
    let mut totals = Summary::new();
    for result in results {
        *totals.entry(result.version.clone()).or_default() += SizeTotals::from(result);
    }
    totals
}

/// The run's output artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Report {
    pub results: Vec<CompileResult>,
    pub summary: Summary,
}

impl Report {
    /// Build a report, computing the summary from `results`.
    pub fn new(results: Vec<CompileResult>) -> Self {
        let summary = summarize(&results);
        Self { results, summary }
    }

    /// Write the report as pretty-printed JSON.
    ///
    /// Writes to a sibling temp file and renames it into place, so a failed
    /// write never leaves a truncated report behind.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let temp_path = path.with_extension("json.tmp");
        {
            let file = fs::File::create(&temp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, self)
                .map_err(|e| Error::Serialization(format!("Failed to encode report: {}", e)))?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        fs::rename(&temp_path, path)?;

        tracing::info!(path = %path.display(), results = self.results.len(), "Wrote report");
        Ok(())
    }
}
