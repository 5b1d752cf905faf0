//! Compression primitives.
//!
//! Both algorithms run at their maximum quality setting; only the
//! compressed length is reported.

use std::fmt;
use std::io::Write;

use brotli::enc::BrotliEncoderParams;
use brotli::enc::backward_references::BrotliEncoderMode;
use flate2::Compression;
use flate2::write::GzEncoder;

use crate::error::{Error, Result};

/// Highest brotli quality level.
const BROTLI_MAX_QUALITY: i32 = 11;

/// Supported compression algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Gzip,
    Brotli,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Algorithm::Gzip => write!(f, "gzip"),
            Algorithm::Brotli => write!(f, "brotli"),
        }
    }
}

/// Length of `bytes` after compression with `algorithm`.
pub fn compressed_len(bytes: &[u8], algorithm: Algorithm) -> Result<u64> {
    let len = match algorithm {
        Algorithm::Gzip => gzip(bytes),
        Algorithm::Brotli => brotli(bytes),
    }
    .map_err(|e| Error::Compression(format!("{}: {}", algorithm, e)))?;
    Ok(len as u64)
}

fn gzip(bytes: &[u8]) -> std::io::Result<usize> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::best());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?.len())
}

fn brotli(bytes: &[u8]) -> std::io::Result<usize> {
    let params = BrotliEncoderParams {
        quality: BROTLI_MAX_QUALITY,
        mode: BrotliEncoderMode::BROTLI_MODE_TEXT,
        size_hint: bytes.len(),
        ..Default::default()
    };
    let mut output = Vec::with_capacity(bytes.len() / 2);
    let mut input = bytes;
    brotli::BrotliCompress(&mut input, &mut output, &params)?;
    Ok(output.len())
}
