//! Built-in mustache template compiler.
//!
//! A compiler "source" is a JSON definition describing delimiters, whitespace
//! handling and the opcode names of the wire format:
//!
//! ```json
//! {
//!   "open": "{{",
//!   "close": "}}",
//!   "collapse_whitespace": true,
//!   "keep_comments": false,
//!   "envelope": "block",
//!   "opcodes": { "text": "t", "append": "a" }
//! }
//! ```
//!
//! Every field is optional. A cold compile parses and validates the definition
//! into a [`Program`]. The execution cache is the rkyv-archived program, tagged
//! with a format version and a hash of the source it was built from.

use std::cell::Cell;
use std::hash::Hasher;
use std::path::Path;

use rustc_hash::FxHasher;
use serde_json::{Map, Value};

use super::{CompilerBackend, Restored, TemplateCompiler};
use crate::error::{Error, Result};

/// Execution cache format version.
///
/// Caches carrying another version are rejected.
pub const CACHE_FORMAT: u32 = 1;

/// Opcode names used in the compiled wire format.
#[derive(
    Debug,
    Clone,
    PartialEq,
    Eq,
    serde::Deserialize,
    rkyv::Archive,
    rkyv::Serialize,
    rkyv::Deserialize,
)]
#[serde(default, deny_unknown_fields)]
struct Opcodes {
    text: String,
    append: String,
    raw: String,
    block: String,
    inverse: String,
    close: String,
    comment: String,
}

impl Default for Opcodes {
    fn default() -> Self {
        Self {
            text: "t".to_string(),
            append: "a".to_string(),
            raw: "r".to_string(),
            block: "b".to_string(),
            inverse: "e".to_string(),
            close: "c".to_string(),
            comment: "!".to_string(),
        }
    }
}

impl Opcodes {
    fn all(&self) -> [&str; 7] {
        [
            self.text.as_str(),
            self.append.as_str(),
            self.raw.as_str(),
            self.block.as_str(),
            self.inverse.as_str(),
            self.close.as_str(),
            self.comment.as_str(),
        ]
    }
}

/// Compiler definition as written on disk.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct Definition {
    open: String,
    close: String,
    collapse_whitespace: bool,
    keep_comments: bool,
    envelope: String,
    opcodes: Opcodes,
}

impl Default for Definition {
    fn default() -> Self {
        Self {
            open: "{{".to_string(),
            close: "}}".to_string(),
            collapse_whitespace: false,
            keep_comments: false,
            envelope: "block".to_string(),
            opcodes: Opcodes::default(),
        }
    }
}

/// A validated, ready-to-run compiler definition.
#[derive(Debug, Clone, PartialEq, Eq, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
struct Program {
    open: String,
    close: String,
    /// Closing delimiter of an unescaped `{{{...}}}` mustache.
    raw_close: String,
    collapse_whitespace: bool,
    keep_comments: bool,
    envelope: String,
    opcodes: Opcodes,
}

impl Program {
    /// Parse and validate a JSON definition.
    fn parse(source: &[u8]) -> Result<Self> {
        let def: Definition = serde_json::from_slice(source)
            .map_err(|e| Error::Serialization(format!("invalid compiler definition: {}", e)))?;

        let invalid = |message: &str| -> Result<Self> {
            Err(Error::Serialization(format!(
                "invalid compiler definition: {}",
                message
            )))
        };
        if def.open.is_empty() || def.close.is_empty() {
            return invalid("delimiters must not be empty");
        }
        if def.open == def.close {
            return invalid("open and close delimiters must differ");
        }
        if def.envelope.is_empty() {
            return invalid("envelope must not be empty");
        }
        if def.opcodes.all().iter().any(|op| op.is_empty()) {
            return invalid("opcode names must not be empty");
        }

        Ok(Self {
            raw_close: format!("}}{}", def.close),
            open: def.open,
            close: def.close,
            collapse_whitespace: def.collapse_whitespace,
            keep_comments: def.keep_comments,
            envelope: def.envelope,
            opcodes: def.opcodes,
        })
    }
}

/// Serialized execution cache.
#[derive(Debug, rkyv::Archive, rkyv::Serialize, rkyv::Deserialize)]
struct CachedProgram {
    format: u32,
    source_hash: u64,
    /// Statements compiled before the cache was taken.
    warm_statements: u64,
    program: Program,
}

fn source_hash(source: &[u8]) -> u64 {
    let mut hasher = FxHasher::default();
    hasher.write(source);
    hasher.finish()
}

fn decode_cache(bytes: &[u8]) -> Result<CachedProgram> {
    // rkyv needs an aligned buffer; shared slices carry no alignment guarantee
    let mut aligned = rkyv::util::AlignedVec::<16>::with_capacity(bytes.len());
    aligned.extend_from_slice(bytes);
    rkyv::from_bytes::<CachedProgram, rkyv::rancor::Error>(&aligned)
        .map_err(|e| Error::Cache(format!("failed to decode execution cache: {}", e)))
}

/// One parsed mustache statement.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Statement {
    Text(String),
    Append(String),
    Raw(String),
    Block { name: String, params: String },
    Inverse(String),
    Close(String),
    Comment(String),
}

/// Collapse internal whitespace runs to single spaces.
fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn template_error(line: usize, message: impl std::fmt::Display) -> Error {
    Error::Template(format!("line {}: {}", line, message))
}

fn newlines(text: &str) -> usize {
    text.bytes().filter(|&b| b == b'\n').count()
}

/// Mustache compiler instance.
pub struct MustacheCompiler {
    program: Program,
    source_hash: u64,
    statements: Cell<u64>,
}

impl MustacheCompiler {
    fn new(program: Program, source_hash: u64, statements: u64) -> Self {
        Self {
            program,
            source_hash,
            statements: Cell::new(statements),
        }
    }

    fn push_text(&self, text: &str, statements: &mut Vec<Statement>) {
        if self.program.collapse_whitespace {
            let collapsed = normalize(text);
            if !collapsed.is_empty() {
                statements.push(Statement::Text(collapsed));
            }
        } else if !text.is_empty() {
            statements.push(Statement::Text(text.to_string()));
        }
    }

    fn classify(
        &self,
        body: &str,
        raw: bool,
        line: usize,
        blocks: &mut Vec<(String, usize)>,
    ) -> Result<Option<Statement>> {
        if body.is_empty() {
            return Err(template_error(line, "empty mustache"));
        }
        if raw {
            return Ok(Some(Statement::Raw(normalize(body))));
        }
        if let Some(comment) = body.strip_prefix('!') {
            return Ok(self
                .program
                .keep_comments
                .then(|| Statement::Comment(comment.trim().to_string())));
        }
        if let Some(open) = body.strip_prefix('#') {
            let open = open.trim_start();
            let (name, params) = open.split_once(char::is_whitespace).unwrap_or((open, ""));
            if name.is_empty() {
                return Err(template_error(line, "block without a name"));
            }
            blocks.push((name.to_string(), line));
            return Ok(Some(Statement::Block {
                name: name.to_string(),
                params: normalize(params),
            }));
        }
        if let Some(close) = body.strip_prefix('/') {
            let name = close.trim();
            return match blocks.pop() {
                Some((open, _)) if open == name => Ok(Some(Statement::Close(open))),
                Some((open, open_line)) => Err(template_error(
                    line,
                    format!(
                        "closing '{}' does not match '{}' opened on line {}",
                        name, open, open_line
                    ),
                )),
                None => Err(template_error(
                    line,
                    format!("closing '{}' without an open block", name),
                )),
            };
        }
        if let Some(rest) = body.strip_prefix("else") {
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                if blocks.is_empty() {
                    return Err(template_error(line, "'else' outside of a block"));
                }
                return Ok(Some(Statement::Inverse(normalize(rest))));
            }
        }
        Ok(Some(Statement::Append(normalize(body))))
    }

    fn parse(&self, template: &str) -> Result<Vec<Statement>> {
        let program = &self.program;
        let mut statements = Vec::new();
        let mut blocks: Vec<(String, usize)> = Vec::new();
        let mut rest = template;
        let mut line = 1;

        while !rest.is_empty() {
            let Some(start) = rest.find(program.open.as_str()) else {
                self.push_text(rest, &mut statements);
                break;
            };
            let text = &rest[..start];
            self.push_text(text, &mut statements);
            line += newlines(text);

            let after_open = &rest[start + program.open.len()..];
            let (body, raw, consumed) = match after_open.strip_prefix('{') {
                Some(inner) => {
                    let end = inner
                        .find(program.raw_close.as_str())
                        .ok_or_else(|| template_error(line, "unclosed mustache"))?;
                    (&inner[..end], true, 1 + end + program.raw_close.len())
                }
                None => {
                    let end = after_open
                        .find(program.close.as_str())
                        .ok_or_else(|| template_error(line, "unclosed mustache"))?;
                    (&after_open[..end], false, end + program.close.len())
                }
            };

            if let Some(statement) = self.classify(body.trim(), raw, line, &mut blocks)? {
                statements.push(statement);
            }
            line += newlines(body);
            rest = &after_open[consumed..];
        }

        if let Some((name, open_line)) = blocks.pop() {
            return Err(template_error(
                open_line,
                format!("block '{}' is never closed", name),
            ));
        }
        Ok(statements)
    }

    fn encode(&self, statements: &[Statement]) -> Value {
        fn op(name: &str, args: &[&str]) -> Value {
            let mut entry = vec![Value::from(name)];
            entry.extend(args.iter().map(|&arg| Value::from(arg)));
            Value::Array(entry)
        }

        let ops = &self.program.opcodes;
        let encoded = statements
            .iter()
            .map(|statement| match statement {
                Statement::Text(text) => op(&ops.text, &[text.as_str()]),
                Statement::Append(expr) => op(&ops.append, &[expr.as_str()]),
                Statement::Raw(expr) => op(&ops.raw, &[expr.as_str()]),
                Statement::Block { name, params } if params.is_empty() => {
                    op(&ops.block, &[name.as_str()])
                }
                Statement::Block { name, params } => {
                    op(&ops.block, &[name.as_str(), params.as_str()])
                }
                Statement::Inverse(params) if params.is_empty() => op(&ops.inverse, &[]),
                Statement::Inverse(params) => op(&ops.inverse, &[params.as_str()]),
                Statement::Close(name) => op(&ops.close, &[name.as_str()]),
                Statement::Comment(text) => op(&ops.comment, &[text.as_str()]),
            })
            .collect();

        let mut envelope = Map::new();
        envelope.insert(self.program.envelope.clone(), Value::Array(encoded));
        Value::Object(envelope)
    }
}

impl TemplateCompiler for MustacheCompiler {
    fn precompile(&self, template: &str) -> Result<String> {
        let statements = self.parse(template)?;
        self.statements
            .set(self.statements.get() + statements.len() as u64);
        serde_json::to_string(&self.encode(&statements))
            .map_err(|e| Error::Serialization(format!("Failed to encode template: {}", e)))
    }

    fn create_cached_data(&self) -> Result<Vec<u8>> {
        let warm_statements = self.statements.get();
        if warm_statements == 0 {
            return Err(Error::Cache(
                "no template has been compiled; run a warm-up compile first".to_string(),
            ));
        }
        let cached = CachedProgram {
            format: CACHE_FORMAT,
            source_hash: self.source_hash,
            warm_statements,
            program: self.program.clone(),
        };
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&cached)
            .map_err(|e| Error::Cache(format!("failed to encode execution cache: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

/// Backend for JSON-defined mustache compilers (`template-compiler_<version>.json`).
#[derive(Debug, Clone, Copy, Default)]
pub struct MustacheBackend;

impl MustacheBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CompilerBackend for MustacheBackend {
    fn name(&self) -> &str {
        "mustache"
    }

    fn file_extension(&self) -> &str {
        "json"
    }

    fn compile(&self, source: &[u8], _filename: &Path) -> Result<Box<dyn TemplateCompiler>> {
        let program = Program::parse(source)?;
        Ok(Box::new(MustacheCompiler::new(program, source_hash(source), 0)))
    }

    fn restore(&self, source: &[u8], cached_data: &[u8], filename: &Path) -> Result<Restored> {
        let hash = source_hash(source);
        match decode_cache(cached_data) {
            Ok(cached) if cached.format == CACHE_FORMAT && cached.source_hash == hash => {
                Ok(Restored {
                    compiler: Box::new(MustacheCompiler::new(
                        cached.program,
                        hash,
                        cached.warm_statements,
                    )),
                    cache_rejected: false,
                })
            }
            outcome => {
                if let Err(e) = outcome {
                    tracing::debug!(file = %filename.display(), error = %e, "Unreadable execution cache");
                }
                Ok(Restored {
                    compiler: self.compile(source, filename)?,
                    cache_rejected: true,
                })
            }
        }
    }
}
