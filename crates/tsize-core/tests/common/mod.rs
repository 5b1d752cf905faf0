//! Shared fixtures for the pipeline integration tests.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use tsize_core::compiler::{CompilerBackend, Restored, TemplateCompiler, load_compilers};
use tsize_core::execute::TaskQueue;
use tsize_core::{Error, Result, RunOptions, SharedCompilers, find_templates};

/// Backend whose compilers upper-case templates and track how many are alive.
///
/// Templates containing `FAIL` are rejected and `PANIC` panics. `SLOW` takes
/// 300ms per version and `STUCK` a full second.
pub struct CountingBackend {
    pub live: Arc<AtomicUsize>,
    delay: Duration,
    restores: AtomicUsize,
    /// Zero-based `restore` call that fails, across all workers.
    fail_restore_at: Option<usize>,
}

pub struct CountingCompiler {
    tag: String,
    live: Arc<AtomicUsize>,
    delay: Duration,
}

impl CountingBackend {
    pub fn new(delay: Duration) -> Self {
        Self {
            live: Arc::new(AtomicUsize::new(0)),
            delay,
            restores: AtomicUsize::new(0),
            fail_restore_at: None,
        }
    }

    pub fn fail_restore_at(mut self, call: usize) -> Self {
        self.fail_restore_at = Some(call);
        self
    }

    fn build(&self, source: &[u8]) -> CountingCompiler {
        self.live.fetch_add(1, Ordering::SeqCst);
        CountingCompiler {
            tag: String::from_utf8_lossy(source).trim().to_string(),
            live: self.live.clone(),
            delay: self.delay,
        }
    }
}

impl CompilerBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn file_extension(&self) -> &str {
        "txt"
    }

    fn compile(&self, source: &[u8], _filename: &Path) -> Result<Box<dyn TemplateCompiler>> {
        Ok(Box::new(self.build(source)))
    }

    fn restore(&self, source: &[u8], cached_data: &[u8], _filename: &Path) -> Result<Restored> {
        let call = self.restores.fetch_add(1, Ordering::SeqCst);
        if self.fail_restore_at == Some(call) {
            return Err(Error::Template("restore refused".to_string()));
        }
        Ok(Restored {
            compiler: Box::new(self.build(source)),
            cache_rejected: cached_data != source,
        })
    }
}

impl TemplateCompiler for CountingCompiler {
    fn precompile(&self, template: &str) -> Result<String> {
        if template.contains("FAIL") {
            return Err(Error::Template("refused".to_string()));
        }
        if template.contains("PANIC") {
            panic!("compiler blew up");
        }
        if template.contains("SLOW") {
            thread::sleep(Duration::from_millis(300));
        }
        if template.contains("STUCK") {
            thread::sleep(Duration::from_secs(1));
        }
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        Ok(expected_output(&self.tag, template))
    }

    fn create_cached_data(&self) -> Result<Vec<u8>> {
        Ok(self.tag.as_bytes().to_vec())
    }
}

impl Drop for CountingCompiler {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn expected_output(tag: &str, template: &str) -> String {
    format!("{}:{}", tag, template.to_uppercase())
}

pub struct Fixture {
    _temp: TempDir,
    pub templates: PathBuf,
    pub shared: SharedCompilers,
    pub live: Arc<AtomicUsize>,
}

pub fn fixture(delay: Duration, templates: &[(&str, String)]) -> Fixture {
    fixture_with(CountingBackend::new(delay), templates)
}

pub fn fixture_with(backend: CountingBackend, templates: &[(&str, String)]) -> Fixture {
    let temp = TempDir::new().unwrap();
    let compilers = temp.path().join("compilers");
    let root = temp.path().join("app");
    fs::create_dir_all(&compilers).unwrap();
    fs::create_dir_all(root.join("components")).unwrap();

    fs::write(compilers.join("template-compiler_1.0.txt"), "v1").unwrap();
    fs::write(compilers.join("template-compiler_2.0.txt"), "version-two").unwrap();
    for (name, body) in templates {
        fs::write(root.join("components").join(name), body).unwrap();
    }

    let backend = Arc::new(backend);
    let live = backend.live.clone();
    let shared = load_compilers(backend, &compilers).unwrap();
    Fixture {
        _temp: temp,
        templates: root,
        shared,
        live,
    }
}

pub fn templates(count: usize) -> Vec<(&'static str, String)> {
    const NAMES: &[&str] = &[
        "a.hbs", "b.hbs", "c.hbs", "d.hbs", "e.hbs", "f.hbs", "g.hbs", "h.hbs", "i.hbs", "j.hbs",
        "k.hbs", "l.hbs", "m.hbs", "n.hbs", "o.hbs", "p.hbs", "q.hbs", "r.hbs", "s.hbs", "t.hbs",
        "u.hbs", "v.hbs", "w.hbs", "x.hbs", "y.hbs", "z.hbs",
    ];
    NAMES
        .iter()
        .take(count)
        .enumerate()
        .map(|(i, name)| (*name, format!("<div class=\"item-{}\">{}</div>\n", i, "{{x}}".repeat(i + 1))))
        .collect()
}

pub fn queue_for(fixture: &Fixture) -> Arc<TaskQueue> {
    let found = find_templates(&fixture.templates, &["**/*.hbs".to_string()], &[]).unwrap();
    Arc::new(TaskQueue::new(found))
}

pub fn options(parallelism: usize) -> RunOptions {
    RunOptions {
        parallelism,
        task_timeout: None,
        handle_interrupt: false,
    }
}
