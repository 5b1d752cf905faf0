//! tsize CLI - Measure compiled template sizes across compiler versions.

mod colors;
mod progress;
mod run;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tsize_core::RunConfig;
use tsize_core::config::DEFAULT_OUTPUT;

#[derive(Parser)]
#[command(name = "tsize")]
#[command(about = "Measure compiled and compressed template sizes across compiler versions")]
#[command(version)]
struct Cli {
    /// Root directory to search for templates
    path: PathBuf,

    /// Report output path
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Template glob, relative to the root (repeatable, default: **/*.hbs)
    #[arg(long = "glob", value_name = "PATTERN")]
    globs: Vec<String>,

    /// Pattern to skip (repeatable, replaces the default ignore list)
    #[arg(long, value_name = "PATTERN")]
    ignore: Vec<String>,

    /// Directory of template-compiler_<version>.json files
    /// (default: $TSIZE_COMPILERS_DIR or ./compilers)
    #[arg(long, value_name = "DIR")]
    compilers: Option<PathBuf>,

    /// Maximum number of worker threads
    #[arg(short, long)]
    jobs: Option<NonZeroUsize>,

    /// Fail the run if one template takes longer than this
    #[arg(long, value_name = "SECS")]
    task_timeout: Option<u64>,

    /// Disable the progress line
    #[arg(long)]
    no_progress: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn into_config(self) -> RunConfig {
        let mut config = RunConfig::new(self.path);
        config.output = self.output;
        if !self.globs.is_empty() {
            config.globs = self.globs;
        }
        if !self.ignore.is_empty() {
            config.ignore = self.ignore;
        }
        if let Some(dir) = self.compilers {
            config.compilers_dir = dir;
        }
        if let Some(jobs) = self.jobs {
            config.options.parallelism = jobs.get();
        }
        config.options.task_timeout = self.task_timeout.map(Duration::from_secs);
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        tracing_subscriber::EnvFilter::from_default_env()
            .add_directive(tracing::Level::DEBUG.into())
    } else {
        tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    // stdout carries the progress line and summary
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    // Helper to format tsize-core errors with recovery hints
    let format_error = |err: anyhow::Error| -> anyhow::Error {
        if let Some(tsize_err) = err.downcast_ref::<tsize_core::Error>() {
            anyhow::anyhow!("{}", tsize_err.with_hint())
        } else {
            err
        }
    };

    let show_progress = !cli.no_progress;
    run::execute(cli.into_config(), show_progress)
        .await
        .map_err(format_error)?;

    Ok(())
}
