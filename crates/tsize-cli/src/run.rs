//! Measure command implementation for tsize CLI.
//!
//! Finds templates, loads every compiler version, runs the worker pool and
//! writes the report. Nothing is written when the run fails.

use std::sync::Arc;
use std::time::Instant;

use tsize_core::{
    CancelToken, MustacheBackend, Report, RunConfig, Summary, TaskQueue, compile_templates,
    find_templates, load_compilers,
};

use crate::colors;
use crate::progress::StatusLine;

/// Execute a measurement run.
pub async fn execute(config: RunConfig, show_progress: bool) -> anyhow::Result<()> {
    let start = Instant::now();
    let status = StatusLine::new(show_progress);

    status.set("finding templates...");
    let files = find_templates(&config.root, &config.globs, &config.ignore)?;

    status.set(format_args!(
        "loading compilers from {}...",
        config.compilers_dir.display()
    ));
    let compilers_dir = config.compilers_dir.clone();
    let shared = tokio::task::spawn_blocking(move || {
        load_compilers(Arc::new(MustacheBackend::new()), &compilers_dir)
    })
    .await??;

    status.clear();
    println!(
        "{}Measuring{} {} templates with {} compiler versions ({})",
        colors::BOLD,
        colors::RESET,
        files.len(),
        shared.len(),
        shared.version_names().join(", ")
    );

    let queue = Arc::new(TaskQueue::new(files));
    let ticker = status.track(queue.clone());
    let outcome = compile_templates(queue, shared, CancelToken::new(), &config.options).await;
    drop(ticker);
    drop(status);
    let results = outcome?;

    let count = results.len();
    let report = Report::new(results);
    report.write(&config.output)?;

    print_summary(&report.summary);
    println!(
        "\n{}Completed{} {} results in {:.2}s, report written to {}",
        colors::GREEN,
        colors::RESET,
        count,
        start.elapsed().as_secs_f64(),
        config.output.display()
    );

    Ok(())
}

fn print_summary(summary: &Summary) {
    if summary.is_empty() {
        println!("\n{}No templates were compiled.{}", colors::DIM, colors::RESET);
        return;
    }

    println!(
        "\n{}{:<12} {:>12} {:>12} {:>12} {:>12}{}",
        colors::BOLD,
        "version",
        "original",
        "compiled",
        "gzip",
        "brotli",
        colors::RESET
    );
    println!("{}", "─".repeat(64));
    for (version, totals) in summary {
        println!(
            "{:<12} {:>12} {:>12} {:>12} {:>12}",
            version, totals.original, totals.compiled, totals.gzip, totals.brotli
        );
    }
}
