//! Integration tests for the compile pipeline.
//!
//! Uses a counting backend so tests can check that every compiler instance a
//! worker built is released by the time a run returns.

mod common;

use std::collections::BTreeSet;
use std::fs;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use tsize_core::execute::{CancelReason, CancelToken, compile_templates};
use tsize_core::measure::{Algorithm, compressed_len};
use tsize_core::{Error, RunOptions, summarize};

use common::{CountingBackend, expected_output, fixture, fixture_with, options, queue_for, templates};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_twelve_templates_two_versions() {
    let fixture = fixture(Duration::ZERO, &templates(12));
    let queue = queue_for(&fixture);
    assert_eq!(queue.total(), 12);
    let tasks: BTreeSet<String> = fs::read_dir(fixture.templates.join("components"))
        .unwrap()
        .map(|e| {
            e.unwrap()
                .path()
                .canonicalize()
                .unwrap()
                .to_string_lossy()
                .into_owned()
        })
        .collect();

    let results = compile_templates(
        queue.clone(),
        fixture.shared.clone(),
        CancelToken::new(),
        &options(4),
    )
    .await
    .unwrap();

    assert_eq!(results.len(), 24);
    assert_eq!(queue.remaining(), 0);

    // Exactly the Cartesian product of tasks and versions
    let pairs: BTreeSet<(String, String)> = results
        .iter()
        .map(|r| (r.filename.clone(), r.version.clone()))
        .collect();
    assert_eq!(pairs.len(), 24);
    for task in &tasks {
        for version in ["1.0", "2.0"] {
            assert!(pairs.contains(&(task.clone(), version.to_string())));
        }
    }

    // Every field is the true per-file measurement
    for result in &results {
        let source = fs::read_to_string(&result.filename).unwrap();
        let tag = if result.version == "1.0" { "v1" } else { "version-two" };
        let compiled = expected_output(tag, &source);
        assert_eq!(result.original, source.len() as u64);
        assert_eq!(result.compiled, compiled.len() as u64);
        assert_eq!(
            result.gzip,
            compressed_len(compiled.as_bytes(), Algorithm::Gzip).unwrap()
        );
        assert_eq!(
            result.brotli,
            compressed_len(compiled.as_bytes(), Algorithm::Brotli).unwrap()
        );
    }

    let summary = summarize(&results);
    assert_eq!(summary.len(), 2);
    for (version, totals) in &summary {
        let of_version: Vec<_> = results.iter().filter(|r| &r.version == version).collect();
        assert_eq!(of_version.len(), 12);
        assert_eq!(totals.original, of_version.iter().map(|r| r.original).sum::<u64>());
        assert_eq!(totals.compiled, of_version.iter().map(|r| r.compiled).sum::<u64>());
        assert_eq!(totals.gzip, of_version.iter().map(|r| r.gzip).sum::<u64>());
        assert_eq!(totals.brotli, of_version.iter().map(|r| r.brotli).sum::<u64>());
    }

    assert_eq!(fixture.live.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_single_worker_processes_everything() {
    let fixture = fixture(Duration::ZERO, &templates(7));
    let results = compile_templates(
        queue_for(&fixture),
        fixture.shared.clone(),
        CancelToken::new(),
        &options(8),
    )
    .await
    .unwrap();
    assert_eq!(results.len(), 14);
    assert_eq!(fixture.live.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_no_templates() {
    let fixture = fixture(Duration::ZERO, &[]);
    let queue = queue_for(&fixture);
    assert_eq!(queue.total(), 0);

    let cancel = CancelToken::new();

    let results = compile_templates(queue, fixture.shared.clone(), cancel.clone(), &options(4))
        .await
        .unwrap();
    assert!(results.is_empty());
    assert!(summarize(&results).is_empty());
    assert_eq!(cancel.reason(), Some(CancelReason::Completed));
}

#[tokio::test]
async fn test_too_few_templates_for_a_worker() {
    let fixture = fixture(Duration::ZERO, &templates(3));
    let queue = queue_for(&fixture);
    let cancel = CancelToken::new();

    let results = compile_templates(
        queue.clone(),
        fixture.shared.clone(),
        cancel.clone(),
        &options(4),
    )
    .await
    .unwrap();
    assert!(results.is_empty());
    // Nothing was taken from the queue
    assert_eq!(queue.remaining(), 3);
    assert_eq!(cancel.reason(), Some(CancelReason::Completed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failing_template_aborts_run() {
    let mut files = templates(11);
    files.push(("broken.hbs", "<p>FAIL</p>".to_string()));
    let fixture = fixture(Duration::ZERO, &files);
    let cancel = CancelToken::new();

    let err = compile_templates(
        queue_for(&fixture),
        fixture.shared.clone(),
        cancel.clone(),
        &options(2),
    )
    .await
    .unwrap_err();

    match err {
        Error::TaskFailed { filename, message } => {
            assert!(filename.ends_with("broken.hbs"));
            assert!(message.contains("refused"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(cancel.reason(), Some(CancelReason::WorkerFailed));
    assert_eq!(fixture.live.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_compiler_aborts_run() {
    let mut files = templates(9);
    files.push(("explode.hbs", "PANIC".to_string()));
    let fixture = fixture(Duration::ZERO, &files);

    let err = compile_templates(
        queue_for(&fixture),
        fixture.shared.clone(),
        CancelToken::new(),
        &options(2),
    )
    .await
    .unwrap_err();

    match err {
        Error::TaskFailed { filename, message } => {
            assert!(filename.ends_with("explode.hbs"));
            assert!(message.contains("compiler blew up"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(fixture.live.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_before_start() {
    let fixture = fixture(Duration::ZERO, &templates(10));
    let cancel = CancelToken::new();
    cancel.cancel(CancelReason::Interrupted);

    let err = compile_templates(
        queue_for(&fixture),
        fixture.shared.clone(),
        cancel,
        &options(2),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, Error::Cancelled(CancelReason::Interrupted)));
    assert_eq!(fixture.live.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cancelled_mid_run_terminates_workers() {
    let fixture = fixture(Duration::from_millis(20), &templates(26));
    let queue = queue_for(&fixture);
    let cancel = CancelToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel(CancelReason::Interrupted);
    });

    let err = compile_templates(queue.clone(), fixture.shared.clone(), cancel, &options(2))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Cancelled(CancelReason::Interrupted)));
    assert!(queue.remaining() > 0);
    assert_eq!(fixture.live.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_task_timeout_cancels_run() {
    let mut files = templates(9);
    files.push(("slow.hbs", "SLOW".to_string()));
    let fixture = fixture(Duration::ZERO, &files);
    let cancel = CancelToken::new();
    let options = RunOptions {
        parallelism: 1,
        task_timeout: Some(Duration::from_millis(400)),
        handle_interrupt: false,
    };

    let err = compile_templates(queue_for(&fixture), fixture.shared.clone(), cancel.clone(), &options)
        .await
        .unwrap_err();

    match err {
        Error::TaskTimeout { filename, timeout, .. } => {
            assert!(filename.ends_with("slow.hbs"));
            assert_eq!(timeout, Duration::from_millis(400));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(cancel.reason(), Some(CancelReason::TimedOut));
    // The late task finished within the grace period, so the worker was joined
    assert_eq!(fixture.live.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stuck_worker_is_detached_after_grace_period() {
    let mut files = templates(9);
    files.push(("stuck.hbs", "STUCK".to_string()));
    let fixture = fixture(Duration::ZERO, &files);
    let options = RunOptions {
        parallelism: 1,
        task_timeout: Some(Duration::from_millis(100)),
        handle_interrupt: false,
    };

    let err = compile_templates(queue_for(&fixture), fixture.shared.clone(), CancelToken::new(), &options)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::TaskTimeout { .. }));

    // The detached worker still holds one compiler per version
    assert_eq!(fixture.live.load(Ordering::SeqCst), 2);

    // and releases them once its task ends and it sees the closed channel
    let deadline = Instant::now() + Duration::from_secs(5);
    while fixture.live.load(Ordering::SeqCst) > 0 {
        assert!(Instant::now() < deadline, "detached worker never exited");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_worker_setup_failure_mid_pool() {
    // Third restore call fails: the second worker to set up cannot build its
    // compiler for one of the versions
    let backend = CountingBackend::new(Duration::from_millis(10)).fail_restore_at(2);
    let fixture = fixture_with(backend, &templates(10));
    let cancel = CancelToken::new();

    let err = compile_templates(
        queue_for(&fixture),
        fixture.shared.clone(),
        cancel.clone(),
        &options(2),
    )
    .await
    .unwrap_err();

    match err {
        Error::Worker { message, .. } => assert!(message.contains("restore refused")),
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(cancel.reason(), Some(CancelReason::WorkerFailed));
    assert_eq!(fixture.live.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_token_reports_completion() {
    let fixture = fixture(Duration::ZERO, &templates(5));
    let cancel = CancelToken::new();
    compile_templates(queue_for(&fixture), fixture.shared.clone(), cancel.clone(), &options(1))
        .await
        .unwrap();
    assert_eq!(cancel.reason(), Some(CancelReason::Completed));
}
