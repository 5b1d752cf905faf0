//! Cooperative cancellation for a run.
//!
//! A single [`CancelToken`] is shared by the orchestrator and every worker
//! loop. Any source can trigger it: the process interrupt signal, a worker
//! that crashed or exited early, a task deadline, or the orchestrator itself
//! once all workers are done. The first cause wins and the token stays
//! cancelled for the rest of the run.

use std::fmt;
use std::future::Future;
use std::io;
use std::pin::pin;
use std::sync::{Arc, OnceLock};

use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The operator interrupted the process.
    Interrupted,
    /// A worker closed its channel unexpectedly.
    WorkerExited,
    /// A worker reported an error.
    WorkerFailed,
    /// A task exceeded its deadline.
    TimedOut,
    /// The orchestrator finished waiting on every worker.
    Completed,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CancelReason::Interrupted => "interrupted",
            CancelReason::WorkerExited => "worker exited early",
            CancelReason::WorkerFailed => "worker failed",
            CancelReason::TimedOut => "task timed out",
            CancelReason::Completed => "run completed",
        };
        f.write_str(text)
    }
}

#[derive(Default)]
struct Inner {
    reason: OnceLock<CancelReason>,
    notify: Notify,
}

/// Shared, permanent-once-set cancellation signal.
///
/// Clones observe the same state; cancelling any clone cancels all of them.
///
/// # Example
///
/// ```
/// use tsize_core::execute::{CancelReason, CancelToken};
///
/// let token = CancelToken::new();
/// let clone = token.clone();
///
/// assert!(clone.cancel(CancelReason::Interrupted));
/// // Later causes are ignored
/// assert!(!token.cancel(CancelReason::Completed));
/// assert_eq!(token.reason(), Some(CancelReason::Interrupted));
/// ```
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Create an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Trigger cancellation.
    ///
    /// Returns `true` if this call set the reason, `false` if the token was
    /// already cancelled.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        let first = self.inner.reason.set(reason).is_ok();
        if first {
            tracing::debug!(%reason, "Run cancelled");
            self.inner.notify.notify_waiters();
        }
        first
    }

    /// The reason the token was cancelled, if it was.
    pub fn reason(&self) -> Option<CancelReason> {
        self.inner.reason.get().copied()
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.reason.get().is_some()
    }

    /// Fail with `Error::Cancelled` if the token is cancelled.
    pub fn check(&self) -> Result<()> {
        match self.reason() {
            Some(reason) => Err(Error::Cancelled(reason)),
            None => Ok(()),
        }
    }

    /// Wait until the token is cancelled.
    pub async fn cancelled(&self) -> CancelReason {
        loop {
            let mut notified = pin!(self.inner.notify.notified());
            // Register before checking so a cancel between the two is not missed
            notified.as_mut().enable();
            if let Some(reason) = self.reason() {
                return reason;
            }
            notified.await;
        }
    }

    /// Run `future` to completion unless the token is cancelled first.
    ///
    /// Cancellation takes precedence when both are ready.
    pub async fn race<F: Future>(&self, future: F) -> Result<F::Output> {
        self.check()?;
        tokio::select! {
            biased;
            reason = self.cancelled() => Err(Error::Cancelled(reason)),
            output = future => Ok(output),
        }
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("reason", &self.reason())
            .finish()
    }
}

/// Process interrupt listener scoped to a run.
///
/// While the guard is alive, Ctrl+C cancels the token instead of killing the
/// process. Dropping the guard stops the listener on every exit path, and
/// once no guard is left Ctrl+C terminates the process again.
pub struct InterruptGuard {
    listener: JoinHandle<()>,
}

impl InterruptGuard {
    /// Start listening for the interrupt signal.
    ///
    /// The signal handler is registered before this returns. Must be called
    /// from within a tokio runtime.
    pub fn install(token: &CancelToken) -> Self {
        default_action::suspend();
        let interrupts = interrupt_stream();
        let token = token.clone();
        let listener = tokio::spawn(async move {
            match interrupts {
                Ok(mut interrupts) => {
                    if interrupts.recv().await.is_some() {
                        tracing::info!("Received interrupt signal");
                        token.cancel(CancelReason::Interrupted);
                    }
                }
                Err(e) => tracing::warn!("Failed to listen for interrupt signal: {}", e),
            }
        });
        Self { listener }
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        self.listener.abort();
        default_action::resume();
    }
}

#[cfg(unix)]
fn interrupt_stream() -> io::Result<tokio::signal::unix::Signal> {
    use tokio::signal::unix::{SignalKind, signal};
    signal(SignalKind::interrupt())
}

#[cfg(windows)]
fn interrupt_stream() -> io::Result<tokio::signal::windows::CtrlC> {
    tokio::signal::windows::ctrl_c()
}

/// Default SIGINT behavior outside of interrupt guards.
///
/// The runtime's handler stays registered for the life of the process, so a
/// conditional default action is registered next to it. It terminates the
/// process whenever no guard is active.
#[cfg(unix)]
mod default_action {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex, OnceLock, PoisonError};

    use signal_hook::consts::SIGINT;

    struct Scope {
        restore: Arc<AtomicBool>,
        active: Mutex<usize>,
    }

    fn scope() -> Option<&'static Scope> {
        static SCOPE: OnceLock<Option<Scope>> = OnceLock::new();
        SCOPE
            .get_or_init(|| {
                let restore = Arc::new(AtomicBool::new(false));
                match signal_hook::flag::register_conditional_default(SIGINT, restore.clone()) {
                    Ok(_) => Some(Scope {
                        restore,
                        active: Mutex::new(0),
                    }),
                    Err(e) => {
                        tracing::warn!("Failed to register default interrupt action: {}", e);
                        None
                    }
                }
            })
            .as_ref()
    }

    /// A guard was installed: interrupts cancel the run.
    pub(super) fn suspend() {
        if let Some(scope) = scope() {
            let mut active = scope.active.lock().unwrap_or_else(PoisonError::into_inner);
            *active += 1;
            scope.restore.store(false, Ordering::SeqCst);
        }
    }

    /// A guard was dropped: the last one out restores process termination.
    pub(super) fn resume() {
        if let Some(scope) = scope() {
            let mut active = scope.active.lock().unwrap_or_else(PoisonError::into_inner);
            *active = active.saturating_sub(1);
            if *active == 0 {
                scope.restore.store(true, Ordering::SeqCst);
            }
        }
    }

    #[cfg(test)]
    pub(super) fn terminates() -> bool {
        scope().is_some_and(|scope| scope.restore.load(Ordering::SeqCst))
    }
}

#[cfg(not(unix))]
mod default_action {
    pub(super) fn suspend() {}
    pub(super) fn resume() {}
}

/// Cancels the token with [`CancelReason::Completed`] when dropped.
///
/// Anything still waiting on the token after the orchestrator is done is
/// released, whatever path the orchestrator left by.
pub(crate) struct CompletionGuard {
    token: CancelToken,
}

impl CompletionGuard {
    pub(crate) fn new(token: &CancelToken) -> Self {
        Self {
            token: token.clone(),
        }
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.token.cancel(CancelReason::Completed);
    }
}
