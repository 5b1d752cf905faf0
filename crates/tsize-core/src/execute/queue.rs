//! Shared task queue.
//!
//! The queue is the single pull point of the run: worker loops pop one path
//! at a time, so faster workers naturally take more tasks.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Pending template paths.
#[derive(Debug)]
pub struct TaskQueue {
    tasks: Mutex<Vec<PathBuf>>,
    total: usize,
}

/// Snapshot of queue progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Tasks the run started with.
    pub total: usize,
    /// Tasks not yet handed to a worker.
    pub remaining: usize,
}

impl Progress {
    /// Approximate completion, `(total - remaining) / (total + 1)`, as a floored percentage.
    ///
    /// Tasks count as done once handed out, so this is advisory only.
    pub fn percent(&self) -> u32 {
        let taken = self.total.saturating_sub(self.remaining) as f64;
        ((taken / (self.total as f64 + 1.0)) * 100.0).floor() as u32
    }
}

impl TaskQueue {
    /// Create a queue holding `tasks`.
    pub fn new(tasks: Vec<PathBuf>) -> Self {
        let total = tasks.len();
        Self {
            tasks: Mutex::new(tasks),
            total,
        }
    }

    /// A poisoned lock only means a holder panicked; the Vec itself is intact.
    fn lock(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the next task.
    pub fn pop(&self) -> Option<PathBuf> {
        self.lock().pop()
    }

    /// Number of tasks the queue started with.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of tasks not yet taken.
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    /// Current progress snapshot.
    pub fn progress(&self) -> Progress {
        Progress {
            total: self.total,
            remaining: self.remaining(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(n: usize) -> TaskQueue {
        TaskQueue::new((0..n).map(|i| PathBuf::from(format!("t{}.hbs", i))).collect())
    }

    #[test]
    fn test_pop_drains_each_task_once() {
        let queue = queue(3);
        let mut seen = Vec::new();
        while let Some(task) = queue.pop() {
            seen.push(task);
        }
        seen.sort();
        assert_eq!(seen.len(), 3);
        seen.dedup();
        assert_eq!(seen.len(), 3);
        assert_eq!(queue.remaining(), 0);
        assert_eq!(queue.total(), 3);
    }

    #[test]
    fn test_progress_percent() {
        let queue = queue(9);
        assert_eq!(queue.progress().percent(), 0);
        for _ in 0..3 {
            queue.pop();
        }
        // 3 / 10
        assert_eq!(queue.progress().percent(), 30);
        while queue.pop().is_some() {}
        // Never reaches 100 by construction
        assert_eq!(queue.progress().percent(), 90);
    }

    #[test]
    fn test_empty_progress() {
        let queue = queue(0);
        assert_eq!(queue.progress().percent(), 0);
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_concurrent_pops() {
        let queue = std::sync::Arc::new(queue(1000));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    let mut taken = Vec::new();
                    while let Some(task) = queue.pop() {
                        taken.push(task);
                    }
                    taken
                })
            })
            .collect();

        let mut all: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), 1000);
    }
}
