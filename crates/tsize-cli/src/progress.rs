//! Single-line terminal status display.

use std::fmt::Display;
use std::io::{self, IsTerminal};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tsize_core::TaskQueue;

use crate::colors;

/// How often the progress percentage is redrawn.
const TICK: Duration = Duration::from_millis(200);

/// A status line redrawn in place, with the cursor hidden while it is shown.
///
/// Disabled when asked to or when stdout is not a terminal. Dropping it
/// clears the line and restores the cursor.
pub struct StatusLine {
    enabled: bool,
}

impl StatusLine {
    pub fn new(requested: bool) -> Self {
        let enabled = requested && io::stdout().is_terminal();
        if enabled {
            print!("{}", colors::HIDE_CURSOR);
            colors::flush_stdout();
        }
        Self { enabled }
    }

    /// Replace the line with `message`.
    pub fn set(&self, message: impl Display) {
        if self.enabled {
            draw(message);
        }
    }

    pub fn clear(&self) {
        if self.enabled {
            print!("{}", colors::CLEAR_LINE);
            colors::flush_stdout();
        }
    }

    /// Redraw the queue's completion percentage until the ticker is dropped.
    pub fn track(&self, queue: Arc<TaskQueue>) -> Option<ProgressTicker> {
        if !self.enabled {
            return None;
        }
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK);
            loop {
                interval.tick().await;
                let progress = queue.progress();
                draw(format_args!(
                    "compiling {} templates... {}{}%{}",
                    progress.total,
                    colors::CYAN,
                    progress.percent(),
                    colors::RESET
                ));
            }
        });
        Some(ProgressTicker { task })
    }
}

impl Drop for StatusLine {
    fn drop(&mut self) {
        if self.enabled {
            print!("{}{}", colors::CLEAR_LINE, colors::SHOW_CURSOR);
            colors::flush_stdout();
        }
    }
}

/// Background redraw of the progress percentage; stopped on drop.
pub struct ProgressTicker {
    task: JoinHandle<()>,
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn draw(message: impl Display) {
    print!("{}{}{}{}", colors::CLEAR_LINE, colors::DIM, message, colors::RESET);
    colors::flush_stdout();
}
