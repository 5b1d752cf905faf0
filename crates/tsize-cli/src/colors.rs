//! Terminal escape sequences for CLI output.

use std::io::{self, Write};

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const CYAN: &str = "\x1b[36m";

pub const HIDE_CURSOR: &str = "\x1b[?25l";
pub const SHOW_CURSOR: &str = "\x1b[?25h";
/// Return to column 0 and erase the line.
pub const CLEAR_LINE: &str = "\r\x1b[2K";

/// Flush stdout so output without a trailing newline is visible immediately.
#[inline]
pub fn flush_stdout() {
    io::stdout().flush().ok();
}
